use std::sync::LazyLock;

use regex::Regex;

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:[.,][0-9]+)?").expect("decimal pattern is valid"));

/// First decimal number in `text`, reading `,` as the decimal separator.
///
/// Only ASCII digits count. Values too large for a finite `f64` yield `None`.
pub fn extract_number(text: &str) -> Option<f64> {
    let found = DECIMAL.find(text)?;
    found
        .as_str()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}
