use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// One product as returned by the seller listing endpoint.
///
/// Only the fields the pipeline reads are typed; everything else the listing
/// carries is kept in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogItem {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: String,
    #[serde(default, rename = "vendorCode", deserialize_with = "lenient_string")]
    pub vendor_code: String,
    #[serde(default, rename = "subjectName", deserialize_with = "lenient_string")]
    pub subject_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            brand: String::new(),
            vendor_code: String::new(),
            subject_name: String::new(),
            extra: Map::new(),
        }
    }

    /// Parses one raw listing entry. Entries without a numeric `id` are rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CardOption {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct OptionGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    pub group_name: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub options: Vec<CardOption>,
}

/// The per-product "card" served by the content host.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EnrichmentDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub imt_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vendor_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub options: Vec<CardOption>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub grouped_options: Vec<OptionGroup>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub certificates: Vec<Value>,
}

impl EnrichmentDocument {
    /// Parses a card body. Anything that is not a JSON object is malformed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Value of the first option in the flat `options` list named exactly `name`.
    pub fn option(&self, name: &str) -> Option<&str> {
        find_option(&self.options, name)
    }

    /// Value of option `name` inside the group called `group`.
    pub fn grouped_option(&self, group: &str, name: &str) -> Option<&str> {
        self.grouped_options
            .iter()
            .filter(|g| g.group_name == group)
            .find_map(|g| find_option(&g.options, name))
    }

    /// Value of option `name` in any group, scanning groups in document order.
    pub fn any_grouped_option(&self, name: &str) -> Option<&str> {
        self.grouped_options
            .iter()
            .find_map(|g| find_option(&g.options, name))
    }

    /// All option names present in the card, flat list first, then grouped.
    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .chain(self.grouped_options.iter().flat_map(|g| g.options.iter()))
            .map(|opt| opt.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

fn find_option<'a>(options: &'a [CardOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .map(|opt| opt.value.as_str())
}

/// A listing item together with its card, if one could be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedItem {
    pub item: CatalogItem,
    pub card: Option<EnrichmentDocument>,
}

impl EnrichedItem {
    pub fn new(item: CatalogItem, card: Option<EnrichmentDocument>) -> Self {
        Self { item, card }
    }

    pub fn has_card(&self) -> bool {
        self.card.is_some()
    }
}

/// Accepts strings, numbers and booleans; `null` and structured values become "".
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Keeps the well-formed entries of a list and drops the rest.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    })
}
