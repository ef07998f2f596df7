use std::fs;
use std::path::Path;
use std::time::Duration;

use harvest_core::MissingCardPolicy;
use serde::Deserialize;

use crate::HarvestError;

/// Durations are written as whole milliseconds in configuration files.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Bounded retry with exponential backoff: `backoff_base * 2^attempt + jitter`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub backoff_base: Duration,
    /// Upper bound of the uniformly random delay added to each backoff.
    #[serde(with = "millis")]
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            jitter_max: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic part of the delay before retrying after `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Immutable HTTP settings shared by every request of a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub headers: Vec<(String, String)>,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    pub max_bytes: u64,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let headers = [
            ("Accept", "*/*"),
            ("Accept-Language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("Origin", "https://www.wildberries.ru"),
            ("Referer", "https://www.wildberries.ru/"),
            ("Sec-Ch-Ua-Mobile", "?0"),
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
            ),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            headers,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_bytes: 16 * 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// Upstream URL bases. The pipeline appends its own query strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub route_map: String,
    pub seller_filters: String,
    pub seller_catalog: String,
    pub catalog_menu: String,
    pub dest: String,
    pub currency: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            route_map: "https://cdn.wbbasket.ru/api/v3/upstreams".to_string(),
            seller_filters: "https://catalog.wb.ru/sellers/v8/filters".to_string(),
            seller_catalog: "https://catalog.wb.ru/sellers/v4/catalog".to_string(),
            catalog_menu: "https://static-basket-01.wbbasket.ru/vol0/data/main-menu-ru-ru-v3.json"
                .to_string(),
            dest: "-1257786".to_string(),
            currency: "rub".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at one base URL, e.g. a local mock server.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            route_map: format!("{base}/api/v3/upstreams"),
            seller_filters: format!("{base}/sellers/v8/filters"),
            seller_catalog: format!("{base}/sellers/v4/catalog"),
            catalog_menu: format!("{base}/vol0/data/main-menu-ru-ru-v3.json"),
            ..Self::default()
        }
    }
}

/// Card retrieval settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub scheme: String,
    /// Timeout for the single request to a host resolved from the route map.
    #[serde(with = "millis")]
    pub card_timeout: Duration,
    /// Timeout for each request while probing conventional hosts.
    #[serde(with = "millis")]
    pub probe_timeout: Duration,
    /// Highest host number tried while probing.
    pub probe_ceiling: u32,
    /// Conventional host name; `{nn}` is replaced by the two-digit host number.
    pub probe_host_pattern: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            card_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(2),
            probe_ceiling: 14,
            probe_host_pattern: "basket-{nn}.wbbasket.ru".to_string(),
        }
    }
}

impl EnrichConfig {
    pub fn probe_host(&self, number: u32) -> String {
        self.probe_host_pattern
            .replace("{nn}", &format!("{number:02}"))
    }
}

/// Inclusive range of a randomized pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange {
    #[serde(with = "millis")]
    pub min: Duration,
    #[serde(with = "millis")]
    pub max: Duration,
}

impl DelayRange {
    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub const fn zero() -> Self {
        Self::millis(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }
}

/// Randomized pauses that keep the request rate below upstream ban thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub between_items: DelayRange,
    pub between_pages: DelayRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            between_items: DelayRange::millis(100, 300),
            between_pages: DelayRange::millis(1_000, 2_000),
        }
    }
}

impl PacingConfig {
    pub const fn none() -> Self {
        Self {
            between_items: DelayRange::zero(),
            between_pages: DelayRange::zero(),
        }
    }
}

/// How items of a page are enriched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One item at a time, in listing order.
    #[default]
    Sequential,
    /// Up to `workers` cards in flight; progress is reported in completion order.
    Bounded { workers: usize },
}

impl ConcurrencyMode {
    pub fn workers(&self) -> usize {
        match self {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::Bounded { workers } => (*workers).max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub fetch: FetchConfig,
    pub endpoints: Endpoints,
    pub enrich: EnrichConfig,
    pub pacing: PacingConfig,
    pub concurrency: ConcurrencyMode,
    pub missing_cards: MissingCardPolicy,
}

impl HarvestConfig {
    pub fn from_json_str(text: &str) -> Result<Self, HarvestError> {
        serde_json::from_str(text).map_err(|err| HarvestError::Config(err.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, HarvestError> {
        let text = fs::read_to_string(path)
            .map_err(|err| HarvestError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: Duration::from_millis(500),
            jitter_max: Duration::ZERO,
        };
        assert_eq!(policy.base_delay(0), Duration::from_millis(500));
        assert_eq!(policy.base_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(4_000));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn probe_host_is_zero_padded() {
        let enrich = EnrichConfig::default();
        assert_eq!(enrich.probe_host(3), "basket-03.wbbasket.ru");
        assert_eq!(enrich.probe_host(12), "basket-12.wbbasket.ru");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = HarvestConfig::from_json_str(
            r#"{
                "fetch": {"retry": {"max_attempts": 2, "backoff_base": 10}},
                "pacing": {"between_items": {"min": 0, "max": 50}},
                "concurrency": {"bounded": {"workers": 3}},
                "missing_cards": "exclude"
            }"#,
        )
        .unwrap();
        assert_eq!(config.fetch.retry.max_attempts, 2);
        assert_eq!(config.fetch.retry.backoff_base, Duration::from_millis(10));
        assert_eq!(config.fetch.retry.jitter_max, Duration::from_secs(1));
        assert_eq!(config.pacing.between_items, DelayRange::millis(0, 50));
        assert_eq!(config.pacing.between_pages, DelayRange::millis(1_000, 2_000));
        assert_eq!(config.concurrency, ConcurrencyMode::Bounded { workers: 3 });
        assert_eq!(config.missing_cards, MissingCardPolicy::Exclude);
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(
            HarvestConfig::from_json_str("{"),
            Err(HarvestError::Config(_))
        ));
    }
}
