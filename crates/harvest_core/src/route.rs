use serde_json::Value;

/// Number of trailing decimal digits dropped from a product id to get its volume.
const VOLUME_DIVISOR: u64 = 100_000;
/// Number of trailing decimal digits dropped from a product id to get its part.
const PART_DIVISOR: u64 = 1_000;

/// Volume bucket of a product id: the id with its last five digits truncated.
pub fn volume_key(id: u64) -> u64 {
    id / VOLUME_DIVISOR
}

/// Part bucket of a product id: the id with its last three digits truncated.
pub fn part_key(id: u64) -> u64 {
    id / PART_DIVISOR
}

/// A contiguous, inclusive volume interval served by one content host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    pub from: u64,
    pub to: u64,
    pub host: String,
}

impl HostRange {
    pub fn new(from: u64, to: u64, host: impl Into<String>) -> Self {
        Self {
            from,
            to,
            host: host.into(),
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.from <= key && key <= self.to
    }
}

/// Ordered host ranges for one harvest run.
///
/// Ranges are expected to be disjoint. When the upstream publishes overlapping
/// ranges the first matching range in publication order wins; the map is never
/// reordered or merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMap {
    ranges: Vec<HostRange>,
}

impl RouteMap {
    pub fn new(ranges: Vec<HostRange>) -> Self {
        Self { ranges }
    }

    /// Reads `recommend.mediabasket_route_map[0].hosts` from the upstreams document.
    ///
    /// Entries without a host or with non-numeric bounds are skipped; any other
    /// shape yields an empty map.
    pub fn from_upstreams(doc: &Value) -> Self {
        let hosts = doc
            .pointer("/recommend/mediabasket_route_map/0/hosts")
            .and_then(Value::as_array);
        let Some(hosts) = hosts else {
            return Self::default();
        };

        let ranges = hosts
            .iter()
            .filter_map(|entry| {
                let from = entry.get("vol_range_from").and_then(as_u64)?;
                let to = entry.get("vol_range_to").and_then(as_u64)?;
                let host = entry.get("host").and_then(Value::as_str)?.trim();
                if host.is_empty() {
                    return None;
                }
                Some(HostRange::new(from, to, host))
            })
            .collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[HostRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Host serving the card of product `id`, if any range covers its volume.
    pub fn host_for_item(&self, id: u64) -> Option<&str> {
        lookup(id, &self.ranges)
    }
}

/// Host responsible for product `id`: the volume key of `id` looked up in `ranges`.
pub fn lookup(id: u64, ranges: &[HostRange]) -> Option<&str> {
    lookup_volume(volume_key(id), ranges)
}

/// Linear scan returning the host of the first range containing `key`.
pub fn lookup_volume(key: u64, ranges: &[HostRange]) -> Option<&str> {
    ranges
        .iter()
        .find(|range| range.contains(key))
        .map(|range| range.host.as_str())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
