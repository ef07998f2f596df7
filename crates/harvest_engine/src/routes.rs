use harvest_core::RouteMap;
use harvest_logging::{harvest_info, harvest_warn};

use crate::fetch::ResilientFetcher;
use crate::HarvestError;

/// Downloads and parses the content-host route map for one run.
///
/// Transport failures and non-JSON bodies are errors; a JSON document of an
/// unexpected shape yields an empty map, which sends every card to the host probe.
pub async fn fetch_route_map(
    fetcher: &ResilientFetcher,
    url: &str,
) -> Result<RouteMap, HarvestError> {
    let output = fetcher.get(url).await?;
    let doc = output
        .json()
        .map_err(|err| HarvestError::malformed("route map", err))?;

    let routes = RouteMap::from_upstreams(&doc);
    if routes.is_empty() {
        harvest_warn!("Route map from {} has no usable host ranges", url);
    } else {
        harvest_info!("Route map loaded: {} host ranges", routes.len());
    }
    Ok(routes)
}
