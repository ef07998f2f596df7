//! Harvest engine: HTTP transport, paging, card enrichment and run orchestration.
mod config;
mod engine;
mod enrich;
mod export;
mod fetch;
mod harvest;
mod pacing;
mod pager;
mod routes;
mod subject;
mod types;

pub use config::{
    ConcurrencyMode, DelayRange, EnrichConfig, Endpoints, FetchConfig, HarvestConfig,
    PacingConfig, RetryPolicy,
};
pub use engine::HarvestHandle;
pub use enrich::ItemEnricher;
pub use export::{export_filename, export_records_json, ExportError, ExportSummary};
pub use fetch::{Fetcher, ReqwestFetcher, ResilientFetcher};
pub use harvest::{ChannelProgressSink, HarvestRequest, Harvester, ProgressSink};
pub use pacing::Pacer;
pub use pager::{pages_count, CatalogPager, PageOutcome, SellerFilters, PAGE_SIZE};
pub use routes::fetch_route_map;
pub use subject::{
    find_in_menu, find_in_seller_filters, DirectSubject, MenuSearch, SellerFilterScan,
    SubjectResolver,
};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, HarvestError};
