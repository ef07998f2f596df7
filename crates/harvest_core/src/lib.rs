//! Harvest core: IO-free data model, host routing and field mapping.
mod columns;
mod event;
mod item;
mod mapper;
mod numeric;
mod record;
mod route;

pub use columns::{CatalogError, ColumnCatalog, ColumnDef, ColumnSpec, DEFAULT_COLUMNS};
pub use event::{ErrorCause, ProgressEvent};
pub use item::{CardOption, CatalogItem, EnrichedItem, EnrichmentDocument, OptionGroup};
pub use mapper::{
    is_numeric_column, map_items, ColumnRule, ExtractionPlan, ExtractorRule, FieldMapper,
    MissingCardPolicy, WellKnownField,
};
pub use numeric::extract_number;
pub use record::{CellValue, HarvestRecord};
pub use route::{lookup, lookup_volume, part_key, volume_key, HostRange, RouteMap};
