use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use harvest_core::{ColumnCatalog, ColumnSpec};
use harvest_engine::{ConcurrencyMode, HarvestConfig};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(
    name = "harvest_app",
    about = "Harvests a seller's catalog and exports it as JSON"
)]
pub struct Cli {
    /// Seller (supplier) id
    pub seller_id: String,
    #[arg(long)]
    pub brand: Option<String>,
    /// Subject id passed straight to the listing filters
    #[arg(long, conflicts_with = "subject_name")]
    pub subject: Option<u64>,
    /// Subject name, resolved to an id before the run
    #[arg(long)]
    pub subject_name: Option<String>,
    /// Resolve --subject-name through the catalog menu instead of the seller filters
    #[arg(long, requires = "subject_name")]
    pub menu_search: bool,
    /// Column catalog JSON (category -> subcategory -> columns)
    #[arg(long, requires_all = ["category", "subcategory"])]
    pub columns: Option<PathBuf>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub subcategory: Option<String>,
    /// Engine configuration JSON; missing keys keep their defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value = "output")]
    pub out: PathBuf,
    /// Card workers; 1 keeps the sequential, paced mode
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

impl Cli {
    pub fn harvest_config(&self) -> anyhow::Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_json_file(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.concurrency = match workers {
                0 | 1 => ConcurrencyMode::Sequential,
                workers => ConcurrencyMode::Bounded { workers },
            };
        }
        Ok(config)
    }

    /// Columns from the catalog file, or an empty spec (discover from cards).
    pub fn column_spec(&self) -> anyhow::Result<ColumnSpec> {
        let Some(path) = &self.columns else {
            return Ok(ColumnSpec::default());
        };
        let category = self.category.as_deref().unwrap_or_default();
        let subcategory = self.subcategory.as_deref().unwrap_or_default();
        let catalog = ColumnCatalog::from_json_file(path)
            .with_context(|| format!("loading column catalog {}", path.display()))?;
        catalog
            .columns_for(category, subcategory)
            .cloned()
            .ok_or_else(|| anyhow!("no columns for {category:?} / {subcategory:?} in {}", path.display()))
    }
}
