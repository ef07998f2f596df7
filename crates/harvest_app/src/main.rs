mod cli;

use std::sync::Arc;

use anyhow::bail;
use chrono::Local;
use clap::Parser;
use harvest_core::ProgressEvent;
use harvest_engine::{
    export_filename, export_records_json, DirectSubject, HarvestRequest, Harvester, MenuSearch,
    SellerFilterScan, SellerFilters, SubjectResolver,
};
use harvest_logging::{harvest_info, harvest_warn, LogDestination};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    harvest_logging::initialize(LogDestination::Both, cli.log_level);

    let config = cli.harvest_config()?;
    let columns = cli.column_spec()?;
    let harvester = Arc::new(Harvester::new(config)?);

    let mut filters = SellerFilters::default();
    if let Some(brand) = &cli.brand {
        filters = filters.with_brand(brand.as_str());
    }
    if let Some(subject) = resolve_subject(&cli, &harvester, &filters).await? {
        filters = filters.with_subject(subject.to_string());
    }

    let request = HarvestRequest::new(cli.seller_id.as_str(), columns).with_filters(filters);
    let cancel = CancellationToken::new();
    watch_ctrl_c(cancel.clone());

    let mut events = harvester.clone().spawn(request, cancel);
    let mut terminal = None;
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_terminal() {
            terminal = Some(event);
        }
    }

    match terminal {
        Some(ProgressEvent::Result { columns, records }) => {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            let filename = export_filename(&cli.seller_id, &timestamp)?;
            let summary = export_records_json(&cli.out, &filename, &columns, &records)?;
            harvest_info!(
                "Wrote {} rows x {} columns to {}",
                summary.row_count,
                summary.column_count,
                summary.path.display()
            );
            Ok(())
        }
        Some(ProgressEvent::Error { cause, message }) => bail!("harvest failed ({cause}): {message}"),
        _ => bail!("harvest ended without a terminal event"),
    }
}

async fn resolve_subject(
    cli: &Cli,
    harvester: &Harvester,
    filters: &SellerFilters,
) -> anyhow::Result<Option<u64>> {
    let (resolver, name): (Box<dyn SubjectResolver>, &str) = match (cli.subject, &cli.subject_name) {
        (Some(id), _) => (Box::new(DirectSubject(id)), ""),
        (None, Some(name)) if cli.menu_search => (
            Box::new(MenuSearch::new(
                harvester.fetcher().clone(),
                harvester.config().endpoints.catalog_menu.as_str(),
            )),
            name.as_str(),
        ),
        (None, Some(name)) => (
            Box::new(SellerFilterScan::new(harvester.pager().clone(), filters.clone())),
            name.as_str(),
        ),
        (None, None) => return Ok(None),
    };

    match resolver.resolve_subject(&cli.seller_id, name).await? {
        Some(id) => {
            harvest_info!("Subject {:?} resolved to {}", name, id);
            Ok(Some(id))
        }
        None => bail!("subject {name:?} not found for seller {}", cli.seller_id),
    }
}

fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            harvest_warn!("Interrupted; cancelling harvest");
            cancel.cancel();
        }
    });
}
