use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use harvest_core::{
    CatalogItem, ColumnSpec, EnrichedItem, FieldMapper, HarvestRecord, ProgressEvent, RouteMap,
};
use harvest_logging::{harvest_error, harvest_info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConcurrencyMode, HarvestConfig};
use crate::enrich::ItemEnricher;
use crate::fetch::{Fetcher, ReqwestFetcher, ResilientFetcher};
use crate::pacing::Pacer;
use crate::pager::{pages_count, CatalogPager, PageOutcome, SellerFilters};
use crate::routes::fetch_route_map;
use crate::HarvestError;

/// Characters of the product name shown in a progress message.
const PROGRESS_NAME_CHARS: usize = 50;

/// What to harvest: one seller, optional listing filters and the output columns.
///
/// An empty `columns` spec asks the run to discover columns from the cards it saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestRequest {
    pub seller_id: String,
    pub filters: SellerFilters,
    pub columns: ColumnSpec,
}

impl HarvestRequest {
    pub fn new(seller_id: impl Into<String>, columns: ColumnSpec) -> Self {
        Self {
            seller_id: seller_id.into(),
            filters: SellerFilters::default(),
            columns,
        }
    }

    pub fn with_filters(mut self, filters: SellerFilters) -> Self {
        self.filters = filters;
        self
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Runs complete harvests: route map, count, pages, cards, mapping.
///
/// One `Harvester` can serve several runs; runs share the HTTP connection pool
/// and nothing else.
#[derive(Debug)]
pub struct Harvester {
    config: HarvestConfig,
    fetcher: ResilientFetcher,
    pager: CatalogPager,
    enricher: ItemEnricher,
    pacer: Pacer,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Result<Self, HarvestError> {
        let inner: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(&config.fetch)?);
        Ok(Self::with_fetcher(config, inner))
    }

    pub fn with_fetcher(config: HarvestConfig, inner: Arc<dyn Fetcher>) -> Self {
        let fetcher = ResilientFetcher::new(
            inner.clone(),
            config.fetch.retry.clone(),
            config.fetch.request_timeout,
        );
        let pager = CatalogPager::new(fetcher.clone(), config.endpoints.clone());
        let enricher = ItemEnricher::new(inner, config.enrich.clone());
        let pacer = Pacer::new(config.pacing);
        Self {
            config,
            fetcher,
            pager,
            enricher,
            pacer,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    pub fn pager(&self) -> &CatalogPager {
        &self.pager
    }

    /// Runs one harvest, reporting through `sink`.
    ///
    /// Exactly one terminal event (`Result` or `Error`) is emitted; the same
    /// error is also returned to the caller.
    pub async fn run(
        &self,
        request: &HarvestRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), HarvestError> {
        match self.execute(request, sink, cancel).await {
            Ok((columns, records)) => {
                harvest_info!(
                    "Harvest for seller {} finished with {} records",
                    request.seller_id,
                    records.len()
                );
                sink.emit(ProgressEvent::Result { columns, records });
                Ok(())
            }
            Err(err) => {
                harvest_error!("Harvest for seller {} failed: {}", request.seller_id, err);
                sink.emit(ProgressEvent::error(err.cause(), err.to_string()));
                Err(err)
            }
        }
    }

    /// Starts a run on the current tokio runtime and returns its event stream.
    ///
    /// The stream ends after the terminal event.
    pub fn spawn(
        self: Arc<Self>,
        request: HarvestRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = self.run(&request, &tx, &cancel).await;
        });
        rx
    }

    async fn execute(
        &self,
        request: &HarvestRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, Vec<HarvestRecord>), HarvestError> {
        log(sink, "Fetching content host route map");
        let routes = cancellable(
            cancel,
            fetch_route_map(&self.fetcher, &self.config.endpoints.route_map),
        )
        .await??;

        let total = cancellable(
            cancel,
            self.pager.count_total(&request.seller_id, &request.filters),
        )
        .await??;
        let pages = pages_count(total);
        sink.emit(ProgressEvent::Start {
            total,
            message: format!("Found {total} products on {pages} pages"),
        });
        harvest_info!(
            "Seller {}: {} products on {} pages",
            request.seller_id,
            total,
            pages
        );

        let mut enriched: Vec<EnrichedItem> = Vec::new();
        let mut current = 0u64;
        for page in 1..=pages {
            ensure_running(cancel)?;
            let outcome = cancellable(
                cancel,
                self.pager
                    .fetch_page_or_skip(&request.seller_id, &request.filters, page),
            )
            .await?;
            match outcome {
                PageOutcome::Items(items) => {
                    let page_items = match self.config.concurrency {
                        ConcurrencyMode::Sequential => {
                            self.enrich_sequential(items, &routes, total, &mut current, sink, cancel)
                                .await?
                        }
                        ConcurrencyMode::Bounded { .. } => {
                            self.enrich_bounded(items, &routes, total, &mut current, sink, cancel)
                                .await?
                        }
                    };
                    enriched.extend(page_items);
                }
                PageOutcome::Skipped { page, reason } => {
                    log(sink, format!("Skipping page {page}: {reason}"));
                }
            }
            if page < pages {
                cancellable(cancel, self.pacer.between_pages()).await?;
            }
        }
        ensure_running(cancel)?;

        let columns = if request.columns.is_empty() {
            ColumnSpec::discover(&enriched)
        } else {
            request.columns.clone()
        };
        log(
            sink,
            format!(
                "Mapping {} items to {} columns",
                enriched.len(),
                columns.len()
            ),
        );
        let mapper = FieldMapper::new(&columns, self.config.missing_cards);
        let records = mapper.map(&enriched);

        log(sink, format!("Preparing export of {} records", records.len()));
        let names = mapper.plan().columns().map(str::to_string).collect();
        Ok((names, records))
    }

    async fn enrich_sequential(
        &self,
        items: Vec<CatalogItem>,
        routes: &RouteMap,
        total: u64,
        current: &mut u64,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnrichedItem>, HarvestError> {
        let count = items.len();
        let mut enriched = Vec::with_capacity(count);
        for (index, item) in items.into_iter().enumerate() {
            ensure_running(cancel)?;
            let done = cancellable(cancel, self.enricher.enrich(item, routes)).await?;
            *current += 1;
            report_item(sink, *current, total, &done.item);
            enriched.push(done);
            if index + 1 < count {
                cancellable(cancel, self.pacer.between_items()).await?;
            }
        }
        Ok(enriched)
    }

    /// Enriches a page with up to `workers` cards in flight.
    ///
    /// Progress follows completion order; the returned items are back in
    /// listing order.
    async fn enrich_bounded(
        &self,
        items: Vec<CatalogItem>,
        routes: &RouteMap,
        total: u64,
        current: &mut u64,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnrichedItem>, HarvestError> {
        let workers = self.config.concurrency.workers();
        let count = items.len();
        let enricher = &self.enricher;
        let mut in_flight = futures_util::stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move { (index, enricher.enrich(item, routes).await) })
            .buffer_unordered(workers);

        let mut finished = Vec::with_capacity(count);
        while let Some((index, done)) = cancellable(cancel, in_flight.next()).await? {
            *current += 1;
            report_item(sink, *current, total, &done.item);
            finished.push((index, done));
        }
        finished.sort_by_key(|(index, _)| *index);
        Ok(finished.into_iter().map(|(_, done)| done).collect())
    }
}

fn log(sink: &dyn ProgressSink, message: impl Into<String>) {
    let message = message.into();
    harvest_info!("{}", message);
    sink.emit(ProgressEvent::log(message));
}

fn report_item(sink: &dyn ProgressSink, current: u64, total: u64, item: &CatalogItem) {
    let name: String = item.name.chars().take(PROGRESS_NAME_CHARS).collect();
    sink.emit(ProgressEvent::Progress {
        current,
        total,
        message: format!("[{current}/{total}] {name}"),
    });
}

fn ensure_running(cancel: &CancellationToken) -> Result<(), HarvestError> {
    if cancel.is_cancelled() {
        return Err(HarvestError::Cancelled);
    }
    Ok(())
}

/// Awaits `fut` unless the token fires first.
async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, HarvestError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarvestError::Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::{FetchError, FetchOutput};

    struct Recording(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recording {
        fn emit(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct NeverAnswers;

    #[async_trait::async_trait]
    impl Fetcher for NeverAnswers {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<FetchOutput, FetchError> {
            std::future::pending().await
        }
    }

    #[test]
    fn progress_message_truncates_long_names() {
        let sink = Recording(Mutex::new(Vec::new()));
        let item = CatalogItem::new(1, "x".repeat(80));
        report_item(&sink, 3, 10, &item);
        let events = sink.0.into_inner().unwrap();
        assert_eq!(
            events,
            vec![ProgressEvent::Progress {
                current: 3,
                total: 10,
                message: format!("[3/10] {}", "x".repeat(50)),
            }]
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_request() {
        let harvester = Harvester::with_fetcher(HarvestConfig::default(), Arc::new(NeverAnswers));
        let sink = Recording(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let request = HarvestRequest::new("1", ColumnSpec::defaults());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = harvester.run(&request, &sink, &cancel).await;
        assert_eq!(result, Err(HarvestError::Cancelled));
        let events = sink.0.into_inner().unwrap();
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Error {
                cause: harvest_core::ErrorCause::Cancelled,
                ..
            })
        ));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }
}
