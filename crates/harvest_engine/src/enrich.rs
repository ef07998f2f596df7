use std::sync::Arc;
use std::time::Duration;

use harvest_core::{part_key, volume_key, CatalogItem, EnrichedItem, EnrichmentDocument, RouteMap};
use harvest_logging::{harvest_debug, harvest_trace};

use crate::config::EnrichConfig;
use crate::fetch::Fetcher;
use crate::{FailureKind, FetchError};

/// What a single card request produced.
#[derive(Debug)]
enum CardFetch {
    Found(Option<EnrichmentDocument>),
    Missing,
    Unreachable(FetchError),
    Refused(FetchError),
}

/// Attaches the card document to listing items.
///
/// Cards are best effort: every failure ends in an item without a card and
/// nothing is retried at this level.
#[derive(Clone)]
pub struct ItemEnricher {
    fetcher: Arc<dyn Fetcher>,
    config: EnrichConfig,
}

impl ItemEnricher {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: EnrichConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn card_url(&self, host: &str, id: u64) -> String {
        format!(
            "{scheme}://{host}/vol{vol}/part{part}/{id}/info/ru/card.json",
            scheme = self.config.scheme,
            vol = volume_key(id),
            part = part_key(id),
        )
    }

    pub async fn enrich(&self, item: CatalogItem, routes: &RouteMap) -> EnrichedItem {
        let card = match routes.host_for_item(item.id) {
            Some(host) => self.fetch_from_resolved(host, item.id).await,
            None => self.probe_conventional_hosts(item.id).await,
        };
        EnrichedItem::new(item, card)
    }

    async fn fetch_from_resolved(&self, host: &str, id: u64) -> Option<EnrichmentDocument> {
        let url = self.card_url(host, id);
        match self.fetch_card(&url, self.config.card_timeout).await {
            CardFetch::Found(card) => card,
            CardFetch::Missing => {
                harvest_debug!("No card for {} at {}", id, host);
                None
            }
            CardFetch::Unreachable(err) | CardFetch::Refused(err) => {
                harvest_debug!("Card for {} unavailable from {}: {}", id, host, err);
                None
            }
        }
    }

    /// Tries `basket-01`, `basket-02`, ... until one answers 200.
    ///
    /// 404 and transport errors move on to the next host; any other status stops.
    async fn probe_conventional_hosts(&self, id: u64) -> Option<EnrichmentDocument> {
        for number in 1..=self.config.probe_ceiling {
            let host = self.config.probe_host(number);
            let url = self.card_url(&host, id);
            match self.fetch_card(&url, self.config.probe_timeout).await {
                CardFetch::Found(card) => {
                    harvest_trace!("Card for {} found on probe host {}", id, host);
                    return card;
                }
                CardFetch::Missing => continue,
                CardFetch::Unreachable(err) => {
                    harvest_trace!("Probe host {} unreachable for {}: {}", host, id, err);
                    continue;
                }
                CardFetch::Refused(err) => {
                    harvest_debug!("Probe for {} stopped at {}: {}", id, host, err);
                    return None;
                }
            }
        }
        harvest_debug!(
            "No card for {} on {} conventional hosts",
            id,
            self.config.probe_ceiling
        );
        None
    }

    async fn fetch_card(&self, url: &str, timeout: Duration) -> CardFetch {
        match self.fetcher.get(url, timeout).await {
            Ok(output) => match EnrichmentDocument::from_slice(&output.bytes) {
                Ok(card) => CardFetch::Found(Some(card)),
                Err(err) => {
                    harvest_debug!("Malformed card at {}: {}", url, err);
                    CardFetch::Found(None)
                }
            },
            Err(err) => match err.kind {
                FailureKind::HttpStatus(404) => CardFetch::Missing,
                FailureKind::Timeout | FailureKind::Network => CardFetch::Unreachable(err),
                _ => CardFetch::Refused(err),
            },
        }
    }
}

impl std::fmt::Debug for ItemEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemEnricher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
