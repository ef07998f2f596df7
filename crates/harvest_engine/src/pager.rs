use harvest_core::CatalogItem;
use harvest_logging::{harvest_debug, harvest_warn};
use serde_json::Value;
use url::Url;

use crate::config::Endpoints;
use crate::fetch::ResilientFetcher;
use crate::HarvestError;

/// Items per listing page, fixed by the upstream.
pub const PAGE_SIZE: u64 = 100;

pub fn pages_count(total: u64) -> u64 {
    total.div_ceil(PAGE_SIZE)
}

/// Opaque listing filters, passed through as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SellerFilters {
    pub brand_id: Option<String>,
    pub subject_id: Option<String>,
}

impl SellerFilters {
    pub fn with_brand(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(brand) = non_blank(&self.brand_id) {
            pairs.push(("fbrand", brand));
        }
        if let Some(subject) = non_blank(&self.subject_id) {
            pairs.push(("xsubject", subject));
        }
        pairs
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Result of fetching one page when page failures are not fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Items(Vec<CatalogItem>),
    Skipped { page: u64, reason: HarvestError },
}

/// Total-count discovery and page retrieval against the seller listing API.
#[derive(Debug, Clone)]
pub struct CatalogPager {
    fetcher: ResilientFetcher,
    endpoints: Endpoints,
}

impl CatalogPager {
    pub fn new(fetcher: ResilientFetcher, endpoints: Endpoints) -> Self {
        Self { fetcher, endpoints }
    }

    pub fn filters_url(&self, seller_id: &str, filters: &SellerFilters) -> Result<Url, HarvestError> {
        let mut url = parse_base(&self.endpoints.seller_filters)?;
        url.query_pairs_mut()
            .append_pair("ab_testing", "false")
            .append_pair("appType", "1")
            .append_pair("curr", &self.endpoints.currency)
            .append_pair("dest", &self.endpoints.dest)
            .append_pair("supplier", seller_id)
            .extend_pairs(filters.query_pairs())
            .append_pair("lang", "ru")
            .append_pair("spp", "30");
        Ok(url)
    }

    pub fn page_url(
        &self,
        seller_id: &str,
        filters: &SellerFilters,
        page: u64,
    ) -> Result<Url, HarvestError> {
        let mut url = parse_base(&self.endpoints.seller_catalog)?;
        url.query_pairs_mut()
            .append_pair("ab_testing", "false")
            .append_pair("appType", "1")
            .append_pair("curr", &self.endpoints.currency)
            .append_pair("dest", &self.endpoints.dest)
            .append_pair("hide_dtype", "13")
            .append_pair("page", &page.to_string())
            .append_pair("sort", "popular")
            .append_pair("spp", "30")
            .append_pair("supplier", seller_id)
            .extend_pairs(filters.query_pairs());
        Ok(url)
    }

    /// Raw seller filter document; also the source for subject-name lookups.
    pub async fn filters_document(
        &self,
        seller_id: &str,
        filters: &SellerFilters,
    ) -> Result<Value, HarvestError> {
        let url = self.filters_url(seller_id, filters)?;
        let output = self.fetcher.get(url.as_str()).await?;
        output
            .json()
            .map_err(|err| HarvestError::malformed("seller filters", err))
    }

    /// Number of products for the seller; zero is reported as `NoItemsFound`.
    pub async fn count_total(
        &self,
        seller_id: &str,
        filters: &SellerFilters,
    ) -> Result<u64, HarvestError> {
        let doc = self.filters_document(seller_id, filters).await?;
        let total = doc
            .pointer("/data/total")
            .and_then(Value::as_u64)
            .ok_or_else(|| HarvestError::malformed("seller filters", "missing data.total"))?;
        if total == 0 {
            return Err(HarvestError::NoItemsFound {
                seller_id: seller_id.to_string(),
            });
        }
        Ok(total)
    }

    /// One listing page (1-based). Entries that are not products are dropped.
    pub async fn fetch_page(
        &self,
        seller_id: &str,
        filters: &SellerFilters,
        page: u64,
    ) -> Result<Vec<CatalogItem>, HarvestError> {
        let url = self.page_url(seller_id, filters, page)?;
        let output = self.fetcher.get(url.as_str()).await?;
        let doc = output
            .json()
            .map_err(|err| HarvestError::malformed(format!("catalog page {page}"), err))?;

        let products = doc
            .get("products")
            .or_else(|| doc.pointer("/data/products"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                HarvestError::malformed(format!("catalog page {page}"), "missing products")
            })?;

        let items = products
            .iter()
            .cloned()
            .filter_map(|raw| match CatalogItem::from_value(raw) {
                Ok(item) => Some(item),
                Err(err) => {
                    harvest_debug!("Dropping listing entry on page {}: {}", page, err);
                    None
                }
            })
            .collect();
        Ok(items)
    }

    /// Like [`fetch_page`](Self::fetch_page), but a failed page becomes `Skipped`.
    pub async fn fetch_page_or_skip(
        &self,
        seller_id: &str,
        filters: &SellerFilters,
        page: u64,
    ) -> PageOutcome {
        match self.fetch_page(seller_id, filters, page).await {
            Ok(items) => PageOutcome::Items(items),
            Err(reason) => {
                harvest_warn!("Skipping page {}: {}", page, reason);
                PageOutcome::Skipped { page, reason }
            }
        }
    }
}

fn parse_base(base: &str) -> Result<Url, HarvestError> {
    Url::parse(base).map_err(|err| HarvestError::Config(format!("endpoint {base:?}: {err}")))
}
