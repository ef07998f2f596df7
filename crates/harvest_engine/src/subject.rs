//! Subject (subcategory) id resolution strategies.
//!
//! The listing API filters by a numeric subject id, while callers usually know
//! the subject by name. Each strategy turns a name into an id its own way.

use harvest_logging::harvest_debug;
use serde_json::Value;

use crate::fetch::ResilientFetcher;
use crate::pager::{CatalogPager, SellerFilters};
use crate::HarvestError;

#[async_trait::async_trait]
pub trait SubjectResolver: Send + Sync {
    /// Subject id for `name` in the context of `seller_id`, if one exists.
    async fn resolve_subject(
        &self,
        seller_id: &str,
        name: &str,
    ) -> Result<Option<u64>, HarvestError>;
}

/// The id is already known; the name is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectSubject(pub u64);

#[async_trait::async_trait]
impl SubjectResolver for DirectSubject {
    async fn resolve_subject(&self, _seller_id: &str, _name: &str) -> Result<Option<u64>, HarvestError> {
        Ok(Some(self.0))
    }
}

/// Looks the name up among the subject filter values of the seller's catalog.
#[derive(Debug, Clone)]
pub struct SellerFilterScan {
    pager: CatalogPager,
    filters: SellerFilters,
}

impl SellerFilterScan {
    pub fn new(pager: CatalogPager, filters: SellerFilters) -> Self {
        Self { pager, filters }
    }
}

#[async_trait::async_trait]
impl SubjectResolver for SellerFilterScan {
    async fn resolve_subject(
        &self,
        seller_id: &str,
        name: &str,
    ) -> Result<Option<u64>, HarvestError> {
        let doc = self.pager.filters_document(seller_id, &self.filters).await?;
        Ok(find_in_seller_filters(&doc, name))
    }
}

/// Searches the public catalog menu tree for a node with the given name.
#[derive(Debug, Clone)]
pub struct MenuSearch {
    fetcher: ResilientFetcher,
    menu_url: String,
}

impl MenuSearch {
    pub fn new(fetcher: ResilientFetcher, menu_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            menu_url: menu_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl SubjectResolver for MenuSearch {
    async fn resolve_subject(
        &self,
        _seller_id: &str,
        name: &str,
    ) -> Result<Option<u64>, HarvestError> {
        let output = self.fetcher.get(&self.menu_url).await?;
        let doc = output
            .json()
            .map_err(|err| HarvestError::malformed("catalog menu", err))?;
        Ok(find_in_menu(&doc, name))
    }
}

/// `data.filters[key = "xsubject"].items[name = ...].id`
pub fn find_in_seller_filters(doc: &Value, name: &str) -> Option<u64> {
    let filters = doc.pointer("/data/filters")?.as_array()?;
    let subject_filter = filters
        .iter()
        .find(|filter| filter.get("key").and_then(Value::as_str) == Some("xsubject"))?;
    let found = subject_filter
        .get("items")?
        .as_array()?
        .iter()
        .find(|entry| names_match(entry, name))
        .and_then(node_id);
    harvest_debug!("Seller filter lookup for {:?}: {:?}", name, found);
    found
}

/// Depth-first search over `[{id, name, childs: [...]}]`.
pub fn find_in_menu(doc: &Value, name: &str) -> Option<u64> {
    let roots = match doc {
        Value::Array(nodes) => nodes.as_slice(),
        Value::Object(_) => std::slice::from_ref(doc),
        _ => return None,
    };
    let mut stack: Vec<&Value> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if names_match(node, name) {
            if let Some(id) = node_id(node) {
                return Some(id);
            }
        }
        if let Some(children) = node.get("childs").and_then(Value::as_array) {
            stack.extend(children.iter().rev());
        }
    }
    None
}

fn names_match(node: &Value, wanted: &str) -> bool {
    node.get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.trim().to_lowercase() == wanted.trim().to_lowercase())
}

fn node_id(node: &Value) -> Option<u64> {
    match node.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
