use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::EnrichedItem;

/// Columns produced when the caller does not ask for specific ones.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "Артикул продавца",
    "Наименование",
    "Бренд",
    "Категория",
    "Описание",
    "Состав",
    "Страна производства",
    "Комплектация",
    "ТНВЭД",
];

/// One requested output column.
///
/// `group` names the grouped-option set searched before the flat option list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawColumn")]
pub struct ColumnDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
        }
    }

    pub fn in_group(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: Some(group.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        group: Option<String>,
    },
}

impl From<RawColumn> for ColumnDef {
    fn from(raw: RawColumn) -> Self {
        match raw {
            RawColumn::Name(name) => ColumnDef::new(name),
            RawColumn::Detailed { name, group } => Self {
                name,
                group: group.filter(|g| !g.trim().is_empty()),
            },
        }
    }
}

/// Ordered list of columns; defines the shape of every output record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSpec {
    columns: Vec<ColumnDef>,
}

impl ColumnSpec {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(ColumnDef::new).collect(),
        }
    }

    pub fn defaults() -> Self {
        Self::from_names(DEFAULT_COLUMNS.iter().copied())
    }

    /// Default columns followed by every option name seen in the cards, sorted.
    pub fn discover(items: &[EnrichedItem]) -> Self {
        let mut spec = Self::defaults();
        let known: BTreeSet<String> = spec.names().map(str::to_owned).collect();
        let seen: BTreeSet<&str> = items
            .iter()
            .filter_map(|enriched| enriched.card.as_ref())
            .flat_map(|card| card.option_names())
            .filter(|name| !known.contains(*name))
            .collect();
        spec.columns.extend(seen.into_iter().map(ColumnDef::new));
        spec
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read column catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("column catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Static `category -> subcategory -> columns` table supplied by configuration.
///
/// Loaded once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ColumnCatalog {
    categories: BTreeMap<String, BTreeMap<String, ColumnSpec>>,
}

impl ColumnCatalog {
    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn columns_for(&self, category: &str, subcategory: &str) -> Option<&ColumnSpec> {
        self.categories.get(category)?.get(subcategory)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn subcategories(&self, category: &str) -> impl Iterator<Item = &str> {
        self.categories
            .get(category)
            .into_iter()
            .flat_map(|subs| subs.keys().map(String::as_str))
    }
}
