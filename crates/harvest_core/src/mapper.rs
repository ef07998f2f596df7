//! Declarative column extraction.
//!
//! A [`ColumnSpec`] is resolved once per run into an [`ExtractionPlan`]: one
//! [`ExtractorRule`] per column. Applying the plan to an item never fails;
//! anything that cannot be found becomes an empty cell.

use std::collections::HashSet;

use serde::Deserialize;

use crate::columns::{ColumnDef, ColumnSpec};
use crate::item::{EnrichedItem, EnrichmentDocument};
use crate::numeric::extract_number;
use crate::record::{CellValue, HarvestRecord};

/// Column-name fragments that mark a column as a measurement.
const NUMERIC_HINTS: &[&str] = &[
    "Вес", "Длина", "Ширина", "Высота", "Глубина", "Диаметр", "Объем", "Объём", "Габариты", "(см)",
    "(мм)", "(кг)", "(г)",
];

const MENU_SECTION_OPTION: &str = "Раздел меню";
const CUSTOMS_CODE_OPTION: &str = "ТН ВЭД";

/// Fields with a dedicated extractor instead of a generic option lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownField {
    VendorCode,
    Brand,
    Name,
    Description,
    ProductId,
    Category,
    CustomsCode,
    Certificates,
}

impl WellKnownField {
    pub fn for_column(name: &str) -> Option<Self> {
        let field = match name {
            "Артикул продавца" => WellKnownField::VendorCode,
            "Бренд" => WellKnownField::Brand,
            "Наименование" => WellKnownField::Name,
            "Описание" => WellKnownField::Description,
            "Артикул WB" => WellKnownField::ProductId,
            "Категория" => WellKnownField::Category,
            "ТНВЭД" => WellKnownField::CustomsCode,
            "Сертификаты" => WellKnownField::Certificates,
            _ => return None,
        };
        Some(field)
    }

    fn extract(self, enriched: &EnrichedItem) -> String {
        let item = &enriched.item;
        let card = enriched.card.as_ref();
        match self {
            WellKnownField::VendorCode => non_empty(&item.vendor_code)
                .or_else(|| card.and_then(|c| non_empty(&c.vendor_code)))
                .unwrap_or_default()
                .to_owned(),
            WellKnownField::Brand => item.brand.clone(),
            WellKnownField::Name => non_empty(&item.name)
                .or_else(|| card.and_then(|c| non_empty(&c.imt_name)))
                .unwrap_or_default()
                .to_owned(),
            WellKnownField::Description => {
                card.map(|c| c.description.clone()).unwrap_or_default()
            }
            WellKnownField::ProductId => item.id.to_string(),
            WellKnownField::Category => card
                .and_then(|c| option_anywhere(c, MENU_SECTION_OPTION))
                .and_then(non_empty)
                .unwrap_or(&item.subject_name)
                .to_owned(),
            WellKnownField::CustomsCode => card
                .and_then(|c| option_anywhere(c, CUSTOMS_CODE_OPTION))
                .unwrap_or_default()
                .to_owned(),
            WellKnownField::Certificates => match card.map(|c| c.certificates.len()) {
                Some(count) if count > 0 => count.to_string(),
                _ => String::new(),
            },
        }
    }
}

/// How one column obtains its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorRule {
    WellKnown(WellKnownField),
    /// Search the named group, then the flat option list.
    GroupedOption { group: String, name: String },
    /// Search the flat option list, then every group in document order.
    FlatOption { name: String },
}

impl ExtractorRule {
    pub fn for_column(column: &ColumnDef) -> Self {
        if let Some(field) = WellKnownField::for_column(&column.name) {
            return ExtractorRule::WellKnown(field);
        }
        match &column.group {
            Some(group) => ExtractorRule::GroupedOption {
                group: group.clone(),
                name: column.name.clone(),
            },
            None => ExtractorRule::FlatOption {
                name: column.name.clone(),
            },
        }
    }

    fn extract(&self, enriched: &EnrichedItem) -> String {
        match self {
            ExtractorRule::WellKnown(field) => field.extract(enriched),
            ExtractorRule::GroupedOption { group, name } => enriched
                .card
                .as_ref()
                .and_then(|c| c.grouped_option(group, name).or_else(|| c.option(name)))
                .unwrap_or_default()
                .to_owned(),
            ExtractorRule::FlatOption { name } => enriched
                .card
                .as_ref()
                .and_then(|c| option_anywhere(c, name))
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRule {
    pub column: String,
    pub rule: ExtractorRule,
    pub numeric: bool,
}

/// What to do with items whose card could not be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCardPolicy {
    /// Keep the item; card-derived columns stay blank.
    #[default]
    Include,
    /// Drop the item from the output.
    Exclude,
}

/// Column rules resolved once for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    rules: Vec<ColumnRule>,
}

impl ExtractionPlan {
    pub fn resolve(spec: &ColumnSpec) -> Self {
        let mut seen = HashSet::new();
        let rules = spec
            .columns()
            .iter()
            .filter(|column| seen.insert(column.name.as_str()))
            .map(|column| ColumnRule {
                column: column.name.clone(),
                rule: ExtractorRule::for_column(column),
                numeric: is_numeric_column(&column.name),
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[ColumnRule] {
        &self.rules
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.column.as_str())
    }

    pub fn apply(&self, enriched: &EnrichedItem) -> HarvestRecord {
        let mut record = HarvestRecord::with_capacity(self.rules.len());
        for rule in &self.rules {
            let raw = rule.rule.extract(enriched);
            let value = if rule.numeric {
                extract_number(&raw)
                    .map(CellValue::Number)
                    .unwrap_or_else(CellValue::empty)
            } else {
                CellValue::Text(raw)
            };
            record.push(rule.column.clone(), value);
        }
        record
    }
}

/// Maps enriched items to flat records according to a column plan.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    plan: ExtractionPlan,
    policy: MissingCardPolicy,
}

impl FieldMapper {
    pub fn new(spec: &ColumnSpec, policy: MissingCardPolicy) -> Self {
        Self {
            plan: ExtractionPlan::resolve(spec),
            policy,
        }
    }

    pub fn plan(&self) -> &ExtractionPlan {
        &self.plan
    }

    pub fn map(&self, items: &[EnrichedItem]) -> Vec<HarvestRecord> {
        items
            .iter()
            .filter(|enriched| match self.policy {
                MissingCardPolicy::Include => true,
                MissingCardPolicy::Exclude => enriched.has_card(),
            })
            .map(|enriched| self.plan.apply(enriched))
            .collect()
    }
}

/// Convenience wrapper: resolve `spec` and map `items` with the default policy.
pub fn map_items(items: &[EnrichedItem], spec: &ColumnSpec) -> Vec<HarvestRecord> {
    FieldMapper::new(spec, MissingCardPolicy::default()).map(items)
}

pub fn is_numeric_column(name: &str) -> bool {
    NUMERIC_HINTS.iter().any(|hint| name.contains(hint))
}

fn option_anywhere<'a>(card: &'a EnrichmentDocument, name: &str) -> Option<&'a str> {
    card.option(name).or_else(|| card.any_grouped_option(name))
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
