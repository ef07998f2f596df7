use std::fs;

use harvest_core::{CatalogError, ColumnCatalog, ColumnDef};
use tempfile::TempDir;

const CATALOG: &str = r#"{
    "Дом": {
        "Кружки": ["Артикул продавца", "Наименование", {"name": "Объем", "group": "Габариты"}],
        "Тарелки": ["Бренд", {"name": "Диаметр"}]
    },
    "Одежда": {
        "Футболки": ["Состав", {"name": "Цвет", "group": ""}]
    }
}"#;

#[test]
fn loads_category_subcategory_columns() {
    let catalog = ColumnCatalog::from_json_str(CATALOG).unwrap();

    let mugs = catalog.columns_for("Дом", "Кружки").unwrap();
    assert_eq!(
        mugs.columns(),
        &[
            ColumnDef::new("Артикул продавца"),
            ColumnDef::new("Наименование"),
            ColumnDef::in_group("Объем", "Габариты"),
        ]
    );

    let plates = catalog.columns_for("Дом", "Тарелки").unwrap();
    assert_eq!(plates.columns()[1], ColumnDef::new("Диаметр"));

    // An empty group name means "no group".
    let shirts = catalog.columns_for("Одежда", "Футболки").unwrap();
    assert_eq!(shirts.columns()[1], ColumnDef::new("Цвет"));
}

#[test]
fn unknown_category_or_subcategory_is_none() {
    let catalog = ColumnCatalog::from_json_str(CATALOG).unwrap();
    assert!(catalog.columns_for("Авто", "Шины").is_none());
    assert!(catalog.columns_for("Дом", "Вилки").is_none());
}

#[test]
fn lists_categories_in_stable_order() {
    let catalog = ColumnCatalog::from_json_str(CATALOG).unwrap();
    let categories: Vec<_> = catalog.categories().collect();
    assert_eq!(categories, vec!["Дом", "Одежда"]);
    let subs: Vec<_> = catalog.subcategories("Дом").collect();
    assert_eq!(subs, vec!["Кружки", "Тарелки"]);
    assert_eq!(catalog.subcategories("Авто").count(), 0);
}

#[test]
fn reads_catalog_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("subcategories.json");
    fs::write(&path, CATALOG).unwrap();

    let catalog = ColumnCatalog::from_json_file(&path).unwrap();
    assert!(catalog.columns_for("Дом", "Кружки").is_some());
}

#[test]
fn missing_or_invalid_file_is_a_typed_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.json");
    assert!(matches!(
        ColumnCatalog::from_json_file(&missing),
        Err(CatalogError::Io { .. })
    ));

    assert!(matches!(
        ColumnCatalog::from_json_str("{ not json"),
        Err(CatalogError::Parse(_))
    ));
}
