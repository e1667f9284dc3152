//! Tests for preparing raw extracts and loading the result

use sales_warehouse::models::RecordSet;
use sales_warehouse::{
    CleaningPolicy, CsvRecordSource, EntityType, Loader, MappingConfig, PrepareError, Preparer,
    SqliteWarehouse,
};
use serde_json::Value;
use tempfile::TempDir;

fn write_raw(dir: &std::path::Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("customers_data.csv"),
        "CustomerID,Name,Region,JoinDate,LoyaltyPoints,PreferredContactMethod\n\
         1,Ada,East,2023-01-05,10,Email\n\
         1,Ada,East,2023-01-05,10,Email\n\
         2,Grace,,2023-02-11,,Phone\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("products_data.csv"),
        "ProductID,ProductName,Category,UnitPrice,StockQuantity,Supplier\n\
         10,Laptop,Electronics,799.99,4,Acme\n\
         11,Cable,Accessories,-3.00,100,Acme\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("sales_data.csv"),
        "TransactionID,SaleDate,CustomerID,ProductID,StoreID,CampaignID,SaleAmount,DiscountPercent,State\n\
         100,2024-02-01,1,10,3,0,799.99,0,OH\n\
         101,2024-02-02,2,10,3,0,799.99,0,OH\n\
         101,2024-02-02,2,10,3,0,799.99,0,OH\n",
    )
    .unwrap();
}

/// Fills missing regions and drops products with a negative price
struct StoreRules;

impl CleaningPolicy for StoreRules {
    fn handle_missing(&self, mut set: RecordSet) -> Result<RecordSet, PrepareError> {
        if set.entity == EntityType::Customer {
            for row in &mut set.rows {
                if row.get("Region").is_none_or(Value::is_null) {
                    row.insert("Region".to_string(), Value::String("Unknown".to_string()));
                }
            }
        }
        Ok(set)
    }

    fn remove_outliers(&self, mut set: RecordSet) -> Result<RecordSet, PrepareError> {
        if set.entity == EntityType::Product {
            set.rows.retain(|row| {
                row.get("UnitPrice")
                    .and_then(Value::as_str)
                    .and_then(|p| p.parse::<f64>().ok())
                    .is_some_and(|p| p >= 0.0)
            });
        }
        Ok(set)
    }
}

#[test]
fn test_prepare_removes_exact_duplicates() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    let prepared = dir.path().join("prepared");
    write_raw(&raw);

    let reports = Preparer::new(&raw, &prepared).prepare_all().unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].rows_read, 3);
    assert_eq!(reports[0].rows_written, 2);
    assert_eq!(reports[1].rows_written, 2);
    assert_eq!(reports[2].rows_written, 2);
    assert!(prepared.join("sales_data_prepared.csv").is_file());

    let content = std::fs::read_to_string(prepared.join("customers_data_prepared.csv")).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(content.starts_with("CustomerID,Name,Region"));
}

#[test]
fn test_policy_stages_then_load() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    let prepared = dir.path().join("prepared");
    write_raw(&raw);

    let reports = Preparer::with_policy(&raw, &prepared, StoreRules)
        .prepare_all()
        .unwrap();
    assert_eq!(reports[1].rows_written, 1);

    let db = dir.path().join("dw.db");
    let report = Loader::new(
        CsvRecordSource::new(&prepared),
        MappingConfig::standard().unwrap(),
        &db,
    )
    .run()
    .unwrap();
    assert_eq!(report.rows_loaded("customer"), Some(2));
    assert_eq!(report.rows_loaded("product"), Some(1));
    assert_eq!(report.rows_loaded("sale"), Some(2));

    let rows = SqliteWarehouse::open(&db)
        .unwrap()
        .execute_query("SELECT region, loyalty_points FROM customer WHERE customer_id = 2")
        .unwrap()
        .rows;
    assert_eq!(rows[0]["region"], "Unknown");
    assert_eq!(rows[0]["loyalty_points"], Value::Null);
}

#[test]
fn test_missing_raw_extract() {
    let dir = TempDir::new().unwrap();
    let err = Preparer::new(dir.path().join("raw"), dir.path().join("prepared"))
        .prepare(EntityType::Sale)
        .unwrap_err();
    assert!(matches!(err, PrepareError::Source(_)));
}
