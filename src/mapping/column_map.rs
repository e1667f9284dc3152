//! Source-to-warehouse column maps
//!
//! A [`ColumnMap`] renames the fields of one entity from source-system names
//! (`CustomerID`, `ProductName`, `TransactionID`) to warehouse column names. Maps are
//! immutable once built and are passed explicitly; there is no global registry.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::MappingError;
use crate::models::{EntityType, Record, RecordSet};
use crate::warehouse::TableDef;

static RE_SNAKE_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$").expect("Invalid regex"));

const CUSTOMER_PAIRS: &[(&str, &str)] = &[
    ("CustomerID", "customer_id"),
    ("Name", "name"),
    ("Region", "region"),
    ("JoinDate", "join_date"),
    ("LoyaltyPoints", "loyalty_points"),
    ("PreferredContactMethod", "preferred_contact_method"),
];

const PRODUCT_PAIRS: &[(&str, &str)] = &[
    ("ProductID", "product_id"),
    ("ProductName", "product_name"),
    ("Category", "category"),
    ("UnitPrice", "unit_price"),
    ("StockQuantity", "stock_quantity"),
    ("Supplier", "supplier"),
];

const SALE_PAIRS: &[(&str, &str)] = &[
    ("TransactionID", "sale_id"),
    ("CustomerID", "customer_id"),
    ("ProductID", "product_id"),
    ("SaleAmount", "sale_amount"),
    ("SaleDate", "sale_date"),
    ("StoreID", "store_id"),
    ("CampaignID", "campaign_id"),
    ("DiscountPercent", "discount_percent"),
    ("State", "state"),
];

/// Check that a destination is a lower snake_case identifier
pub fn is_snake_case(name: &str) -> bool {
    RE_SNAKE_CASE.is_match(name)
}

/// Immutable rename table for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    entity: EntityType,
    /// (source, destination) in declaration order
    pairs: Vec<(String, String)>,
    /// Destinations that must appear in a mapped header
    required: Vec<String>,
}

impl ColumnMap {
    /// Build and validate a map for `table`.
    ///
    /// Every column of the table must be the destination of some source field,
    /// destinations must be snake_case, and neither sources nor destinations may
    /// repeat. Destinations outside the table are allowed here; the refresh rejects
    /// them when they reach the store.
    pub fn new<S, D>(
        table: &TableDef,
        pairs: impl IntoIterator<Item = (S, D)>,
    ) -> Result<Self, MappingError>
    where
        S: Into<String>,
        D: Into<String>,
    {
        let entity = table.entity;
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(s, d)| (s.into(), d.into()))
            .collect();

        let mut sources = HashSet::new();
        let mut destinations: BTreeMap<&str, &str> = BTreeMap::new();
        for (source, destination) in &pairs {
            if !is_snake_case(destination) {
                return Err(MappingError::InvalidDestination {
                    entity,
                    destination: destination.clone(),
                });
            }
            if !sources.insert(source.as_str()) {
                return Err(MappingError::DuplicateSource {
                    entity,
                    field: source.clone(),
                });
            }
            if let Some(first) = destinations.insert(destination.as_str(), source.as_str()) {
                return Err(MappingError::DuplicateDestination {
                    entity,
                    destination: destination.clone(),
                    sources: vec![first.to_string(), source.clone()],
                });
            }
        }

        let missing: Vec<String> = table
            .columns
            .iter()
            .filter(|c| !destinations.contains_key(c.name))
            .map(|c| c.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MappingError::IncompleteMapping { entity, missing });
        }

        Ok(Self {
            entity,
            required: table.column_names().into_iter().map(String::from).collect(),
            pairs,
        })
    }

    /// Default map for an entity, following source-system naming
    pub fn standard(table: &TableDef) -> Result<Self, MappingError> {
        let pairs = match table.entity {
            EntityType::Customer => CUSTOMER_PAIRS,
            EntityType::Product => PRODUCT_PAIRS,
            EntityType::Sale => SALE_PAIRS,
        };
        Self::new(table, pairs.iter().copied())
    }

    /// Default map with `overrides` applied.
    ///
    /// An override entry replaces any default entry that has the same source or the
    /// same destination, so `CustID = "customer_id"` swaps the source of `customer_id`.
    pub fn with_overrides(
        table: &TableDef,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, MappingError> {
        let base = Self::standard(table)?;
        if overrides.is_empty() {
            return Ok(base);
        }
        let mut pairs: Vec<(String, String)> = base
            .pairs
            .into_iter()
            .filter(|(s, d)| {
                !overrides.contains_key(s) && !overrides.values().any(|od| od == d)
            })
            .collect();
        pairs.extend(overrides.iter().map(|(s, d)| (s.clone(), d.clone())));
        debug!(
            "Applied {} mapping override(s) for {}",
            overrides.len(),
            table.entity
        );
        Self::new(table, pairs)
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// (source, destination) pairs
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Destination for a source field, if mapped
    pub fn destination(&self, source: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, d)| d.as_str())
    }

    /// Name a field carries after mapping (unmapped names pass through)
    pub fn rename<'a>(&'a self, field: &'a str) -> &'a str {
        self.destination(field).unwrap_or(field)
    }

    /// Destinations every non-empty header must produce
    pub fn required_destinations(&self) -> &[String] {
        &self.required
    }

    /// Rename the fields of one record; values are untouched
    pub fn map_record(&self, record: &Record) -> Record {
        record
            .iter()
            .map(|(field, value)| (self.rename(field).to_string(), value.clone()))
            .collect()
    }
}

/// The column maps of all three entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConfig {
    customer: ColumnMap,
    product: ColumnMap,
    sale: ColumnMap,
}

impl MappingConfig {
    /// Assemble a config from validated maps
    pub fn new(customer: ColumnMap, product: ColumnMap, sale: ColumnMap) -> Result<Self, MappingError> {
        for (expected, map) in [
            (EntityType::Customer, &customer),
            (EntityType::Product, &product),
            (EntityType::Sale, &sale),
        ] {
            if map.entity != expected {
                return Err(MappingError::WrongEntity {
                    expected,
                    found: map.entity,
                });
            }
        }
        Ok(Self {
            customer,
            product,
            sale,
        })
    }

    /// Default maps for the standard warehouse schema
    pub fn standard() -> Result<Self, MappingError> {
        Self::with_overrides(&BTreeMap::new())
    }

    /// Default maps with per-entity overrides keyed by entity name
    /// (`customer`, `products`, ...)
    pub fn with_overrides(
        overrides: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self, MappingError> {
        let mut by_entity: BTreeMap<EntityType, &BTreeMap<String, String>> = BTreeMap::new();
        for (name, entries) in overrides {
            let entity: EntityType = name
                .parse()
                .map_err(|_| MappingError::UnknownEntity(name.clone()))?;
            by_entity.insert(entity, entries);
        }

        let empty = BTreeMap::new();
        let build = |table: &TableDef| {
            ColumnMap::with_overrides(table, by_entity.get(&table.entity).copied().unwrap_or(&empty))
        };
        Self::new(
            build(&crate::warehouse::schema::CUSTOMER_TABLE)?,
            build(&crate::warehouse::schema::PRODUCT_TABLE)?,
            build(&crate::warehouse::schema::SALE_TABLE)?,
        )
    }

    /// Map for an entity
    pub fn get(&self, entity: EntityType) -> &ColumnMap {
        match entity {
            EntityType::Customer => &self.customer,
            EntityType::Product => &self.product,
            EntityType::Sale => &self.sale,
        }
    }
}

/// Applies a [`MappingConfig`] to records and record sets
pub struct ColumnMapper<'a> {
    config: &'a MappingConfig,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    /// Rename one record of `entity`
    pub fn map_record(&self, entity: EntityType, record: &Record) -> Record {
        self.config.get(entity).map_record(record)
    }

    /// Rename the header and every row of a record set.
    ///
    /// A non-empty header that lacks a required destination, or in which two fields
    /// land on the same name, is a [`MappingError::SchemaMismatch`].
    pub fn map_record_set(&self, set: &RecordSet) -> Result<RecordSet, MappingError> {
        let map = self.config.get(set.entity);
        let columns: Vec<String> = set
            .columns
            .iter()
            .map(|c| map.rename(c).to_string())
            .collect();

        let mut seen = HashSet::new();
        for (original, renamed) in set.columns.iter().zip(&columns) {
            if !seen.insert(renamed.as_str()) {
                return Err(MappingError::SchemaMismatch {
                    entity: set.entity,
                    detail: format!(
                        "field '{}' maps to '{}', which is already present",
                        original, renamed
                    ),
                });
            }
        }

        if !(columns.is_empty() && set.rows.is_empty()) {
            let missing: Vec<&str> = map
                .required_destinations()
                .iter()
                .filter(|d| !seen.contains(d.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(MappingError::SchemaMismatch {
                    entity: set.entity,
                    detail: format!("input has no column for: {}", missing.join(", ")),
                });
            }
        }

        let rows = set.rows.iter().map(|r| map.map_record(r)).collect();
        let mut mapped = RecordSet::new(set.entity, columns, rows);
        mapped.origin = set.origin.clone();
        mapped.fingerprint = set.fingerprint.clone();
        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::schema::{CUSTOMER_TABLE, PRODUCT_TABLE, SALE_TABLE};
    use serde_json::{Value, json};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_map_record_renames_and_passes_through() {
        let config = MappingConfig::standard().unwrap();
        let mapper = ColumnMapper::new(&config);

        let mapped = mapper.map_record(
            EntityType::Customer,
            &record(json!({"CustomerID": 7, "Name": "Ada"})),
        );
        assert_eq!(Value::Object(mapped), json!({"customer_id": 7, "name": "Ada"}));

        let drifted = mapper.map_record(
            EntityType::Customer,
            &record(json!({"CustomerID": 7, "CustomerSegment": "Gold"})),
        );
        assert_eq!(drifted.get("CustomerSegment"), Some(&json!("Gold")));
    }

    #[test]
    fn test_sale_transaction_id_becomes_sale_id() {
        let config = MappingConfig::standard().unwrap();
        let map = config.get(EntityType::Sale);
        assert_eq!(map.destination("TransactionID"), Some("sale_id"));
        assert_eq!(map.rename("Unmapped"), "Unmapped");
    }

    #[test]
    fn test_incomplete_mapping_rejected() {
        let err = ColumnMap::new(&PRODUCT_TABLE, [("ProductID", "product_id")]).unwrap_err();
        match err {
            MappingError::IncompleteMapping { entity, missing } => {
                assert_eq!(entity, EntityType::Product);
                assert!(missing.contains(&"supplier".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_and_duplicate_destinations_rejected() {
        let mut pairs: Vec<(&str, &str)> = CUSTOMER_PAIRS.to_vec();
        pairs.push(("Extra", "Not Snake"));
        assert!(matches!(
            ColumnMap::new(&CUSTOMER_TABLE, pairs).unwrap_err(),
            MappingError::InvalidDestination { .. }
        ));

        let mut pairs: Vec<(&str, &str)> = CUSTOMER_PAIRS.to_vec();
        pairs.push(("CustID", "customer_id"));
        assert!(matches!(
            ColumnMap::new(&CUSTOMER_TABLE, pairs).unwrap_err(),
            MappingError::DuplicateDestination { .. }
        ));
    }

    #[test]
    fn test_overrides_replace_matching_entries() {
        let mut customer = BTreeMap::new();
        customer.insert("CustID".to_string(), "customer_id".to_string());
        let mut overrides = BTreeMap::new();
        overrides.insert("customers".to_string(), customer);

        let config = MappingConfig::with_overrides(&overrides).unwrap();
        let map = config.get(EntityType::Customer);
        assert_eq!(map.destination("CustID"), Some("customer_id"));
        assert_eq!(map.destination("CustomerID"), None);
        assert_eq!(map.destination("Name"), Some("name"));
    }

    #[test]
    fn test_unknown_override_entity() {
        let mut overrides = BTreeMap::new();
        overrides.insert("orders".to_string(), BTreeMap::new());
        assert!(matches!(
            MappingConfig::with_overrides(&overrides).unwrap_err(),
            MappingError::UnknownEntity(_)
        ));
    }

    #[test]
    fn test_wrong_entity_rejected() {
        let customer = ColumnMap::standard(&CUSTOMER_TABLE).unwrap();
        let sale = ColumnMap::standard(&SALE_TABLE).unwrap();
        assert!(MappingConfig::new(customer.clone(), customer, sale).is_err());
    }

    #[test]
    fn test_map_record_set_header_and_rows() {
        let config = MappingConfig::standard().unwrap();
        let header: Vec<String> = PRODUCT_PAIRS.iter().map(|(s, _)| s.to_string()).collect();
        let row = record(json!({
            "ProductID": 10, "ProductName": "Laptop", "Category": "Electronics",
            "UnitPrice": 799.99, "StockQuantity": 5, "Supplier": "Acme"
        }));
        let set = RecordSet::new(EntityType::Product, header, vec![row]).with_fingerprint("abc");

        let mapped = ColumnMapper::new(&config).map_record_set(&set).unwrap();
        assert_eq!(mapped.columns[0], "product_id");
        assert_eq!(mapped.rows[0].get("unit_price"), Some(&json!(799.99)));
        assert_eq!(mapped.fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_map_record_set_missing_required_column() {
        let config = MappingConfig::standard().unwrap();
        let set = RecordSet::from_rows(
            EntityType::Customer,
            vec![record(json!({"CustomerID": 1, "Name": "Ada"}))],
        );
        match ColumnMapper::new(&config).map_record_set(&set).unwrap_err() {
            MappingError::SchemaMismatch { entity, detail } => {
                assert_eq!(entity, EntityType::Customer);
                assert!(detail.contains("region"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_record_set_colliding_names() {
        let config = MappingConfig::standard().unwrap();
        let mut header: Vec<String> = CUSTOMER_PAIRS.iter().map(|(s, _)| s.to_string()).collect();
        header.push("customer_id".to_string());
        let set = RecordSet::new(EntityType::Customer, header, vec![]);
        assert!(matches!(
            ColumnMapper::new(&config).map_record_set(&set).unwrap_err(),
            MappingError::SchemaMismatch { .. }
        ));
    }

    #[test]
    fn test_empty_set_maps_to_empty_set() {
        let config = MappingConfig::standard().unwrap();
        let set = RecordSet::empty(EntityType::Sale, vec![]);
        let mapped = ColumnMapper::new(&config).map_record_set(&set).unwrap();
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_snake_case() {
        assert!(is_snake_case("preferred_contact_method"));
        assert!(is_snake_case("store_id2"));
        assert!(!is_snake_case("StoreID"));
        assert!(!is_snake_case("_hidden"));
        assert!(!is_snake_case("double__underscore"));
    }
}
