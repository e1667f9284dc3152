//! Warehouse entity types
//!
//! The loader works with exactly three entities. Each one has a logical name used
//! by the prepared-data area (`customers`, `products`, `sales`) and a table name in
//! the warehouse (`customer`, `product`, `sale`).

use serde::{Deserialize, Serialize};

/// One of the three entities moved through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Customer master data
    Customer,
    /// Product master data
    Product,
    /// Sales transactions (references customers and products)
    Sale,
}

impl EntityType {
    /// All entities, parents first
    pub const ALL: [EntityType; 3] = [EntityType::Customer, EntityType::Product, EntityType::Sale];

    /// Warehouse table name
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Product => "product",
            EntityType::Sale => "sale",
        }
    }

    /// Logical dataset name used by record sources
    pub fn logical_name(&self) -> &'static str {
        match self {
            EntityType::Customer => "customers",
            EntityType::Product => "products",
            EntityType::Sale => "sales",
        }
    }

    /// File name of the prepared extract for this entity
    pub fn prepared_file_name(&self) -> String {
        format!("{}_data_prepared.csv", self.logical_name())
    }

    /// File name of the raw extract for this entity
    pub fn raw_file_name(&self) -> String {
        format!("{}_data.csv", self.logical_name())
    }

    /// Resolve an entity from its table name
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.table_name() == name)
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" | "customers" => Ok(EntityType::Customer),
            "product" | "products" => Ok(EntityType::Product),
            "sale" | "sales" => Ok(EntityType::Sale),
            _ => Err(format!(
                "Unknown entity: {}. Use 'customer', 'product' or 'sale'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.logical_name())
    }
}
