//! Product model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Category;

/// Product entity, with its categories loaded
///
/// Subscribers are a separate relation and are only read through
/// `ProductRepository::subscribers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub cost: f64,
    pub description: String,
    pub in_stock: bool,
    pub owner_id: Uuid,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn category_ids(&self) -> Vec<Uuid> {
        self.categories.iter().map(|c| c.id).collect()
    }
}

/// New product creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub cost: f64,
    #[serde(default)]
    pub description: String,
    /// Category ids, names or slugs
    pub categories: Vec<String>,
}

/// Partial product update
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    #[serde(alias = "inStock")]
    pub in_stock: Option<bool>,
}

/// Result of a hard delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub affected: u64,
}
