//! API models for request payloads

use serde::{Deserialize, Serialize};

/// Request to subscribe the caller to a category
#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeCategoryRequest {
    #[serde(rename = "categoryId", alias = "category_id")]
    pub category_id: String,
}

/// Request to subscribe the caller to a product
#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeProductRequest {
    #[serde(rename = "productId", alias = "product_id")]
    pub product_id: String,
}
