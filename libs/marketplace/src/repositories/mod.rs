//! Persistence layer for users, categories and products
//!
//! Each aggregate has a repository trait with a PostgreSQL implementation
//! (`postgres`) and an in-memory one (`memory`) used in tests and local runs.
//! Relations (subscribers, product categories) are loaded through explicit
//! calls, never inferred from a missing field.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MarketResult;
use crate::models::{Category, Pagination, Product, User};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{PgCategoryRepository, PgProductRepository, PgUserRepository};

/// Repository trait for user persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Number of registered users, active or not
    async fn count(&self) -> MarketResult<i64>;

    /// Insert a new user; duplicate email is a `Conflict`
    async fn insert(&self, user: &User) -> MarketResult<User>;

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> MarketResult<Option<User>>;

    /// Exact name match
    async fn find_by_name(&self, name: &str, page: Pagination) -> MarketResult<Vec<User>>;

    async fn list(&self, page: Pagination) -> MarketResult<Vec<User>>;

    /// Persist every mutable field except `last_notified`
    async fn update(&self, user: &User) -> MarketResult<User>;

    /// Set `last_notified = max(last_notified, at)`
    async fn touch_notified(&self, id: Uuid, at: DateTime<Utc>) -> MarketResult<()>;

    /// Atomically claim the notification window of a user
    ///
    /// When the stored `last_notified` is at or before `not_after`, it is set
    /// to `at` and the previous value is returned. `None` means another
    /// fan-out already holds the window (or the user is gone).
    async fn claim_notification(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> MarketResult<Option<DateTime<Utc>>>;

    /// Undo a claim whose dispatch failed, unless a later write replaced it
    async fn release_notification(
        &self,
        id: Uuid,
        claimed: DateTime<Utc>,
        previous: DateTime<Utc>,
    ) -> MarketResult<()>;
}

/// Repository trait for category persistence
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn insert(&self, category: &Category) -> MarketResult<Category>;

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Category>>;

    /// Case-insensitive name match, or exact slug match
    async fn find_by_name_or_slug(&self, term: &str) -> MarketResult<Option<Category>>;

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Category>>;

    async fn update(&self, category: &Category) -> MarketResult<Category>;

    /// Delete a category no product references, with its subscriber edges
    ///
    /// Runs as one unit: a category still tagged on a product is a
    /// `Conflict` and nothing changes. Returns the number of categories removed.
    async fn delete_with_subscribers(&self, id: Uuid) -> MarketResult<u64>;

    /// Add a subscriber; `false` when the user was already subscribed
    async fn add_subscriber(&self, category_id: Uuid, user_id: Uuid) -> MarketResult<bool>;

    /// Subscribers in subscription order
    async fn subscribers(&self, category_id: Uuid) -> MarketResult<Vec<User>>;
}

/// Repository trait for product persistence
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert the product row and its category edges atomically
    async fn insert(&self, product: &Product) -> MarketResult<Product>;

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Product>>;

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Product>>;

    async fn find_by_category(&self, category_id: Uuid) -> MarketResult<Vec<Product>>;

    /// Persist scalar fields and replace the category edges
    async fn update(&self, product: &Product) -> MarketResult<Product>;

    /// Remove every category and subscriber edge of the product, then the
    /// row itself, as one unit. Returns the number of products removed.
    async fn delete_with_relations(&self, id: Uuid) -> MarketResult<u64>;

    /// Add a subscriber; `false` when the user was already subscribed
    async fn add_subscriber(&self, product_id: Uuid, user_id: Uuid) -> MarketResult<bool>;

    /// Subscribers in subscription order
    async fn subscribers(&self, product_id: Uuid) -> MarketResult<Vec<User>>;
}
