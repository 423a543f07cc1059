//! Marketplace domain core
//!
//! Users register and become sellers, sellers list products under
//! categories, and buyers subscribe to categories or products. Catalog
//! changes fan out to subscribers through the notification engine, which
//! throttles per user and delivers through a pluggable dispatch sink.

pub mod credentials;
pub mod error;
pub mod models;
pub mod notifier;
pub mod repositories;
pub mod services;
pub mod slug;
pub mod validation;

use sqlx::PgPool;
use std::sync::Arc;

pub use error::{MarketError, MarketResult};
pub use notifier::{DispatchSink, Notifier, NotifierConfig};
pub use services::{CategoryRegistry, IdentityStore, ProductCatalog};

use repositories::{
    CategoryRepository, InMemoryStore, PgCategoryRepository, PgProductRepository,
    PgUserRepository, ProductRepository, UserRepository,
};

/// The wired set of services
#[derive(Clone)]
pub struct Marketplace {
    pub identity: IdentityStore,
    pub categories: CategoryRegistry,
    pub products: ProductCatalog,
}

impl Marketplace {
    pub fn new(
        users: Arc<dyn UserRepository>,
        categories: Arc<dyn CategoryRepository>,
        products: Arc<dyn ProductRepository>,
        sink: Arc<dyn DispatchSink>,
        config: NotifierConfig,
    ) -> Self {
        let notifier = Notifier::new(users.clone(), sink, config);
        let identity = IdentityStore::new(users);
        let registry = CategoryRegistry::new(categories, identity.clone(), notifier.clone());
        let catalog = ProductCatalog::new(products, registry.clone(), identity.clone(), notifier);

        Self {
            identity,
            categories: registry,
            products: catalog,
        }
    }

    /// Services backed by PostgreSQL
    pub fn postgres(pool: PgPool, sink: Arc<dyn DispatchSink>, config: NotifierConfig) -> Self {
        Self::new(
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgCategoryRepository::new(pool.clone())),
            Arc::new(PgProductRepository::new(pool)),
            sink,
            config,
        )
    }

    /// Services backed by one shared in-memory store
    pub fn in_memory(
        store: InMemoryStore,
        sink: Arc<dyn DispatchSink>,
        config: NotifierConfig,
    ) -> Self {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            sink,
            config,
        )
    }
}
