//! Product catalog: creation, updates, deletion and product-level fan-out

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CategoryRegistry, IdentityStore};
use crate::error::{MarketError, MarketResult};
use crate::models::{Category, DeleteAck, NewProduct, Pagination, Product, UpdateProduct, User};
use crate::notifier::Notifier;
use crate::repositories::ProductRepository;
use crate::validation::{validate_cost, validate_description, validate_name};

/// Message sent to category subscribers when a product is listed
pub fn new_product_message(category: &Category) -> String {
    format!(
        "New products in {} you might be interested in",
        category.name
    )
}

/// Message sent to product subscribers on restock
pub fn restock_message(product_name: &str) -> String {
    format!("{} is back in stock", product_name)
}

/// Product catalog
#[derive(Clone)]
pub struct ProductCatalog {
    products: Arc<dyn ProductRepository>,
    registry: CategoryRegistry,
    identity: IdentityStore,
    notifier: Notifier,
}

impl ProductCatalog {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        registry: CategoryRegistry,
        identity: IdentityStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            products,
            registry,
            identity,
            notifier,
        }
    }

    /// Resolve category terms in order, dropping repeats
    async fn resolve_categories(&self, terms: &[String]) -> MarketResult<Vec<Category>> {
        if terms.is_empty() {
            return Err(MarketError::Validation(
                "A product needs at least one category".to_string(),
            ));
        }

        let mut categories: Vec<Category> = Vec::with_capacity(terms.len());
        for term in terms {
            let category = self.registry.find_one(term).await?;
            if !categories.iter().any(|c| c.id == category.id) {
                categories.push(category);
            }
        }
        Ok(categories)
    }

    /// List a new product for `seller_id`
    ///
    /// Every category term must resolve before anything is written. Category
    /// subscribers are notified once the product is stored.
    pub async fn create(&self, draft: NewProduct, seller_id: Uuid) -> MarketResult<Product> {
        validate_name(&draft.name)?;
        validate_cost(draft.cost)?;
        validate_description(&draft.description)?;

        let categories = self.resolve_categories(&draft.categories).await?;
        let owner = self.identity.my_info(seller_id).await?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: draft.name.trim().to_string(),
            cost: draft.cost,
            description: draft.description,
            in_stock: true,
            owner_id: owner.id,
            categories,
            created_at: now,
            updated_at: now,
        };

        let product = self.products.insert(&product).await?;
        info!(product_id = %product.id, owner_id = %owner.id, "Created product {}", product.name);

        self.announce(&product).await;
        Ok(product)
    }

    /// Tell category subscribers about a new product
    ///
    /// A user subscribed to several of the product's categories is told once,
    /// under the first of those categories.
    async fn announce(&self, product: &Product) {
        let mut reached: Vec<Uuid> = Vec::new();

        for category in &product.categories {
            let subscribers = match self.registry.subscribers(category.id).await {
                Ok(subscribers) => subscribers,
                Err(e) => {
                    warn!(category_id = %category.id, "Failed to load category subscribers: {}", e);
                    continue;
                }
            };

            let audience: Vec<User> = subscribers
                .into_iter()
                .filter(|u| !reached.contains(&u.id))
                .collect();
            reached.extend(audience.iter().map(|u| u.id));

            self.notifier
                .notify(audience, new_product_message(category))
                .await;
        }
    }

    pub async fn find_all(&self, page: Pagination) -> MarketResult<Vec<Product>> {
        self.products.list(page).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> MarketResult<Product> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or_else(|| MarketError::not_found("Product", id))
    }

    pub async fn find_by_category(&self, category_id: Uuid) -> MarketResult<Vec<Product>> {
        self.products.find_by_category(category_id).await
    }

    /// Apply a partial update
    ///
    /// A patch that sets `in_stock` to true notifies the product's
    /// subscribers and the subscribers of its categories, naming the
    /// product as it was before the patch.
    pub async fn update(&self, id: Uuid, patch: UpdateProduct) -> MarketResult<Product> {
        let product = self.find_by_id(id).await?;
        self.update_existing(product, patch).await
    }

    /// `update` for a product the caller has already loaded
    pub async fn update_existing(
        &self,
        mut product: Product,
        patch: UpdateProduct,
    ) -> MarketResult<Product> {
        let previous_name = product.name.clone();

        if let Some(name) = patch.name {
            validate_name(&name)?;
            product.name = name.trim().to_string();
        }
        if let Some(cost) = patch.cost {
            validate_cost(cost)?;
            product.cost = cost;
        }
        if let Some(description) = patch.description {
            validate_description(&description)?;
            product.description = description;
        }
        if let Some(terms) = patch.categories {
            product.categories = self.resolve_categories(&terms).await?;
        }
        if let Some(in_stock) = patch.in_stock {
            product.in_stock = in_stock;
        }

        let product = self.products.update(&product).await?;

        if patch.in_stock == Some(true) {
            match self.restock_audience(&product).await {
                Ok(audience) => {
                    self.notifier
                        .notify(audience, restock_message(&previous_name))
                        .await
                }
                Err(e) => {
                    warn!(product_id = %product.id, "Failed to load restock audience: {}", e)
                }
            }
        }

        Ok(product)
    }

    /// Hard delete: both relation sets are emptied and the row goes, as one unit
    pub async fn delete(&self, id: Uuid) -> MarketResult<DeleteAck> {
        let product = self.find_by_id(id).await?;
        self.delete_existing(product).await
    }

    /// `delete` for a product the caller has already loaded
    pub async fn delete_existing(&self, product: Product) -> MarketResult<DeleteAck> {
        let affected = self.products.delete_with_relations(product.id).await?;
        if affected == 0 {
            return Err(MarketError::not_found("Product", product.id));
        }

        info!(product_id = %product.id, "Deleted product {}", product.name);
        Ok(DeleteAck { affected })
    }

    /// Subscribe a user; subscribing twice keeps a single membership
    pub async fn subscribe(&self, product_id: Uuid, user_id: Uuid) -> MarketResult<Product> {
        let product = self.find_by_id(product_id).await?;
        let user = self.identity.my_info(user_id).await?;

        if self.products.add_subscriber(product.id, user.id).await? {
            info!(product_id = %product.id, user_id = %user.id, "User subscribed to product");
        }

        Ok(product)
    }

    /// Product subscribers followed by the subscribers of its categories,
    /// each user once
    async fn restock_audience(&self, product: &Product) -> MarketResult<Vec<User>> {
        let mut audience = self.products.subscribers(product.id).await?;
        for category in &product.categories {
            for user in self.registry.subscribers(category.id).await? {
                if !audience.iter().any(|u| u.id == user.id) {
                    audience.push(user);
                }
            }
        }
        Ok(audience)
    }

    /// Fan a message out to the product's subscribers
    pub async fn notify(&self, product_id: Uuid, message: &str) -> MarketResult<()> {
        let subscribers = self.products.subscribers(product_id).await?;
        self.notifier.notify(subscribers, message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCategory, NewUser};
    use crate::notifier::{
        Channel, Delivery, DispatchSink, NotifierConfig, NotifyTarget, SinkError,
    };
    use crate::repositories::{InMemoryStore, UserRepository};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DispatchSink for RecordingSink {
        async fn send(&self, _: Channel, _: &str, message: &str) -> Result<(), SinkError> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Fixture {
        store: InMemoryStore,
        sink: Arc<RecordingSink>,
        identity: IdentityStore,
        registry: CategoryRegistry,
        catalog: ProductCatalog,
    }

    fn fixture() -> Fixture {
        fixture_with(Delivery::Inline)
    }

    fn fixture_with(delivery: Delivery) -> Fixture {
        let store = InMemoryStore::new();
        let sink = Arc::new(RecordingSink::default());
        let config = NotifierConfig {
            target: NotifyTarget::Operator {
                destination: "+15550199".into(),
            },
            delivery,
            ..NotifierConfig::default()
        };
        let notifier = Notifier::new(Arc::new(store.clone()), sink.clone(), config);
        let identity = IdentityStore::new(Arc::new(store.clone()));
        let registry =
            CategoryRegistry::new(Arc::new(store.clone()), identity.clone(), notifier.clone());
        let catalog = ProductCatalog::new(
            Arc::new(store.clone()),
            registry.clone(),
            identity.clone(),
            notifier,
        );

        Fixture {
            store,
            sink,
            identity,
            registry,
            catalog,
        }
    }

    async fn register(identity: &IdentityStore, email: &str) -> User {
        identity
            .register(NewUser {
                email: email.into(),
                password: "Secret123".into(),
                name: "Someone".into(),
            })
            .await
            .unwrap()
    }

    async fn category(registry: &CategoryRegistry, name: &str) -> Category {
        registry
            .create(NewCategory {
                name: name.into(),
                description: String::new(),
                slug: None,
            })
            .await
            .unwrap()
    }

    fn draft(name: &str, categories: &[&str]) -> NewProduct {
        NewProduct {
            name: name.into(),
            cost: 10.0,
            description: String::new(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn create_fails_before_writing_when_a_category_is_unknown() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        category(&f.registry, "Tools").await;

        let result = f
            .catalog
            .create(draft("Hammer", &["Tools", "Gardening"]), seller.id)
            .await;

        assert!(matches!(result, Err(MarketError::NotFound(_))));
        assert!(f.catalog.find_all(Pagination::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_notifies_category_subscribers_after_storing() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        let tools = category(&f.registry, "Tools").await;
        f.registry.subscribe(tools.id, buyer.id).await.unwrap();

        let product = f
            .catalog
            .create(draft("Hammer", &["tools", "Tools"]), seller.id)
            .await
            .unwrap();

        assert!(product.in_stock);
        assert_eq!(product.category_ids(), vec![tools.id]);
        assert_eq!(f.sink.messages(), vec![new_product_message(&tools)]);
    }

    #[tokio::test]
    async fn a_subscriber_of_several_categories_hears_of_a_new_product_once() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        let tools = category(&f.registry, "Tools").await;
        let garden = category(&f.registry, "Garden").await;
        f.registry.subscribe(tools.id, buyer.id).await.unwrap();
        f.registry.subscribe(garden.id, buyer.id).await.unwrap();

        f.catalog
            .create(draft("Hammer", &["Tools", "Garden"]), seller.id)
            .await
            .unwrap();

        assert_eq!(f.sink.messages(), vec![new_product_message(&tools)]);
    }

    #[tokio::test]
    async fn background_announcements_respect_the_window() {
        let f = fixture_with(Delivery::Background);
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        let other = register(&f.identity, "other@example.com").await;
        let tools = category(&f.registry, "Tools").await;
        let garden = category(&f.registry, "Garden").await;
        f.registry.subscribe(tools.id, buyer.id).await.unwrap();
        f.registry.subscribe(garden.id, buyer.id).await.unwrap();
        f.registry.subscribe(garden.id, other.id).await.unwrap();

        f.catalog
            .create(draft("Hammer", &["Tools", "Garden"]), seller.id)
            .await
            .unwrap();
        f.catalog
            .create(draft("Rake", &["Garden"]), seller.id)
            .await
            .unwrap();

        for _ in 0..50 {
            if f.sink.messages().len() >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Two subscribers, one message each for the whole window
        assert_eq!(f.sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn notify_reaches_product_subscribers() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        category(&f.registry, "Tools").await;
        let product = f
            .catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();
        f.catalog.subscribe(product.id, buyer.id).await.unwrap();

        f.catalog.notify(product.id, "Price drop").await.unwrap();

        assert_eq!(f.sink.messages(), vec!["Price drop".to_string()]);
        let after = f.identity.my_info(buyer.id).await.unwrap();
        assert!(after.last_notified > buyer.last_notified);
    }

    #[tokio::test]
    async fn restock_notifies_only_stale_subscribers_with_the_old_name() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let stale = register(&f.identity, "stale@example.com").await;
        let fresh = register(&f.identity, "fresh@example.com").await;
        category(&f.registry, "Tools").await;
        let product = f
            .catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();
        f.catalog.subscribe(product.id, stale.id).await.unwrap();
        f.catalog.subscribe(product.id, fresh.id).await.unwrap();
        f.store
            .touch_notified(fresh.id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let updated = f
            .catalog
            .update(
                product.id,
                UpdateProduct {
                    name: Some("Claw Hammer".into()),
                    in_stock: Some(true),
                    ..UpdateProduct::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Claw Hammer");
        assert_eq!(f.sink.messages(), vec![restock_message("Hammer")]);

        let stale_after = UserRepository::find_by_id(&f.store, stale.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stale_after.last_notified > stale.last_notified);
    }

    #[tokio::test]
    async fn out_of_stock_updates_do_not_notify() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        category(&f.registry, "Tools").await;
        let product = f
            .catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();
        f.catalog.subscribe(product.id, buyer.id).await.unwrap();

        let updated = f
            .catalog
            .update(
                product.id,
                UpdateProduct {
                    in_stock: Some(false),
                    ..UpdateProduct::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.in_stock);
        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn delete_clears_every_join_row() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let buyer = register(&f.identity, "buyer@example.com").await;
        let tools = category(&f.registry, "Tools").await;
        let product = f
            .catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();
        f.catalog.subscribe(product.id, buyer.id).await.unwrap();

        let ack = f.catalog.delete(product.id).await.unwrap();

        assert_eq!(ack, DeleteAck { affected: 1 });
        assert_eq!(f.store.join_rows_referencing(product.id).await, 0);
        assert!(f.catalog.find_by_category(tools.id).await.unwrap().is_empty());
        assert!(matches!(
            f.catalog.delete(product.id).await,
            Err(MarketError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn categories_with_products_cannot_be_removed() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        let tools = category(&f.registry, "Tools").await;
        f.catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();

        let buyer = register(&f.identity, "buyer@example.com").await;
        f.registry.subscribe(tools.id, buyer.id).await.unwrap();

        assert!(matches!(
            f.registry.remove(tools.id).await,
            Err(MarketError::Conflict(_))
        ));
        assert_eq!(f.registry.subscribers(tools.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_validates_cost_and_replaces_categories() {
        let f = fixture();
        let seller = register(&f.identity, "seller@example.com").await;
        category(&f.registry, "Tools").await;
        let garden = category(&f.registry, "Garden").await;
        let product = f
            .catalog
            .create(draft("Hammer", &["Tools"]), seller.id)
            .await
            .unwrap();

        let negative = f
            .catalog
            .update(
                product.id,
                UpdateProduct {
                    cost: Some(-1.0),
                    ..UpdateProduct::default()
                },
            )
            .await;
        assert!(matches!(negative, Err(MarketError::Validation(_))));

        let moved = f
            .catalog
            .update(
                product.id,
                UpdateProduct {
                    categories: Some(vec!["garden".into()]),
                    ..UpdateProduct::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.category_ids(), vec![garden.id]);
    }
}
