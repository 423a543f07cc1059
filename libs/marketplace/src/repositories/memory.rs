//! In-memory implementation of every repository (for development/testing)
//!
//! One `InMemoryStore` backs the three repository traits so that join rows
//! stay consistent across aggregates. Uniqueness and foreign key rules mirror
//! the PostgreSQL schema: a write that PostgreSQL would reject is rejected
//! here with the same `MarketError` kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CategoryRepository, ProductRepository, UserRepository};
use crate::error::{MarketError, MarketResult};
use crate::models::{Category, Pagination, Product, User};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    categories: Vec<Category>,
    /// Stored with an empty `categories` list; edges live in `product_categories`
    products: Vec<Product>,
    product_categories: Vec<(Uuid, Uuid)>,
    category_subscribers: Vec<(Uuid, Uuid)>,
    product_subscribers: Vec<(Uuid, Uuid)>,
}

impl MemoryState {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn load_product(&self, stored: &Product) -> Product {
        let categories = self
            .product_categories
            .iter()
            .filter(|(product_id, _)| *product_id == stored.id)
            .filter_map(|(_, category_id)| self.category(*category_id).cloned())
            .collect();

        Product {
            categories,
            ..stored.clone()
        }
    }

    fn users_for(&self, edges: &[(Uuid, Uuid)], owner: Uuid) -> Vec<User> {
        edges
            .iter()
            .filter(|(target, _)| *target == owner)
            .filter_map(|(_, user_id)| self.user(*user_id).cloned())
            .collect()
    }

    fn check_category_unique(&self, category: &Category) -> MarketResult<()> {
        let clash = self.categories.iter().any(|c| {
            c.id != category.id
                && (c.name.to_uppercase() == category.name.to_uppercase()
                    || c.slug == category.slug)
        });

        if clash {
            return Err(MarketError::Conflict(format!(
                "Category '{}' already exists",
                category.name
            )));
        }
        Ok(())
    }

    fn check_product_references(&self, product: &Product) -> MarketResult<()> {
        if self.user(product.owner_id).is_none() {
            return Err(missing_reference("products_owner_id_fkey"));
        }
        if product
            .categories
            .iter()
            .any(|c| self.category(c.id).is_none())
        {
            return Err(missing_reference("product_categories_category_id_fkey"));
        }
        Ok(())
    }
}

fn missing_reference(constraint: &str) -> MarketError {
    MarketError::Conflict(format!(
        "Resource is still referenced or references a missing row ({})",
        constraint
    ))
}

/// Shared in-memory store implementing all repository traits
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of join rows (any relation) that reference `id`
    pub async fn join_rows_referencing(&self, id: Uuid) -> usize {
        let state = self.state.read().await;
        [
            &state.product_categories,
            &state.category_subscribers,
            &state.product_subscribers,
        ]
        .iter()
        .flat_map(|edges| edges.iter())
        .filter(|(left, right)| *left == id || *right == id)
        .count()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn count(&self) -> MarketResult<i64> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn insert(&self, user: &User) -> MarketResult<User> {
        let mut state = self.state.write().await;

        if state.users.iter().any(|u| u.email == user.email) {
            return Err(MarketError::Conflict(format!(
                "User with email '{}' already exists",
                user.email
            )));
        }

        state.users.push(user.clone());
        tracing::debug!(user_id = %user.id, "Stored user in memory");
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<User>> {
        Ok(self.state.read().await.user(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> MarketResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_name(&self, name: &str, page: Pagination) -> MarketResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(page.apply(state.users.iter().filter(|u| u.name == name).cloned()))
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(page.apply(state.users.iter().cloned()))
    }

    async fn update(&self, user: &User) -> MarketResult<User> {
        let mut state = self.state.write().await;

        if state
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(MarketError::Conflict(format!(
                "User with email '{}' already exists",
                user.email
            )));
        }

        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| MarketError::not_found("User", user.id))?;

        let last_notified = stored.last_notified;
        *stored = User {
            last_notified,
            updated_at: Utc::now(),
            ..user.clone()
        };

        Ok(stored.clone())
    }

    async fn touch_notified(&self, id: Uuid, at: DateTime<Utc>) -> MarketResult<()> {
        let mut state = self.state.write().await;

        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| MarketError::not_found("User", id))?;

        stored.last_notified = stored.last_notified.max(at);
        Ok(())
    }

    async fn claim_notification(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> MarketResult<Option<DateTime<Utc>>> {
        let mut state = self.state.write().await;

        match state.users.iter_mut().find(|u| u.id == id) {
            Some(stored) if stored.last_notified <= not_after => {
                let previous = stored.last_notified;
                stored.last_notified = at;
                Ok(Some(previous))
            }
            _ => Ok(None),
        }
    }

    async fn release_notification(
        &self,
        id: Uuid,
        claimed: DateTime<Utc>,
        previous: DateTime<Utc>,
    ) -> MarketResult<()> {
        let mut state = self.state.write().await;

        if let Some(stored) = state
            .users
            .iter_mut()
            .find(|u| u.id == id && u.last_notified == claimed)
        {
            stored.last_notified = previous;
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn insert(&self, category: &Category) -> MarketResult<Category> {
        let mut state = self.state.write().await;
        state.check_category_unique(category)?;
        state.categories.push(category.clone());
        Ok(category.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Category>> {
        Ok(self.state.read().await.category(id).cloned())
    }

    async fn find_by_name_or_slug(&self, term: &str) -> MarketResult<Option<Category>> {
        let state = self.state.read().await;
        let upper = term.to_uppercase();

        Ok(state
            .categories
            .iter()
            .find(|c| c.name.to_uppercase() == upper || c.slug == term)
            .cloned())
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Category>> {
        let state = self.state.read().await;
        Ok(page.apply(state.categories.iter().cloned()))
    }

    async fn update(&self, category: &Category) -> MarketResult<Category> {
        let mut state = self.state.write().await;
        state.check_category_unique(category)?;

        let stored = state
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| MarketError::not_found("Category", category.id))?;

        *stored = Category {
            updated_at: Utc::now(),
            ..category.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_with_subscribers(&self, id: Uuid) -> MarketResult<u64> {
        let mut state = self.state.write().await;

        let products = state
            .product_categories
            .iter()
            .filter(|(_, c)| *c == id)
            .count();
        if products > 0 {
            return Err(MarketError::Conflict(format!(
                "Category {} still has {} product(s)",
                id, products
            )));
        }

        state.category_subscribers.retain(|(c, _)| *c != id);
        let before = state.categories.len();
        state.categories.retain(|c| c.id != id);
        Ok((before - state.categories.len()) as u64)
    }

    async fn add_subscriber(&self, category_id: Uuid, user_id: Uuid) -> MarketResult<bool> {
        let mut state = self.state.write().await;

        if state.category(category_id).is_none() || state.user(user_id).is_none() {
            return Err(missing_reference("category_subscribers_fkey"));
        }

        let edge = (category_id, user_id);
        if state.category_subscribers.contains(&edge) {
            return Ok(false);
        }
        state.category_subscribers.push(edge);
        Ok(true)
    }

    async fn subscribers(&self, category_id: Uuid) -> MarketResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(state.users_for(&state.category_subscribers, category_id))
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn insert(&self, product: &Product) -> MarketResult<Product> {
        let mut state = self.state.write().await;
        state.check_product_references(product)?;

        if state.products.iter().any(|p| p.id == product.id) {
            return Err(MarketError::Conflict(format!(
                "Product {} already exists",
                product.id
            )));
        }

        for category in &product.categories {
            state.product_categories.push((product.id, category.id));
        }
        state.products.push(Product {
            categories: Vec::new(),
            ..product.clone()
        });

        let stored = state
            .products
            .last()
            .map(|p| state.load_product(p))
            .ok_or_else(|| MarketError::Internal("product vanished after insert".into()))?;
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .iter()
            .find(|p| p.id == id)
            .map(|p| state.load_product(p)))
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Product>> {
        let state = self.state.read().await;
        Ok(page.apply(state.products.iter().map(|p| state.load_product(p))))
    }

    async fn find_by_category(&self, category_id: Uuid) -> MarketResult<Vec<Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .iter()
            .filter(|p| state.product_categories.contains(&(p.id, category_id)))
            .map(|p| state.load_product(p))
            .collect())
    }

    async fn update(&self, product: &Product) -> MarketResult<Product> {
        let mut state = self.state.write().await;
        state.check_product_references(product)?;

        let index = state
            .products
            .iter()
            .position(|p| p.id == product.id)
            .ok_or_else(|| MarketError::not_found("Product", product.id))?;

        state.product_categories.retain(|(p, _)| *p != product.id);
        for category in &product.categories {
            state.product_categories.push((product.id, category.id));
        }
        state.products[index] = Product {
            categories: Vec::new(),
            updated_at: Utc::now(),
            ..product.clone()
        };

        Ok(state.load_product(&state.products[index]))
    }

    async fn delete_with_relations(&self, id: Uuid) -> MarketResult<u64> {
        let mut state = self.state.write().await;

        state.product_categories.retain(|(p, _)| *p != id);
        state.product_subscribers.retain(|(p, _)| *p != id);

        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        Ok((before - state.products.len()) as u64)
    }

    async fn add_subscriber(&self, product_id: Uuid, user_id: Uuid) -> MarketResult<bool> {
        let mut state = self.state.write().await;

        let product_exists = state.products.iter().any(|p| p.id == product_id);
        if !product_exists || state.user(user_id).is_none() {
            return Err(missing_reference("product_subscribers_fkey"));
        }

        let edge = (product_id, user_id);
        if state.product_subscribers.contains(&edge) {
            return Ok(false);
        }
        state.product_subscribers.push(edge);
        Ok(true)
    }

    async fn subscribers(&self, product_id: Uuid) -> MarketResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(state.users_for(&state.product_subscribers, product_id))
    }
}
