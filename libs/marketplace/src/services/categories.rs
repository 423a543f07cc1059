//! Category registry: lookup, subscription and category-level fan-out

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::IdentityStore;
use crate::error::{MarketError, MarketResult};
use crate::models::{Category, NewCategory, Pagination, UpdateCategory, User};
use crate::notifier::Notifier;
use crate::repositories::CategoryRepository;
use crate::slug::normalize;
use crate::validation::{validate_category_name, validate_description};

/// An explicit slug is stored as given; it only has to contain something
fn validate_slug(slug: &str) -> MarketResult<()> {
    if slug.trim().is_empty() {
        return Err(MarketError::Validation("Slug must not be blank".to_string()));
    }
    Ok(())
}

/// Category registry
#[derive(Clone)]
pub struct CategoryRegistry {
    categories: Arc<dyn CategoryRepository>,
    identity: IdentityStore,
    notifier: Notifier,
}

impl CategoryRegistry {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        identity: IdentityStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            categories,
            identity,
            notifier,
        }
    }

    /// Create a category; the slug defaults to the normalized name and an
    /// explicit one is kept verbatim
    pub async fn create(&self, new_category: NewCategory) -> MarketResult<Category> {
        let name = new_category.name.trim().to_string();
        validate_category_name(&name)?;
        validate_description(&new_category.description)?;

        let slug = new_category.slug.unwrap_or_else(|| normalize(&name));
        validate_slug(&slug)?;

        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name,
            description: new_category.description,
            slug,
            created_at: now,
            updated_at: now,
        };

        let category = self.categories.insert(&category).await?;
        info!(category_id = %category.id, "Created category {}", category.name);
        Ok(category)
    }

    pub async fn find_all(&self, page: Pagination) -> MarketResult<Vec<Category>> {
        self.categories.list(page).await
    }

    /// Resolve a category by id, by name ignoring case, or by slug
    pub async fn find_one(&self, term: &str) -> MarketResult<Category> {
        let term = term.trim();
        let found = match Uuid::parse_str(term) {
            Ok(id) => self.categories.find_by_id(id).await?,
            Err(_) => self.categories.find_by_name_or_slug(term).await?,
        };

        found.ok_or_else(|| MarketError::not_found("Category", term))
    }

    pub async fn find_by_id(&self, id: Uuid) -> MarketResult<Category> {
        self.categories
            .find_by_id(id)
            .await?
            .ok_or_else(|| MarketError::not_found("Category", id))
    }

    pub async fn update(&self, id: Uuid, patch: UpdateCategory) -> MarketResult<Category> {
        let mut category = self.find_by_id(id).await?;

        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            validate_category_name(&name)?;
            category.name = name;
        }
        if let Some(description) = patch.description {
            validate_description(&description)?;
            category.description = description;
        }
        if let Some(slug) = patch.slug {
            validate_slug(&slug)?;
            category.slug = slug;
        }

        self.categories.update(&category).await
    }

    /// Delete a category that no product references
    ///
    /// The subscriber edges and the row go together; a category still
    /// tagged on a product is a `Conflict` and stays untouched.
    pub async fn remove(&self, id: Uuid) -> MarketResult<Category> {
        let category = self.find_by_id(id).await?;

        if self.categories.delete_with_subscribers(id).await? == 0 {
            return Err(MarketError::not_found("Category", id));
        }

        info!(category_id = %id, "Removed category {}", category.name);
        Ok(category)
    }

    /// Subscribe a user; subscribing twice keeps a single membership
    pub async fn subscribe(&self, category_id: Uuid, user_id: Uuid) -> MarketResult<Category> {
        let category = self.find_by_id(category_id).await?;
        let user = self.identity.my_info(user_id).await?;

        if self.categories.add_subscriber(category.id, user.id).await? {
            info!(category_id = %category.id, user_id = %user.id, "User subscribed to category");
        }

        Ok(category)
    }

    /// Subscribers in subscription order
    pub async fn subscribers(&self, category_id: Uuid) -> MarketResult<Vec<User>> {
        self.categories.subscribers(category_id).await
    }

    /// Fan a message out to the category's subscribers
    pub async fn notify(&self, category_id: Uuid, message: &str) -> MarketResult<()> {
        let subscribers = self.subscribers(category_id).await?;
        self.notifier.notify(subscribers, message).await;
        Ok(())
    }
}
