//! Identity store: registration, credentials, roles and notification bookkeeping

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credentials::{hash_password, verify_password};
use crate::error::{MarketError, MarketResult};
use crate::models::{
    LoginCredentials, NewUser, Pagination, Role, SellerProfile, UpdateUser, User, never_notified,
};
use crate::repositories::UserRepository;
use crate::validation::{validate_email, validate_name, validate_password, validate_phone};

fn invalid_credentials() -> MarketError {
    MarketError::Unauthorized("Invalid credentials".to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User directory and credential store
#[derive(Clone)]
pub struct IdentityStore {
    users: Arc<dyn UserRepository>,
}

impl IdentityStore {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Register a new user
    ///
    /// The first user ever registered is also an admin.
    pub async fn register(&self, new_user: NewUser) -> MarketResult<User> {
        let email = normalize_email(&new_user.email);
        validate_email(&email)?;
        validate_password(&new_user.password)?;
        validate_name(&new_user.name)?;

        let roles = if self.users.count().await? == 0 {
            vec![Role::User, Role::Admin]
        } else {
            vec![Role::User]
        };

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(&new_user.password)?,
            name: new_user.name.trim().to_string(),
            phone: None,
            location: None,
            roles,
            is_active: true,
            last_notified: never_notified(),
            created_at: now,
            updated_at: now,
        };

        let user = self.users.insert(&user).await?;
        info!(user_id = %user.id, "Registered user {}", user.email);
        Ok(user)
    }

    /// Check credentials; unknown email, wrong password and inactive
    /// account are all `Unauthorized`
    pub async fn login(&self, credentials: LoginCredentials) -> MarketResult<User> {
        let email = normalize_email(&credentials.email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !verify_password(&credentials.password, &user.password_hash)? {
            warn!(user_id = %user.id, "Rejected login with a wrong password");
            return Err(invalid_credentials());
        }

        if !user.is_active {
            return Err(MarketError::Unauthorized("User is inactive".to_string()));
        }

        Ok(user)
    }

    /// Resolve a token subject: unknown or inactive users are `Unauthorized`
    pub async fn authenticate(&self, id: Uuid) -> MarketResult<User> {
        match self.users.find_by_id(id).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(MarketError::Unauthorized("User is inactive".to_string())),
            None => Err(MarketError::Unauthorized("Unknown user".to_string())),
        }
    }

    /// Add the seller role and contact details, keeping every existing role
    pub async fn become_seller(&self, id: Uuid, profile: SellerProfile) -> MarketResult<User> {
        validate_phone(&profile.phone)?;

        let mut user = self.my_info(id).await?;
        user.phone = Some(profile.phone);
        user.location = Some(profile.location);
        if !user.has_role(Role::User) {
            user.roles.insert(0, Role::User);
        }
        if !user.has_role(Role::Seller) {
            user.roles.push(Role::Seller);
        }

        let user = self.users.update(&user).await?;
        info!(user_id = %user.id, "User became a seller");
        Ok(user)
    }

    pub async fn my_info(&self, id: Uuid) -> MarketResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| MarketError::not_found("User", id))
    }

    /// Partial update; a new password is validated and re-hashed
    pub async fn update(&self, id: Uuid, patch: UpdateUser) -> MarketResult<User> {
        let mut user = self.my_info(id).await?;

        if let Some(password) = patch.password {
            validate_password(&password)?;
            user.password_hash = hash_password(&password)?;
        }
        if let Some(name) = patch.name {
            validate_name(&name)?;
            user.name = name.trim().to_string();
        }
        if let Some(phone) = patch.phone {
            validate_phone(&phone)?;
            user.phone = Some(phone);
        }
        if let Some(location) = patch.location {
            user.location = Some(location);
        }

        self.users.update(&user).await
    }

    pub async fn find_all(&self, page: Pagination) -> MarketResult<Vec<User>> {
        self.users.list(page).await
    }

    /// Users whose name equals `name` exactly
    pub async fn find_by_name(&self, name: &str, page: Pagination) -> MarketResult<Vec<User>> {
        self.users.find_by_name(name, page).await
    }

    pub async fn find_by_email(&self, email: &str) -> MarketResult<User> {
        let email = normalize_email(email);
        self.users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| MarketError::not_found("User", email))
    }

    /// Soft delete: the account stays, its email stays reserved
    pub async fn deactivate(&self, id: Uuid) -> MarketResult<User> {
        let mut user = self.my_info(id).await?;
        if !user.is_active {
            return Ok(user);
        }

        user.is_active = false;
        let user = self.users.update(&user).await?;
        info!(user_id = %user.id, "Deactivated user");
        Ok(user)
    }

    /// Record a notification sent at `at`; `last_notified` never moves back
    pub async fn touch_notified(&self, id: Uuid, at: DateTime<Utc>) -> MarketResult<()> {
        self.users.touch_notified(id, at).await
    }
}
