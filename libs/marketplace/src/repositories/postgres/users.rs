//! User repository for PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::models::{Pagination, Role, User};
use crate::repositories::UserRepository;

pub(crate) const USER_COLUMNS: &str = "id, email, password_hash, name, phone, location, roles, \
     is_active, last_notified, created_at, updated_at";

/// Raw `users` row; roles are stored as a text array
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    phone: Option<String>,
    location: Option<String>,
    roles: Vec<String>,
    is_active: bool,
    last_notified: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = MarketError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let roles = row
            .roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(MarketError::Internal)?;

        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            phone: row.phone,
            location: row.location,
            roles,
            is_active: row.is_active,
            last_notified: row.last_notified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `USER_COLUMNS` qualified with a table alias, for joins
pub(crate) fn user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn into_users(rows: Vec<UserRow>) -> MarketResult<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

fn role_names(user: &User) -> Vec<String> {
    user.roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// User repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn count(&self) -> MarketResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert(&self, user: &User) -> MarketResult<User> {
        info!("Creating new user: {}", user.email);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, phone, location, roles, is_active, last_notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.location)
        .bind(role_names(user))
        .bind(user.is_active)
        .bind(user.last_notified)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> MarketResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_name(&self, name: &str, page: Pagination) -> MarketResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE name = $1
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(name)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }

    async fn update(&self, user: &User) -> MarketResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, name = $4, phone = $5, location = $6,
                roles = $7, is_active = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.location)
        .bind(role_names(user))
        .bind(user.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MarketError::not_found("User", user.id))?;

        row.try_into()
    }

    async fn touch_notified(&self, id: Uuid, at: DateTime<Utc>) -> MarketResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_notified = GREATEST(last_notified, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::not_found("User", id));
        }
        Ok(())
    }

    async fn claim_notification(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> MarketResult<Option<DateTime<Utc>>> {
        // The row lock serializes concurrent claims; a waiting claim re-reads
        // the committed value and finds the window taken.
        let previous = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            WITH locked AS (
                SELECT id, last_notified FROM users WHERE id = $1 FOR UPDATE
            )
            UPDATE users u
            SET last_notified = $2
            FROM locked
            WHERE u.id = locked.id AND locked.last_notified <= $3
            RETURNING locked.last_notified
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(not_after)
        .fetch_optional(&self.pool)
        .await?;

        Ok(previous)
    }

    async fn release_notification(
        &self,
        id: Uuid,
        claimed: DateTime<Utc>,
        previous: DateTime<Utc>,
    ) -> MarketResult<()> {
        sqlx::query("UPDATE users SET last_notified = $3 WHERE id = $1 AND last_notified = $2")
            .bind(id)
            .bind(claimed)
            .bind(previous)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
