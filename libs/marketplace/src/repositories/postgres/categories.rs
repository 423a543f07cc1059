//! Category repository for PostgreSQL

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::users::{UserRow, into_users, user_columns};
use crate::error::{MarketError, MarketResult};
use crate::models::{Category, Pagination, User};
use crate::repositories::CategoryRepository;

const CATEGORY_COLUMNS: &str = "id, name, description, slug, created_at, updated_at";

/// Category repository
#[derive(Clone)]
pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn insert(&self, category: &Category) -> MarketResult<Category> {
        info!("Creating category: {}", category.name);

        let category = sqlx::query_as::<_, Category>(&format!(
            r#"
            INSERT INTO categories (id, name, description, slug)
            VALUES ($1, $2, $3, $4)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(category)
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn find_by_name_or_slug(&self, term: &str) -> MarketResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!(
            r#"
            SELECT {CATEGORY_COLUMNS}
            FROM categories
            WHERE UPPER(name) = UPPER($1) OR slug = $1
            ORDER BY created_at
            LIMIT 1
            "#
        ))
        .bind(term)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            r#"
            SELECT {CATEGORY_COLUMNS}
            FROM categories
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn update(&self, category: &Category) -> MarketResult<Category> {
        sqlx::query_as::<_, Category>(&format!(
            r#"
            UPDATE categories
            SET name = $2, description = $3, slug = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MarketError::not_found("Category", category.id))
    }

    async fn delete_with_subscribers(&self, id: Uuid) -> MarketResult<u64> {
        let mut tx = self.pool.begin().await?;

        // Locking the row blocks new product edges until the transaction ends
        let locked =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM categories WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(0);
        }

        let products: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM product_categories WHERE category_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if products > 0 {
            return Err(MarketError::Conflict(format!(
                "Category {} still has {} product(s)",
                id, products
            )));
        }

        sqlx::query("DELETE FROM category_subscribers WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(category_id = %id, "Deleted category with its subscribers");
        Ok(result.rows_affected())
    }

    async fn add_subscriber(&self, category_id: Uuid, user_id: Uuid) -> MarketResult<bool> {
        // The primary key makes concurrent subscribes collapse into one row
        let result = sqlx::query(
            r#"
            INSERT INTO category_subscribers (category_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (category_id, user_id) DO NOTHING
            "#,
        )
        .bind(category_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn subscribers(&self, category_id: Uuid) -> MarketResult<Vec<User>> {
        let columns = user_columns("u");

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {columns}
            FROM users u
            JOIN category_subscribers s ON s.user_id = u.id
            WHERE s.category_id = $1
            ORDER BY s.subscribed_seq
            "#
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }
}
