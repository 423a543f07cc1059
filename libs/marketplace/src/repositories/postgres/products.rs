//! Product repository for PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::users::{UserRow, into_users, user_columns};
use crate::error::{MarketError, MarketResult};
use crate::models::{Category, Pagination, Product, User};
use crate::repositories::ProductRepository;

const PRODUCT_COLUMNS: &str =
    "p.id, p.name, p.cost, p.description, p.in_stock, p.owner_id, p.created_at, p.updated_at";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    cost: f64,
    description: String,
    in_stock: bool,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ProductCategoryRow {
    product_id: Uuid,
    #[sqlx(flatten)]
    category: Category,
}

/// Product repository
#[derive(Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the category relation for every row in one query
    async fn with_categories(&self, rows: Vec<ProductRow>) -> MarketResult<Vec<Product>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let edges = sqlx::query_as::<_, ProductCategoryRow>(
            r#"
            SELECT pc.product_id, c.id, c.name, c.description, c.slug, c.created_at, c.updated_at
            FROM product_categories pc
            JOIN categories c ON c.id = pc.category_id
            WHERE pc.product_id = ANY($1)
            ORDER BY pc.position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<Uuid, Vec<Category>> = HashMap::new();
        for edge in edges {
            by_product
                .entry(edge.product_id)
                .or_default()
                .push(edge.category);
        }

        Ok(rows
            .into_iter()
            .map(|row| Product {
                categories: by_product.remove(&row.id).unwrap_or_default(),
                id: row.id,
                name: row.name,
                cost: row.cost,
                description: row.description,
                in_stock: row.in_stock,
                owner_id: row.owner_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn load(&self, id: Uuid) -> MarketResult<Product> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| MarketError::not_found("Product", id))
    }
}

async fn insert_category_edges(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
) -> MarketResult<()> {
    for (position, category) in product.categories.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO product_categories (product_id, category_id, position)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, category_id) DO NOTHING
            "#,
        )
        .bind(product.id)
        .bind(category.id)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn insert(&self, product: &Product) -> MarketResult<Product> {
        info!("Creating product: {}", product.name);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, cost, description, in_stock, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.cost)
        .bind(&product.description)
        .bind(product.in_stock)
        .bind(product.owner_id)
        .execute(&mut *tx)
        .await?;

        insert_category_edges(&mut tx, product).await?;
        tx.commit().await?;

        self.load(product.id).await
    }

    async fn find_by_id(&self, id: Uuid) -> MarketResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_categories(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, page: Pagination) -> MarketResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products p
            ORDER BY p.created_at, p.id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        self.with_categories(rows).await
    }

    async fn find_by_category(&self, category_id: Uuid) -> MarketResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products p
            JOIN product_categories pc ON pc.product_id = p.id
            WHERE pc.category_id = $1
            ORDER BY p.created_at, p.id
            "#
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_categories(rows).await
    }

    async fn update(&self, product: &Product) -> MarketResult<Product> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, cost = $3, description = $4, in_stock = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.cost)
        .bind(&product.description)
        .bind(product.in_stock)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::not_found("Product", product.id));
        }

        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(product.id)
            .execute(&mut *tx)
            .await?;
        insert_category_edges(&mut tx, product).await?;

        tx.commit().await?;

        self.load(product.id).await
    }

    async fn delete_with_relations(&self, id: Uuid) -> MarketResult<u64> {
        let mut tx = self.pool.begin().await?;

        // Lock the row first so no subscriber edge can be added meanwhile
        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_subscribers WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn add_subscriber(&self, product_id: Uuid, user_id: Uuid) -> MarketResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO product_subscribers (product_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (product_id, user_id) DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn subscribers(&self, product_id: Uuid) -> MarketResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {}
            FROM users u
            JOIN product_subscribers s ON s.user_id = u.id
            WHERE s.product_id = $1
            ORDER BY s.subscribed_seq
            "#,
            user_columns("u")
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }
}
