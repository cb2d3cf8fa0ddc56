use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use super::product::{CatalogStore, Product, StockError};

const PRODUCTS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    price NUMERIC(12, 2) NOT NULL CHECK (price >= 0),
    stock BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
    is_active BOOLEAN NOT NULL DEFAULT TRUE
)";

/// Catalog backed by a Postgres `products` table.
///
/// Stock moves with a single conditional `UPDATE`, so the non-negative
/// check and the write happen in one statement no matter how many orders
/// contend for the same row.
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        tracing::info!("Connected to catalog database");
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(PRODUCTS_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert(&self, product: &Product) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, price, stock, is_active) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StockError> {
        let row = sqlx::query("SELECT id, name, price, stock, is_active FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let product = Product {
            id: row.try_get::<Uuid, _>("id").map_err(anyhow::Error::from)?,
            name: row.try_get::<String, _>("name").map_err(anyhow::Error::from)?,
            price: row.try_get::<Decimal, _>("price").map_err(anyhow::Error::from)?,
            stock: row.try_get::<i64, _>("stock").map_err(anyhow::Error::from)?,
            is_active: row.try_get::<bool, _>("is_active").map_err(anyhow::Error::from)?,
        };

        Ok(Some(product))
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<i64, StockError> {
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE products SET stock = stock + $2 WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        if let Some(stock) = updated {
            tracing::debug!(product_id = %id, delta = delta, stock = stock, "Adjusted product stock");
            return Ok(stock);
        }

        // No row matched: either the product is gone or the guard refused
        let available = sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        match available {
            None => Err(StockError::ProductNotFound(id)),
            Some(available) => Err(StockError::InsufficientStock {
                product_id: id,
                requested: -delta,
                available,
            }),
        }
    }
}
