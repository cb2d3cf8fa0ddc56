use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Catalog Store - Product records and their stock counters
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    /// Units available for sale; never negative
    pub stock: i64,
    pub is_active: bool,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Decimal, stock: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            stock,
            is_active: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Read and adjust product stock.
///
/// `adjust_stock` applies `delta` relative to the current stock as one
/// atomic step and fails, without writing, when the result would be
/// negative. Negative deltas reserve, positive deltas restore.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StockError>;

    /// Returns the stock level after the adjustment
    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<i64, StockError>;
}
