use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::product::{CatalogStore, Product, StockError};

/// Catalog held in process memory. One lock guards every product, so each
/// adjustment is a check-and-write with no interleaving.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) -> Uuid {
        let id = product.id;
        self.products.lock().await.insert(id, product);
        id
    }

    pub async fn stock_of(&self, id: Uuid) -> Option<i64> {
        self.products.lock().await.get(&id).map(|p| p.stock)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StockError> {
        Ok(self.products.lock().await.get(&id).cloned())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<i64, StockError> {
        let mut products = self.products.lock().await;
        let product = products.get_mut(&id).ok_or(StockError::ProductNotFound(id))?;

        let new_stock = product
            .stock
            .checked_add(delta)
            .filter(|stock| *stock >= 0)
            .ok_or(StockError::InsufficientStock {
                product_id: id,
                requested: -delta,
                available: product.stock,
            })?;

        product.stock = new_stock;

        tracing::debug!(
            product_id = %id,
            delta = delta,
            stock = new_stock,
            "Adjusted product stock"
        );

        Ok(new_stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_adjust_reserves_and_restores() {
        let catalog = InMemoryCatalog::new();
        let id = catalog.insert(Product::new("Mechanical Keyboard", Decimal::new(8999, 0), 5)).await;

        assert_eq!(catalog.adjust_stock(id, -2).await.unwrap(), 3);
        assert_eq!(catalog.adjust_stock(id, 2).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_adjust_refuses_to_go_negative() {
        let catalog = InMemoryCatalog::new();
        let id = catalog.insert(Product::new("Mechanical Keyboard", Decimal::new(8999, 0), 5)).await;

        let result = catalog.adjust_stock(id, -10).await;
        assert!(matches!(
            result,
            Err(StockError::InsufficientStock { requested: 10, available: 5, .. })
        ));
        assert_eq!(catalog.stock_of(id).await, Some(5));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let catalog = InMemoryCatalog::new();
        let missing = Uuid::new_v4();

        assert!(catalog.find_product(missing).await.unwrap().is_none());
        assert!(matches!(
            catalog.adjust_stock(missing, 1).await,
            Err(StockError::ProductNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let id = catalog.insert(Product::new("Smart Watch", Decimal::new(19999, 0), 3)).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move { catalog.adjust_stock(id, -1).await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(catalog.stock_of(id).await, Some(0));
    }
}
