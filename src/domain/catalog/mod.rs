// ============================================================================
// Catalog Domain - Products and stock, as seen by the order lifecycle
// ============================================================================

pub mod product;
pub mod in_memory;
pub mod postgres;

pub use product::{CatalogStore, Product, StockError};
pub use in_memory::InMemoryCatalog;
pub use postgres::PgCatalogStore;
