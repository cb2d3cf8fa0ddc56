use uuid::Uuid;

use super::transitions::CancelRejection;
use super::value_objects::OrderStatus;
use crate::utils::IsTransient;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("No order items")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: u32 },

    #[error("Negative unit price for product {product_id}")]
    NegativePrice { product_id: Uuid },

    #[error("Order amount `{0}` cannot be negative")]
    NegativeAmount(&'static str),

    #[error("Status {0} cannot be set directly")]
    StatusNotSettable(OrderStatus),

    #[error("Not authorized to cancel this order")]
    NotOwner,

    #[error("{rejection} (status: {status})")]
    CancelNotAllowed {
        status: OrderStatus,
        rejection: CancelRejection,
    },

    #[error("No cancel request pending for this order (status: {0})")]
    NoCancelRequestPending(OrderStatus),

    #[error("Order is already paid (status: {0})")]
    AlreadyPaid(OrderStatus),

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Aggregate not initialized")]
    NotInitialized,
}

// ============================================================================
// Lifecycle Errors - What callers of the order lifecycle see
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Malformed input, rejected before any state change
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Insufficient stock for {name}. Available: {available}")]
    InsufficientStock {
        product_id: Uuid,
        name: String,
        requested: i64,
        available: i64,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition from {status}: {reason}")]
    InvalidTransition { status: OrderStatus, reason: String },

    /// Lost an optimistic concurrency race more often than the configured
    /// number of re-evaluations
    #[error("Order {order_id} was modified concurrently")]
    Conflict { order_id: Uuid },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LifecycleError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "validation",
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::InsufficientStock { .. } => "insufficient_stock",
            LifecycleError::Forbidden(_) => "forbidden",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::Conflict { .. } => "conflict",
            LifecycleError::Storage(_) => "storage",
        }
    }
}

impl From<OrderError> for LifecycleError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::NegativePrice { .. }
            | OrderError::NegativeAmount(_)
            | OrderError::StatusNotSettable(_) => LifecycleError::Validation(err.to_string()),
            OrderError::NotOwner => LifecycleError::Forbidden(err.to_string()),
            OrderError::CancelNotAllowed { status, .. }
            | OrderError::NoCancelRequestPending(status)
            | OrderError::AlreadyPaid(status) => LifecycleError::InvalidTransition {
                status,
                reason: err.to_string(),
            },
            OrderError::AlreadyPlaced | OrderError::NotInitialized => {
                LifecycleError::Storage(anyhow::Error::new(err))
            }
        }
    }
}

impl IsTransient for LifecycleError {
    fn is_transient(&self) -> bool {
        matches!(self, LifecycleError::Conflict { .. })
    }
}
