use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::core::DomainEvent;
use super::value_objects::{LineItem, OrderAmounts, OrderStatus, PaymentReference, ShippingAddress};

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Paid(OrderPaid),
    StatusSet(OrderStatusSet),
    Cancelled(OrderCancelled),
    CancelRequested(OrderCancelRequested),
    CancelApproved(OrderCancelApproved),
    CancelRejected(OrderCancelRejected),
}

impl OrderEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.placed_at,
            OrderEvent::Paid(e) => e.paid_at,
            OrderEvent::StatusSet(e) => e.set_at,
            OrderEvent::Cancelled(e) => e.cancelled_at,
            OrderEvent::CancelRequested(e) => e.requested_at,
            OrderEvent::CancelApproved(e) => e.approved_at,
            OrderEvent::CancelRejected(e) => e.rejected_at,
        }
    }

    /// Whether committing this event hands the order's reserved stock back
    /// to the catalog. Only the two cancellation exits do.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderEvent::Cancelled(_) | OrderEvent::CancelApproved(_))
    }
}

impl DomainEvent for OrderEvent {
    fn event_name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::Paid(_) => "OrderPaid",
            OrderEvent::StatusSet(_) => "OrderStatusSet",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::CancelRequested(_) => "OrderCancelRequested",
            OrderEvent::CancelApproved(_) => "OrderCancelApproved",
            OrderEvent::CancelRejected(_) => "OrderCancelRejected",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - Initial event; stock for every line item is already reserved
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPlaced {
    pub owner_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub amounts: OrderAmounts,
    pub placed_at: DateTime<Utc>,
}

/// Order Paid - Payment confirmed by the provider
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPaid {
    pub reference: PaymentReference,
    pub previous_status: OrderStatus,
    pub paid_at: DateTime<Utc>,
}

/// Order Status Set - Administrative status override
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderStatusSet {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub set_at: DateTime<Utc>,
}

/// Order Cancelled - Direct customer cancellation of a pending order
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelled {
    pub reason: String,
    pub cancelled_by: Uuid,
    pub cancelled_at: DateTime<Utc>,
}

/// Order Cancel Requested - Customer asked to cancel a processing order
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelRequested {
    pub reason: String,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
}

/// Order Cancel Approved - Admin accepted the request
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelApproved {
    pub approved_at: DateTime<Utc>,
}

/// Order Cancel Rejected - Admin declined the request; fulfillment resumes
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelRejected {
    pub rejected_at: DateTime<Utc>,
}
