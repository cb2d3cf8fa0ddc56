use serde::{Deserialize, Serialize};
use std::fmt;

use super::value_objects::OrderStatus;

// ============================================================================
// Cancellation Transition Table
// ============================================================================
//
//   current            customer cancel
//   ----------------   ------------------------------------------
//   pending            DirectCancel     (stock restored now)
//   processing         RequestApproval  (stock held until admin decides)
//   shipped            rejected
//   delivered          rejected
//   cancelled          rejected
//   cancel_requested   rejected
//
// cancel_requested has exactly one exit per admin decision (approve ->
// cancelled with restock, reject -> processing), so a reservation is
// released at most once per order.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    DirectCancel,
    RequestApproval,
    Reject(CancelRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelRejection {
    AlreadyCancelled,
    AwaitingApproval,
    Delivered,
    Shipped,
}

impl CancelRejection {
    pub fn message(&self) -> &'static str {
        match self {
            CancelRejection::AlreadyCancelled => "Order is already cancelled",
            CancelRejection::AwaitingApproval => "Cancel request is already pending admin approval",
            CancelRejection::Delivered => "Delivered orders cannot be cancelled",
            CancelRejection::Shipped => "Shipped orders cannot be cancelled. Please contact support.",
        }
    }
}

impl fmt::Display for CancelRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of a customer cancellation against the order's current status.
pub fn cancel_decision(status: OrderStatus) -> CancelDecision {
    match status {
        OrderStatus::Pending => CancelDecision::DirectCancel,
        OrderStatus::Processing => CancelDecision::RequestApproval,
        OrderStatus::Shipped => CancelDecision::Reject(CancelRejection::Shipped),
        OrderStatus::Delivered => CancelDecision::Reject(CancelRejection::Delivered),
        OrderStatus::Cancelled => CancelDecision::Reject(CancelRejection::AlreadyCancelled),
        OrderStatus::CancelRequested => CancelDecision::Reject(CancelRejection::AwaitingApproval),
    }
}

/// Approve and reject both require an open cancel request.
pub fn has_pending_cancel_request(status: OrderStatus) -> bool {
    status == OrderStatus::CancelRequested
}
