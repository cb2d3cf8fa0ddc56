use uuid::Uuid;
use super::value_objects::{OrderStatus, PaymentReference};

// ============================================================================
// Order Commands - Represent user intent against an existing order
// ============================================================================
//
// Placing an order has no prior state to check against and goes through
// `OrderAggregate::place` instead.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    MarkPaid {
        reference: PaymentReference,
    },
    SetStatus {
        status: OrderStatus,
    },
    RequestCancel {
        caller_id: Uuid,
        reason: Option<String>,
    },
    ApproveCancel,
    RejectCancel,
}

impl OrderCommand {
    pub fn operation(&self) -> &'static str {
        match self {
            OrderCommand::MarkPaid { .. } => "mark_paid",
            OrderCommand::SetStatus { .. } => "set_status",
            OrderCommand::RequestCancel { .. } => "request_cancel",
            OrderCommand::ApproveCancel => "approve_cancel",
            OrderCommand::RejectCancel => "reject_cancel",
        }
    }
}
