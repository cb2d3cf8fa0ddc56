use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::event_sourcing::core::Aggregate;
use super::value_objects::{LineItem, OrderAmounts, OrderStatus, PaymentState, ShippingAddress};
use super::transitions::{cancel_decision, has_pending_cancel_request, CancelDecision};
use super::events::*;
use super::commands::OrderCommand;
use super::errors::OrderError;

pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";
pub const DEFAULT_CANCEL_REQUEST_REASON: &str = "Cancellation requested by user";

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

/// The order record. Derived entirely from the order's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub owner_id: Uuid,

    // Written once at placement
    pub line_items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub amounts: OrderAmounts,

    // Lifecycle state
    pub payment: PaymentState,
    pub status: OrderStatus,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    /// Set once a cancellation has handed the reserved stock back. Stays set
    /// if an override later moves the order out of `cancelled`.
    #[serde(default)]
    pub reservation_released: bool,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// Validate a new order and produce its first event.
    pub fn place(
        owner_id: Uuid,
        line_items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        amounts: OrderAmounts,
    ) -> Result<OrderEvent, OrderError> {
        Self::validate_items(&line_items)?;

        if let Some(field) = amounts.first_negative() {
            return Err(OrderError::NegativeAmount(field));
        }

        Ok(OrderEvent::Placed(OrderPlaced {
            owner_id,
            line_items,
            shipping_address,
            amounts,
            placed_at: Utc::now(),
        }))
    }

    fn validate_items(items: &[LineItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if item.unit_price < Decimal::ZERO {
                return Err(OrderError::NegativePrice { product_id: item.product_id });
            }
        }

        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Whether committing `events` on top of this state should hand the
    /// reserved stock back. False once a reservation was already released.
    pub fn releases_reservation(&self, events: &[OrderEvent]) -> bool {
        !self.reservation_released && events.iter().any(OrderEvent::releases_stock)
    }
}

/// Caller-supplied reason, or the default when it is missing or blank.
fn reason_or(reason: &Option<String>, default: &str) -> String {
    reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(default)
        .to_string()
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => Ok(Self {
                id: aggregate_id,
                version: 0,
                owner_id: e.owner_id,
                line_items: e.line_items.clone(),
                shipping_address: e.shipping_address.clone(),
                amounts: e.amounts.clone(),
                payment: PaymentState::default(),
                status: OrderStatus::Pending,
                is_delivered: false,
                delivered_at: None,
                cancel_reason: None,
                cancel_requested_at: None,
                reservation_released: false,
                created_at: e.placed_at,
                updated_at: e.placed_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Placed(_) => return Err(OrderError::AlreadyPlaced),
            OrderEvent::Paid(e) => {
                self.payment.is_paid = true;
                self.payment.paid_at = Some(e.paid_at);
                self.payment.reference = Some(e.reference.clone());
                if e.previous_status == OrderStatus::CancelRequested {
                    self.cancel_reason = None;
                    self.cancel_requested_at = None;
                }
                self.status = OrderStatus::Processing;
            }
            OrderEvent::StatusSet(e) => {
                self.status = e.to;
                if e.to == OrderStatus::Delivered {
                    self.is_delivered = true;
                    self.delivered_at = Some(e.set_at);
                }
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
                self.reservation_released = true;
            }
            OrderEvent::CancelRequested(e) => {
                self.status = OrderStatus::CancelRequested;
                self.cancel_reason = Some(e.reason.clone());
                self.cancel_requested_at = Some(e.requested_at);
            }
            OrderEvent::CancelApproved(_) => {
                self.status = OrderStatus::Cancelled;
                self.reservation_released = true;
            }
            OrderEvent::CancelRejected(_) => {
                self.status = OrderStatus::Processing;
                self.cancel_reason = None;
                self.cancel_requested_at = None;
            }
        }

        self.updated_at = event.occurred_at();
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        match command {
            OrderCommand::MarkPaid { reference } => {
                if self.payment.is_paid {
                    return Err(OrderError::AlreadyPaid(self.status));
                }

                Ok(vec![OrderEvent::Paid(OrderPaid {
                    reference: reference.clone(),
                    previous_status: self.status,
                    paid_at: now,
                })])
            }

            OrderCommand::SetStatus { status } => {
                if !status.is_admin_settable() {
                    return Err(OrderError::StatusNotSettable(*status));
                }

                Ok(vec![OrderEvent::StatusSet(OrderStatusSet {
                    from: self.status,
                    to: *status,
                    set_at: now,
                })])
            }

            OrderCommand::RequestCancel { caller_id, reason } => {
                if !self.is_owned_by(*caller_id) {
                    return Err(OrderError::NotOwner);
                }

                match cancel_decision(self.status) {
                    CancelDecision::DirectCancel => Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                        reason: reason_or(reason, DEFAULT_CANCEL_REASON),
                        cancelled_by: *caller_id,
                        cancelled_at: now,
                    })]),
                    CancelDecision::RequestApproval => {
                        Ok(vec![OrderEvent::CancelRequested(OrderCancelRequested {
                            reason: reason_or(reason, DEFAULT_CANCEL_REQUEST_REASON),
                            requested_by: *caller_id,
                            requested_at: now,
                        })])
                    }
                    CancelDecision::Reject(rejection) => Err(OrderError::CancelNotAllowed {
                        status: self.status,
                        rejection,
                    }),
                }
            }

            OrderCommand::ApproveCancel => {
                if !has_pending_cancel_request(self.status) {
                    return Err(OrderError::NoCancelRequestPending(self.status));
                }

                Ok(vec![OrderEvent::CancelApproved(OrderCancelApproved { approved_at: now })])
            }

            OrderCommand::RejectCancel => {
                if !has_pending_cancel_request(self.status) {
                    return Err(OrderError::NoCancelRequestPending(self.status));
                }

                Ok(vec![OrderEvent::CancelRejected(OrderCancelRejected { rejected_at: now })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CancelRejection, PaymentReference};
    use crate::event_sourcing::core::EventEnvelope;

    fn line_item(quantity: u32) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            name: "Noise Cancelling Headphones".to_string(),
            quantity,
            unit_price: Decimal::new(24999, 0),
            image_ref: Some("https://img.example/headphones.jpg".to_string()),
        }
    }

    fn placed(owner_id: Uuid) -> OrderAggregate {
        let event = OrderAggregate::place(
            owner_id,
            vec![line_item(2)],
            ShippingAddress::default(),
            OrderAmounts::default(),
        )
        .unwrap();
        let mut order = OrderAggregate::apply_first_event(Uuid::new_v4(), &event).unwrap();
        order.set_version(1);
        order
    }

    fn run(order: &mut OrderAggregate, command: OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        let events = order.handle_command(&command)?;
        for event in &events {
            order.apply_event(event).unwrap();
        }
        Ok(events)
    }

    fn reference() -> PaymentReference {
        PaymentReference {
            id: "pi_sim_1700000000_abc".to_string(),
            status: "succeeded".to_string(),
            update_time: "2026-10-17T10:00:00Z".to_string(),
            email_address: Some("user@example.com".to_string()),
        }
    }

    #[test]
    fn test_place_starts_pending_and_unpaid() {
        let owner = Uuid::new_v4();
        let order = placed(owner);

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.payment.is_paid);
        assert_eq!(order.owner_id, owner);
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn test_place_validation() {
        let owner = Uuid::new_v4();
        let address = ShippingAddress::default();

        assert!(matches!(
            OrderAggregate::place(owner, vec![], address.clone(), OrderAmounts::default()),
            Err(OrderError::EmptyItems)
        ));
        assert!(matches!(
            OrderAggregate::place(owner, vec![line_item(0)], address.clone(), OrderAmounts::default()),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));

        let mut negative = line_item(1);
        negative.unit_price = Decimal::new(-1, 0);
        assert!(matches!(
            OrderAggregate::place(owner, vec![negative], address.clone(), OrderAmounts::default()),
            Err(OrderError::NegativePrice { .. })
        ));

        let amounts = OrderAmounts { shipping: Decimal::new(-100, 0), ..OrderAmounts::default() };
        assert!(matches!(
            OrderAggregate::place(owner, vec![line_item(1)], address, amounts),
            Err(OrderError::NegativeAmount("shipping"))
        ));
    }

    #[test]
    fn test_mark_paid_moves_to_processing_once() {
        let mut order = placed(Uuid::new_v4());

        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.payment.is_paid);
        assert!(order.payment.paid_at.is_some());
        assert_eq!(order.payment.reference, Some(reference()));

        let second = run(&mut order, OrderCommand::MarkPaid { reference: reference() });
        assert!(matches!(second, Err(OrderError::AlreadyPaid(OrderStatus::Processing))));
    }

    #[test]
    fn test_mark_paid_advances_from_any_status() {
        let mut order = placed(Uuid::new_v4());
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Shipped }).unwrap();

        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn test_set_status_delivered_stamps_delivery() {
        let mut order = placed(Uuid::new_v4());

        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Shipped }).unwrap();
        assert!(!order.is_delivered);

        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Delivered }).unwrap();
        assert!(order.is_delivered);
        assert!(order.delivered_at.is_some());
    }

    #[test]
    fn test_set_status_ignores_previous_state_but_refuses_cancel_requested() {
        let mut order = placed(Uuid::new_v4());
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Cancelled }).unwrap();
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Pending }).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let result = run(&mut order, OrderCommand::SetStatus { status: OrderStatus::CancelRequested });
        assert!(matches!(result, Err(OrderError::StatusNotSettable(OrderStatus::CancelRequested))));
    }

    #[test]
    fn test_reservation_released_only_once() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);
        let cancel = OrderCommand::RequestCancel { caller_id: owner, reason: None };

        let events = order.handle_command(&cancel).unwrap();
        assert!(order.releases_reservation(&events));
        for event in &events {
            order.apply_event(event).unwrap();
        }
        assert!(order.reservation_released);

        // Override back to pending and cancel again
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Pending }).unwrap();
        assert!(order.reservation_released);
        let events = order.handle_command(&cancel).unwrap();
        assert!(events[0].releases_stock());
        assert!(!order.releases_reservation(&events));
    }

    #[test]
    fn test_override_cancel_keeps_reservation() {
        let mut order = placed(Uuid::new_v4());
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Cancelled }).unwrap();
        assert!(!order.reservation_released);
    }

    #[test]
    fn test_payment_clears_stale_cancel_request() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Processing }).unwrap();
        run(&mut order, OrderCommand::RequestCancel { caller_id: owner, reason: None }).unwrap();
        assert!(order.cancel_requested_at.is_some());

        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.cancel_reason.is_none());
        assert!(order.cancel_requested_at.is_none());
    }

    #[test]
    fn test_direct_cancel_from_pending() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);

        let events = run(&mut order, OrderCommand::RequestCancel { caller_id: owner, reason: None }).unwrap();

        assert!(events[0].releases_stock());
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason.as_deref(), Some(DEFAULT_CANCEL_REASON));
        assert!(order.cancel_requested_at.is_none());
    }

    #[test]
    fn test_cancel_request_from_processing_holds_stock() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);
        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();

        let events = run(
            &mut order,
            OrderCommand::RequestCancel { caller_id: owner, reason: Some("  ".to_string()) },
        )
        .unwrap();

        assert!(!events[0].releases_stock());
        assert_eq!(order.status, OrderStatus::CancelRequested);
        assert_eq!(order.cancel_reason.as_deref(), Some(DEFAULT_CANCEL_REQUEST_REASON));
        assert!(order.cancel_requested_at.is_some());
    }

    #[test]
    fn test_non_owner_cannot_cancel_in_any_status() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        for status in OrderStatus::ALL {
            let mut order = placed(owner);
            order.status = status;

            let result = order.handle_command(&OrderCommand::RequestCancel {
                caller_id: stranger,
                reason: Some("mine now".to_string()),
            });
            assert!(matches!(result, Err(OrderError::NotOwner)), "status {status}");
        }
    }

    #[test]
    fn test_cancel_rejected_after_shipping() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);
        run(&mut order, OrderCommand::SetStatus { status: OrderStatus::Shipped }).unwrap();

        let result = order.handle_command(&OrderCommand::RequestCancel { caller_id: owner, reason: None });
        assert!(matches!(
            result,
            Err(OrderError::CancelNotAllowed {
                status: OrderStatus::Shipped,
                rejection: CancelRejection::Shipped
            })
        ));
    }

    #[test]
    fn test_approve_and_reject_require_pending_request() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);

        assert!(matches!(
            order.handle_command(&OrderCommand::ApproveCancel),
            Err(OrderError::NoCancelRequestPending(OrderStatus::Pending))
        ));
        assert!(matches!(
            order.handle_command(&OrderCommand::RejectCancel),
            Err(OrderError::NoCancelRequestPending(OrderStatus::Pending))
        ));

        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();
        run(
            &mut order,
            OrderCommand::RequestCancel { caller_id: owner, reason: Some("Changed my mind".to_string()) },
        )
        .unwrap();

        let approved = run(&mut order, OrderCommand::ApproveCancel).unwrap();
        assert!(approved[0].releases_stock());
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason.as_deref(), Some("Changed my mind"));

        // A second approval finds no open request
        assert!(matches!(
            order.handle_command(&OrderCommand::ApproveCancel),
            Err(OrderError::NoCancelRequestPending(OrderStatus::Cancelled))
        ));
    }

    #[test]
    fn test_reject_clears_request_fields() {
        let owner = Uuid::new_v4();
        let mut order = placed(owner);
        run(&mut order, OrderCommand::MarkPaid { reference: reference() }).unwrap();
        run(&mut order, OrderCommand::RequestCancel { caller_id: owner, reason: None }).unwrap();

        let events = run(&mut order, OrderCommand::RejectCancel).unwrap();

        assert!(!events[0].releases_stock());
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.cancel_reason.is_none());
        assert!(order.cancel_requested_at.is_none());
    }

    #[test]
    fn test_replay_reproduces_state() {
        let owner = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let first = OrderAggregate::place(
            owner,
            vec![line_item(1)],
            ShippingAddress::default(),
            OrderAmounts::default(),
        )
        .unwrap();

        let mut live = OrderAggregate::apply_first_event(order_id, &first).unwrap();
        let mut envelopes = vec![EventEnvelope::new(order_id, 1, first, Uuid::new_v4())];

        for command in [
            OrderCommand::MarkPaid { reference: reference() },
            OrderCommand::RequestCancel { caller_id: owner, reason: None },
            OrderCommand::RejectCancel,
        ] {
            for event in live.handle_command(&command).unwrap() {
                live.apply_event(&event).unwrap();
                let seq = envelopes.len() as i64 + 1;
                envelopes.push(EventEnvelope::new(order_id, seq, event, Uuid::new_v4()));
            }
        }

        let replayed = OrderAggregate::load_from_events(&envelopes).unwrap();
        assert_eq!(replayed.id, order_id);
        assert_eq!(replayed.version, 4);
        assert_eq!(replayed.status, live.status);
        assert_eq!(replayed.payment, live.payment);
        assert_eq!(replayed.updated_at, live.updated_at);
    }

    #[test]
    fn test_stream_must_start_with_placement() {
        let event = OrderEvent::CancelApproved(OrderCancelApproved { approved_at: Utc::now() });
        assert!(matches!(
            OrderAggregate::apply_first_event(Uuid::new_v4(), &event),
            Err(OrderError::NotInitialized)
        ));
    }
}
