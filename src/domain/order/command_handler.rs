use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::catalog::{CatalogStore, StockError};
use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};
use crate::event_sourcing::store::{load_aggregate, AppendError, EventStore};
use crate::infrastructure::ConsistencyLedger;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::LifecycleError;
use super::events::OrderEvent;
use super::value_objects::{
    quantities_by_product, Caller, LineItem, OrderAmounts, OrderStatus, PaymentReference,
    ShippingAddress,
};

pub const DIRECT_CANCEL_MESSAGE: &str = "Order cancelled successfully";
pub const CANCEL_REQUESTED_MESSAGE: &str = "Cancellation request sent to admin for approval";

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store → Stock
//
// Order state only moves through event appends guarded by the expected
// version. Stock moves through `CatalogStore::adjust_stock`:
// - reserved before the order is placed, released if placing fails
// - restored after a committed cancellation, never by the losing side of
//   a concurrent race
//
// ============================================================================

/// A command that won its append.
struct Committed {
    order: OrderAggregate,
    events: Vec<OrderEvent>,
    /// The events handed this order's reservation back for the first time
    releases_reservation: bool,
}

/// Result of a customer cancellation.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub direct_cancel: bool,
    pub requires_approval: bool,
    pub message: String,
    pub order: OrderAggregate,
}

pub struct OrderCommandHandler {
    event_store: Arc<dyn EventStore<OrderEvent>>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<ConsistencyLedger>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

impl OrderCommandHandler {
    pub fn new(
        event_store: Arc<dyn EventStore<OrderEvent>>,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<ConsistencyLedger>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            event_store,
            catalog,
            ledger,
            metrics,
            retry: RetryConfig::for_conflicts(3),
        }
    }

    /// How many times a command is evaluated before a concurrency conflict
    /// is returned to the caller.
    pub fn with_conflict_retries(mut self, max_attempts: u32) -> Self {
        self.retry = RetryConfig::for_conflicts(max_attempts);
        self
    }

    pub fn ledger(&self) -> &Arc<ConsistencyLedger> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Place a new order for `owner_id` and reserve stock for every line item.
    ///
    /// Either the order is stored with its whole reservation held, or nothing
    /// changes: reservations already taken by this call are handed back when a
    /// later item or the append fails.
    pub async fn create_order(
        &self,
        owner_id: Uuid,
        line_items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        amounts: OrderAmounts,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = self
            .place_order(owner_id, line_items, shipping_address, amounts)
            .await;
        self.observe("create_order", None, result)
    }

    /// Record a successful payment. Moves the order to `processing`.
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        reference: PaymentReference,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = self
            .execute(order_id, OrderCommand::MarkPaid { reference }, None)
            .await
            .map(|(order, events)| {
                let paid_from = events.iter().find_map(|event| match event {
                    OrderEvent::Paid(e) => Some(e.previous_status),
                    _ => None,
                });
                if paid_from == Some(OrderStatus::Cancelled) {
                    tracing::warn!(
                        order_id = %order.id,
                        "Payment recorded for a cancelled order, status moved back to processing"
                    );
                }
                order
            });

        self.observe("mark_paid", Some(order_id), result)
    }

    /// Administrative status override. Any settable status is accepted from
    /// any current status.
    pub async fn set_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = match require_admin(caller, "update order status") {
            Ok(()) => self
                .execute(order_id, OrderCommand::SetStatus { status }, Some(caller.user_id))
                .await
                .map(|(order, _)| order),
            Err(e) => Err(e),
        };

        if let Ok(order) = &result {
            if status == OrderStatus::Cancelled {
                tracing::warn!(
                    order_id = %order.id,
                    admin_id = %caller.user_id,
                    stock_restored = false,
                    "Order cancelled through status override, reserved stock stays reserved"
                );
            }
        }

        self.observe("set_status", Some(order_id), result)
    }

    /// Customer cancellation. Cancels a pending order outright and releases
    /// its stock; a processing order is parked in `cancel_requested` for an
    /// admin to decide.
    pub async fn request_cancel(
        &self,
        order_id: Uuid,
        caller_id: Uuid,
        reason: Option<String>,
    ) -> Result<CancelOutcome, LifecycleError> {
        let command = OrderCommand::RequestCancel { caller_id, reason };
        let result = self
            .execute(order_id, command, Some(caller_id))
            .await
            .map(|(order, events)| {
                let direct_cancel = events
                    .iter()
                    .any(|event| matches!(event, OrderEvent::Cancelled(_)));
                let message = if direct_cancel {
                    DIRECT_CANCEL_MESSAGE
                } else {
                    CANCEL_REQUESTED_MESSAGE
                };

                CancelOutcome {
                    direct_cancel,
                    requires_approval: !direct_cancel,
                    message: message.to_string(),
                    order,
                }
            });

        self.observe("request_cancel", Some(order_id), result)
    }

    pub async fn approve_cancel_request(
        &self,
        caller: &Caller,
        order_id: Uuid,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = match require_admin(caller, "approve cancellations") {
            Ok(()) => self
                .execute(order_id, OrderCommand::ApproveCancel, Some(caller.user_id))
                .await
                .map(|(order, _)| order),
            Err(e) => Err(e),
        };
        self.observe("approve_cancel", Some(order_id), result)
    }

    pub async fn reject_cancel_request(
        &self,
        caller: &Caller,
        order_id: Uuid,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = match require_admin(caller, "reject cancellations") {
            Ok(()) => self
                .execute(order_id, OrderCommand::RejectCancel, Some(caller.user_id))
                .await
                .map(|(order, _)| order),
            Err(e) => Err(e),
        };
        self.observe("reject_cancel", Some(order_id), result)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Visible to the order's owner and to admins.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller: &Caller,
    ) -> Result<OrderAggregate, LifecycleError> {
        let result = match self.load(order_id).await {
            Ok(order) if order.is_owned_by(caller.user_id) || caller.is_admin() => Ok(order),
            Ok(_) => Err(LifecycleError::Forbidden(
                "Not authorized to view this order".to_string(),
            )),
            Err(e) => Err(e),
        };
        self.observe("get_order", Some(order_id), result)
    }

    /// Orders placed by `owner_id`, newest first.
    pub async fn list_own_orders(&self, owner_id: Uuid) -> Result<Vec<OrderAggregate>, LifecycleError> {
        let result = self.load_all().await.map(|orders| {
            orders
                .into_iter()
                .filter(|order| order.is_owned_by(owner_id))
                .collect()
        });
        self.observe("list_own_orders", None, result)
    }

    /// Every order in the system, newest first. Admin only.
    pub async fn list_all_orders(&self, caller: &Caller) -> Result<Vec<OrderAggregate>, LifecycleError> {
        let result = match require_admin(caller, "list all orders") {
            Ok(()) => self.load_all().await,
            Err(e) => Err(e),
        };
        self.observe("list_all_orders", None, result)
    }

    // ========================================================================
    // Order placement
    // ========================================================================

    async fn place_order(
        &self,
        owner_id: Uuid,
        line_items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        amounts: OrderAmounts,
    ) -> Result<OrderAggregate, LifecycleError> {
        let quantities = quantities_by_product(&line_items);
        let mut names: HashMap<Uuid, String> = HashMap::new();
        for item in &line_items {
            names.entry(item.product_id).or_insert_with(|| item.name.clone());
        }

        let placed = OrderAggregate::place(owner_id, line_items, shipping_address, amounts)?;
        let order_id = Uuid::new_v4();

        self.check_availability(&quantities, &names).await?;
        self.reserve_stock(order_id, &quantities, &names).await?;

        let envelope = EventEnvelope::new(order_id, 1, placed.clone(), Uuid::new_v4())
            .with_user(Some(owner_id))
            .with_metadata("operation", "create_order");

        if let Err(e) = self.event_store.append_events(order_id, 0, vec![envelope]).await {
            tracing::warn!(
                order_id = %order_id,
                error = %e,
                "Failed to store new order, releasing its reservation"
            );
            self.release_reservation(order_id, &quantities, "release_reservation").await;
            return Err(LifecycleError::Storage(anyhow::Error::new(e)));
        }

        let mut order = OrderAggregate::apply_first_event(order_id, &placed)?;
        order.set_version(1);

        self.metrics.orders_created.inc();
        self.metrics.record_transition(placed.event_name());

        tracing::info!(
            order_id = %order_id,
            owner_id = %owner_id,
            items = order.line_items.len(),
            grand_total = %order.amounts.grand_total,
            "Order placed"
        );

        Ok(order)
    }

    /// Reject early, before touching stock, when a product is missing or
    /// visibly short. The reservation itself is still guarded per product.
    async fn check_availability(
        &self,
        quantities: &BTreeMap<Uuid, i64>,
        names: &HashMap<Uuid, String>,
    ) -> Result<(), LifecycleError> {
        for (&product_id, &quantity) in quantities {
            let name = item_name(names, product_id);
            let product = self
                .catalog
                .find_product(product_id)
                .await
                .map_err(|e| stock_rejection(e, name))?
                .ok_or_else(|| LifecycleError::NotFound(format!("Product {name}")))?;

            if product.stock < quantity {
                return Err(LifecycleError::InsufficientStock {
                    product_id,
                    name: name.to_string(),
                    requested: quantity,
                    available: product.stock,
                });
            }
        }

        Ok(())
    }

    async fn reserve_stock(
        &self,
        order_id: Uuid,
        quantities: &BTreeMap<Uuid, i64>,
        names: &HashMap<Uuid, String>,
    ) -> Result<(), LifecycleError> {
        let mut reserved = BTreeMap::new();

        for (&product_id, &quantity) in quantities {
            match self.catalog.adjust_stock(product_id, -quantity).await {
                Ok(stock) => {
                    self.metrics.record_stock_adjustment(-quantity);
                    tracing::debug!(
                        order_id = %order_id,
                        product_id = %product_id,
                        quantity = quantity,
                        stock = stock,
                        "Reserved stock"
                    );
                    reserved.insert(product_id, quantity);
                }
                Err(e) => {
                    tracing::warn!(
                        order_id = %order_id,
                        product_id = %product_id,
                        error = %e,
                        "Reservation failed, handing back {} earlier reservation(s)",
                        reserved.len()
                    );
                    self.release_reservation(order_id, &reserved, "release_reservation").await;
                    return Err(stock_rejection(e, item_name(names, product_id)));
                }
            }
        }

        Ok(())
    }

    /// Give stock back to the catalog. A failed increment cannot be undone
    /// by anything here, so it goes to the consistency ledger instead of
    /// failing the call.
    async fn release_reservation(
        &self,
        order_id: Uuid,
        quantities: &BTreeMap<Uuid, i64>,
        operation: &'static str,
    ) {
        for (&product_id, &quantity) in quantities {
            match self.catalog.adjust_stock(product_id, quantity).await {
                Ok(stock) => {
                    self.metrics.record_stock_adjustment(quantity);
                    tracing::debug!(
                        order_id = %order_id,
                        product_id = %product_id,
                        quantity = quantity,
                        stock = stock,
                        operation = operation,
                        "Restored stock"
                    );
                }
                Err(e) => {
                    self.metrics.record_consistency_failure(operation);
                    self.ledger
                        .record(order_id, product_id, quantity, operation, e.to_string())
                        .await;
                }
            }
        }
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    /// Run a command against the current order state, re-evaluating it from
    /// fresh state whenever another command committed in between. Stock is
    /// only released once, after the winning append.
    async fn execute(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        acting_user: Option<Uuid>,
    ) -> Result<(OrderAggregate, Vec<OrderEvent>), LifecycleError> {
        let correlation_id = Uuid::new_v4();
        let command = &command;

        let committed = retry_on_transient(self.retry.clone(), move |attempt| async move {
            self.execute_once(order_id, command, acting_user, correlation_id, attempt)
                .await
        })
        .await
        .into_result()?;
        let Committed {
            order,
            events,
            releases_reservation,
        } = committed;

        for event in &events {
            self.metrics.record_transition(event.event_name());
            tracing::info!(
                order_id = %order_id,
                event = event.event_name(),
                status = %order.status,
                version = order.version(),
                "Order transition committed"
            );
        }

        if releases_reservation {
            let quantities = quantities_by_product(&order.line_items);
            self.release_reservation(order_id, &quantities, "restore_stock").await;
        } else if events.iter().any(OrderEvent::releases_stock) {
            tracing::warn!(
                order_id = %order_id,
                status = %order.status,
                stock_restored = false,
                "Order cancelled again after an earlier cancellation already restored its stock"
            );
        }

        Ok((order, events))
    }

    async fn execute_once(
        &self,
        order_id: Uuid,
        command: &OrderCommand,
        acting_user: Option<Uuid>,
        correlation_id: Uuid,
        attempt: u32,
    ) -> Result<Committed, LifecycleError> {
        let mut order = self.load(order_id).await?;
        let expected_version = order.version();

        tracing::debug!(
            order_id = %order_id,
            version = expected_version,
            status = %order.status,
            attempt = attempt,
            operation = command.operation(),
            "Evaluating command"
        );

        let events = order.handle_command(command)?;
        if events.is_empty() {
            return Ok(Committed {
                order,
                events,
                releases_reservation: false,
            });
        }
        let releases_reservation = order.releases_reservation(&events);

        let envelopes = events
            .iter()
            .zip(expected_version + 1..)
            .map(|(event, sequence)| {
                EventEnvelope::new(order_id, sequence, event.clone(), correlation_id)
                    .with_user(acting_user)
                    .with_metadata("operation", command.operation())
            })
            .collect();

        let new_version = match self
            .event_store
            .append_events(order_id, expected_version, envelopes)
            .await
        {
            Ok(version) => version,
            Err(AppendError::Conflict { expected, current, .. }) => {
                self.metrics.concurrency_conflicts.inc();
                tracing::warn!(
                    order_id = %order_id,
                    expected_version = expected,
                    current_version = current,
                    attempt = attempt,
                    "Order changed while the command was evaluated"
                );
                return Err(LifecycleError::Conflict { order_id });
            }
            Err(e) => return Err(LifecycleError::Storage(anyhow::Error::new(e))),
        };

        for event in &events {
            order.apply_event(event)?;
        }
        order.set_version(new_version);

        Ok(Committed {
            order,
            events,
            releases_reservation,
        })
    }

    async fn load(&self, order_id: Uuid) -> Result<OrderAggregate, LifecycleError> {
        load_aggregate::<OrderAggregate, _>(self.event_store.as_ref(), order_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound("Order".to_string()))
    }

    async fn load_all(&self) -> Result<Vec<OrderAggregate>, LifecycleError> {
        let mut orders = Vec::new();
        for order_id in self.event_store.aggregate_ids().await? {
            if let Some(order) =
                load_aggregate::<OrderAggregate, _>(self.event_store.as_ref(), order_id).await?
            {
                orders.push(order);
            }
        }

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Count and log a rejection on its way back to the caller.
    fn observe<T>(
        &self,
        operation: &'static str,
        order_id: Option<Uuid>,
        result: Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        if let Err(e) = &result {
            self.metrics.record_rejection(operation, e.kind());
            let order_id = order_id.map(|id| id.to_string()).unwrap_or_default();

            match e {
                LifecycleError::Storage(_) => tracing::error!(
                    operation = operation,
                    order_id = %order_id,
                    error = %e,
                    "Order operation failed"
                ),
                _ => tracing::warn!(
                    operation = operation,
                    order_id = %order_id,
                    reason = e.kind(),
                    error = %e,
                    "Order operation rejected"
                ),
            }
        }

        result
    }
}

fn require_admin(caller: &Caller, action: &str) -> Result<(), LifecycleError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden(format!("Admin role required to {action}")))
    }
}

fn item_name(names: &HashMap<Uuid, String>, product_id: Uuid) -> &str {
    names.get(&product_id).map(String::as_str).unwrap_or("unknown product")
}

fn stock_rejection(err: StockError, name: &str) -> LifecycleError {
    match err {
        StockError::ProductNotFound(_) => LifecycleError::NotFound(format!("Product {name}")),
        StockError::InsufficientStock {
            product_id,
            requested,
            available,
        } => LifecycleError::InsufficientStock {
            product_id,
            name: name.to_string(),
            requested,
            available,
        },
        StockError::Storage(e) => LifecycleError::Storage(e),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
