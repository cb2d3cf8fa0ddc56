mod server;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// - Orders created and lifecycle transitions committed
// - Rejections by operation and error kind
// - Stock reservations and restorations
// - Consistency failures (stock adjustments that failed after commit)
// - Optimistic concurrency conflicts
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub order_transitions: IntCounterVec,
    pub order_rejections: IntCounterVec,
    pub stock_adjustments: IntCounterVec,
    pub consistency_failures: IntCounterVec,
    pub concurrency_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Committed order lifecycle events"),
            &["transition"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Order operations rejected"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let stock_adjustments = IntCounterVec::new(
            Opts::new("stock_adjustments_total", "Product stock adjustments applied"),
            &["direction"],
        )?;
        registry.register(Box::new(stock_adjustments.clone()))?;

        let consistency_failures = IntCounterVec::new(
            Opts::new(
                "consistency_failures_total",
                "Stock adjustments that failed after the order state was committed",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(consistency_failures.clone()))?;

        let concurrency_conflicts = IntCounter::new(
            "concurrency_conflicts_total",
            "Order commands that lost an optimistic concurrency race",
        )?;
        registry.register(Box::new(concurrency_conflicts.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_transitions,
            order_rejections,
            stock_adjustments,
            consistency_failures,
            concurrency_conflicts,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, transition: &str) {
        self.order_transitions.with_label_values(&[transition]).inc();
    }

    pub fn record_rejection(&self, operation: &str, reason: &str) {
        self.order_rejections.with_label_values(&[operation, reason]).inc();
    }

    /// `delta` < 0 counts as a reservation, otherwise a restoration
    pub fn record_stock_adjustment(&self, delta: i64) {
        let direction = if delta < 0 { "reserve" } else { "restore" };
        self.stock_adjustments.with_label_values(&[direction]).inc();
    }

    pub fn record_consistency_failure(&self, operation: &str) {
        self.consistency_failures.with_label_values(&[operation]).inc();
    }
}
