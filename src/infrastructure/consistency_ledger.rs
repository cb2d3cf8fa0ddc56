use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Consistency Ledger
// ============================================================================
//
// Stock adjustments that failed after the order state they belong to was
// already committed. Each entry is a product whose stock figure no longer
// matches the orders that reference it and needs manual reconciliation.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct InconsistencyRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Stock change that should have been applied
    pub delta: i64,
    pub operation: String,
    pub error_message: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerStats {
    pub total_records: usize,
    pub by_operation: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ConsistencyLedger {
    records: Mutex<Vec<InconsistencyRecord>>,
}

impl ConsistencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        delta: i64,
        operation: &str,
        error_message: impl Into<String>,
    ) -> Uuid {
        let record = InconsistencyRecord {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            delta,
            operation: operation.to_string(),
            error_message: error_message.into(),
            recorded_at: Utc::now(),
        };

        tracing::error!(
            record_id = %record.id,
            order_id = %order_id,
            product_id = %product_id,
            delta = delta,
            operation = operation,
            error = %record.error_message,
            "Stock left inconsistent with committed order state"
        );

        let id = record.id;
        self.records.lock().await.push(record);
        id
    }

    pub async fn entries(&self) -> Vec<InconsistencyRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn stats(&self) -> LedgerStats {
        let records = self.records.lock().await;
        let mut by_operation = HashMap::new();
        for record in records.iter() {
            *by_operation.entry(record.operation.clone()).or_insert(0) += 1;
        }

        LedgerStats {
            total_records: records.len(),
            by_operation,
        }
    }
}
