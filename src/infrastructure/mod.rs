// ============================================================================
// Infrastructure - Cross-cutting pieces the order lifecycle leans on
// ============================================================================

pub mod consistency_ledger;

pub use consistency_ledger::{ConsistencyLedger, InconsistencyRecord, LedgerStats};
