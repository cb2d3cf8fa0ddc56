// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// GENERIC persistence infrastructure for event sourcing.
// All components work with ANY aggregate/event type.
//
// ============================================================================

pub mod event_store;

pub use event_store::{load_aggregate, AppendError, EventStore, InMemoryEventStore};
