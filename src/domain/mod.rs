// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order/   - order aggregate, cancellation state machine, lifecycle handler
// - catalog/ - product stock, the collaborator orders reserve against
//
// This layer is separate from the event sourcing infrastructure.
//
// ============================================================================

pub mod order;
pub mod catalog;
