// ============================================================================
// Order Domain - Business Logic for the Order Lifecycle
// ============================================================================
//
// - Value objects (LineItem, OrderStatus, Caller, ...)
// - Transition table for customer cancellation
// - Events (OrderPlaced, OrderPaid, OrderCancelRequested, ...)
// - Commands (MarkPaid, SetStatus, RequestCancel, ...)
// - Errors (OrderError, LifecycleError)
// - Aggregate (OrderAggregate with business logic)
// - Command Handler (OrderCommandHandler: state + stock coordination)
//
// ============================================================================

pub mod value_objects;
pub mod transitions;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use transitions::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
