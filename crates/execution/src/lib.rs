pub mod executor;
pub mod sync;

pub use executor::{ExecutionOutcome, OrderExecutor};
pub use sync::sync_pending_orders;
