//! Turn execution: per-thread leases and the graph executor.

mod executor;
mod lease;

pub use executor::{AbortReason, TurnEngine, TurnError, TurnOutcome, TurnStatus};
pub use lease::{Lease, ThreadLeases};
