//! Cycle error taxonomy.
//!
//! A blocked filter or a guard denial is NOT an error - those are ordinary
//! return values (`FilterDecision::Block`, `Verdict::Deny`). Errors here are
//! the things that can actually go wrong mid-cycle and that the scheduler
//! must route differently: oracle failures degrade to hold, execution
//! failures revert or retry a pending transition, persistence failures abort
//! the cycle before in-memory state can diverge from storage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    /// Decision oracle unavailable or returned something unusable.
    /// Recovered locally: the cycle degrades to hold.
    #[error("oracle: {0}")]
    Oracle(String),

    /// Order placement or close failed at the execution capability.
    /// Surfaced as an alert; a pending open reverts, a pending close retries.
    #[error("execution: {0}")]
    Execution(String),

    /// A store or state file could not be written. Fatal for the cycle:
    /// state that cannot be persisted must not be committed in memory.
    #[error("persistence: {0}")]
    Persistence(#[from] std::io::Error),
}
