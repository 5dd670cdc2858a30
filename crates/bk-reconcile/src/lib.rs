//! bk-reconcile
//!
//! Purchase-acknowledgement reconciliation.
//!
//! Architectural decisions:
//! - Acknowledgement is attempted at most once per purchase token; a token
//!   already in flight makes later callers await the first call's outcome.
//! - Outcomes are data. Provider failures surface as `Failed { reason }`,
//!   never as panics or errors raised across the reconcile boundary.
//! - Batches preserve input order in their outcomes while distinct tokens
//!   acknowledge concurrently.
//! - No timeout and no cancellation inside the core; callers who need a
//!   bound race the future externally.

mod engine;
mod types;

pub use engine::PurchaseReconciler;
pub use types::*;

/// Failure reason reported for records whose state is outside the known set.
pub const UNSPECIFIED_STATE_REASON: &str = "unspecified purchase state";
