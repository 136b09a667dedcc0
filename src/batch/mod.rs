//! Concurrent retry-batch execution
//!
//! A batch moves through `Idle -> Running -> {Completed | Cancelled | AllFailed}`.
//! Workers claim operation indices from a shared counter, run each operation through the
//! retry loop, and write successes into index-addressed slots. The end-of-batch decision
//! lives in [`BatchOutcome::decide`].

pub mod executor;
pub mod retry;
pub mod state;
pub mod types;

pub use executor::*;
pub use retry::RetryLoop;
pub use types::*;
