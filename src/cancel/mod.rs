//! Cancellation combination
//!
//! Derives one [`CancellationToken`] from an optional caller token and an optional timeout.
//! The derived handle records whether it fired because of its own timer, so callers can
//! report "timed out" and "cancelled" as different failures.

pub mod combinator;

pub use combinator::{combine, DerivedCancellation};
pub use tokio_util::sync::CancellationToken;
