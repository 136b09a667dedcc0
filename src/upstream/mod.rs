//! Transport-facing helpers
//!
//! Operations that call the market-data provider translate transport failures into
//! [`FetchError`] before handing control back to the retry loop, and use
//! [`call_with_timeout`] to merge their per-call timeout with a forwarded batch token.
//! The retry loop never inspects these errors; the classification helpers exist for
//! callers and for logging.

pub mod call;
pub mod error;

pub use call::call_with_timeout;
pub use error::{check_status, parse_json, FetchError, FetchErrorKind};
