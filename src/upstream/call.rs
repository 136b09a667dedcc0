//! Timeout and cancellation wrapper for a single upstream call
//!
//! Errors raised after the derived token fires are reported as a timeout or a
//! cancellation, never as the transport failure that the abort caused.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cancel::{combine, DerivedCancellation};
use crate::upstream::error::FetchError;

/// Run one upstream call under a caller token and a per-call timeout.
///
/// `call` receives the derived token (if any) so the transport can abort its own I/O.
/// If the derived token fires first, or the call fails after it fired, the result is
/// [`FetchError::Timeout`] when our timer fired and [`FetchError::Cancelled`] otherwise.
/// The timer and caller listener are released on every path.
#[instrument(skip(caller, call))]
pub async fn call_with_timeout<F, Fut, T>(
    caller: Option<&CancellationToken>,
    timeout: Option<Duration>,
    call: F,
) -> Result<T, FetchError>
where
    F: FnOnce(Option<CancellationToken>) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut derived = combine(caller, timeout);

    if derived.is_cancelled() {
        debug!("Token already cancelled; upstream call skipped");
        return Err(abort_error(&derived));
    }

    let result = match derived.token().cloned() {
        None => call(None).await,
        Some(token) => {
            let outcome = tokio::select! {
                biased;
                result = call(Some(token.clone())) => result,
                _ = token.cancelled() => Err(FetchError::Cancelled),
            };
            match outcome {
                Err(_) if token.is_cancelled() => Err(abort_error(&derived)),
                other => other,
            }
        }
    };

    derived.cleanup();

    if let Err(err) = &result {
        debug!(kind = ?err.kind(), error = %err, "Upstream call failed");
    }
    result
}

fn abort_error(derived: &DerivedCancellation) -> FetchError {
    match derived.timeout() {
        Some(after) if derived.did_timeout() => FetchError::Timeout(after),
        _ => FetchError::Cancelled,
    }
}
