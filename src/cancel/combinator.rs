//! Caller token + timeout combinator
//!
//! When a timeout is present, [`combine`] allocates a fresh token and arms a single watcher
//! task that cancels it on whichever comes first: the timer or the caller's token.
//! [`DerivedCancellation::cleanup`] disarms and aborts the watcher, which clears the timer
//! and detaches the caller listener in one step. Cleanup is idempotent and also runs on drop.
//!
//! Aborting a task is not synchronous, so the watcher fires only while holding the shared
//! `armed` lock and only if it is still set. Once `cleanup` returns, a watcher that has not
//! fired yet can no longer set the timeout flag or cancel the derived token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Token derived from a caller token and a timeout
#[derive(Debug)]
pub struct DerivedCancellation {
    token: Option<CancellationToken>,
    timeout: Option<Duration>,
    timed_out: Arc<AtomicBool>,
    armed: Arc<Mutex<bool>>,
    watcher: Option<JoinHandle<()>>,
}

/// Combine an optional caller token with an optional timeout.
///
/// A `None` or zero timeout returns the caller's token unchanged with nothing to clean up.
/// Otherwise a new token is returned; a caller token that is already cancelled cancels it
/// before this function returns.
///
/// Arming a timer spawns a task, so this must run inside a Tokio runtime.
pub fn combine(caller: Option<&CancellationToken>, timeout: Option<Duration>) -> DerivedCancellation {
    let timeout = timeout.filter(|t| !t.is_zero());
    let timed_out = Arc::new(AtomicBool::new(false));
    let armed = Arc::new(Mutex::new(false));

    let Some(after) = timeout else {
        return DerivedCancellation {
            token: caller.cloned(),
            timeout: None,
            timed_out,
            armed,
            watcher: None,
        };
    };

    let derived = CancellationToken::new();

    if caller.is_some_and(CancellationToken::is_cancelled) {
        trace!("Caller token already cancelled; derived token cancelled immediately");
        derived.cancel();
        return DerivedCancellation {
            token: Some(derived),
            timeout: Some(after),
            timed_out,
            armed,
            watcher: None,
        };
    }

    *armed.lock() = true;
    let watcher = tokio::spawn(watch(
        caller.cloned(),
        derived.clone(),
        after,
        Arc::clone(&timed_out),
        Arc::clone(&armed),
    ));
    trace!(timeout_ms = after.as_millis() as u64, "Armed derived cancellation");

    DerivedCancellation {
        token: Some(derived),
        timeout: Some(after),
        timed_out,
        armed,
        watcher: Some(watcher),
    }
}

async fn watch(
    caller: Option<CancellationToken>,
    derived: CancellationToken,
    after: Duration,
    timed_out: Arc<AtomicBool>,
    armed: Arc<Mutex<bool>>,
) {
    let caller_cancelled = async move {
        match caller {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = derived.cancelled() => {}
        _ = caller_cancelled => {
            let armed = armed.lock();
            if *armed {
                trace!("Caller cancelled; propagating to derived token");
                derived.cancel();
            }
        }
        _ = tokio::time::sleep(after) => {
            let armed = armed.lock();
            if *armed {
                trace!(timeout_ms = after.as_millis() as u64, "Derived cancellation timer fired");
                timed_out.store(true, Ordering::SeqCst);
                derived.cancel();
            }
        }
    }
}

impl DerivedCancellation {
    /// The effective token, if there is anything to observe
    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// True once the effective token has fired
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// True only if the token fired because of this combinator's own timer
    pub fn did_timeout(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// The timeout this combinator was armed with
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// True while the timer and caller listener are still attached
    pub fn is_armed(&self) -> bool {
        self.watcher.is_some()
    }

    /// Clear the timer and detach from the caller token. Safe to call more than once.
    ///
    /// The derived token itself stays valid and keeps whatever state it had.
    pub fn cleanup(&mut self) {
        *self.armed.lock() = false;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
            trace!("Derived cancellation cleaned up");
        }
    }
}

impl Drop for DerivedCancellation {
    fn drop(&mut self) {
        self.cleanup();
    }
}
