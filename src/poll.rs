//! Bounded polling for remote operational state.
//!
//! Many UpCloud objects are created asynchronously: the API returns at once
//! and the object then moves through states such as `pending` before it is
//! `running`. Adapters block the current operation on [`wait_for_state`]
//! until the desired state is reached, the retry ceiling is exhausted, or the
//! provider is stopped.
//!
//! Polling uses a fixed interval. Every call starts a fresh attempt count.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// How many times to poll and how long to sleep between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of fetches before giving up.
    pub max_retries: u32,
    /// Sleep between two fetches.
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a policy.
    pub const fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    /// Replace the interval, keeping the retry ceiling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// An object that reports an operational state.
pub trait Stateful {
    /// The state type, usually a small enum mirroring the API's values.
    type State: PartialEq + fmt::Display;

    /// The state reported by the API for this snapshot.
    fn current_state(&self) -> Self::State;
}

/// Owner side of the provider's stop signal.
///
/// Calling [`StopSignal::stop`] cancels every [`Cancellation`] handed out by
/// [`StopSignal::cancellation`], including ones already waiting.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// Create a signal in the running (not stopped) state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Cancel all outstanding and future cancellations.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`StopSignal::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// A cancellation handle tied to this signal.
    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a [`StopSignal`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if the owning [`StopSignal`] was dropped without stopping.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

fn cancelled_error(target: &str) -> ProviderError {
    ProviderError::Cancelled(format!("stopped while waiting for {}", target))
}

/// Poll `fetch` until the returned object reports `desired`.
///
/// - an error from `fetch` is returned immediately
/// - on success with the desired state the fetched object is returned
///   without sleeping
/// - after `policy.max_retries` fetches without success,
///   [`ProviderError::MaxRetriesReached`] is returned
/// - cancellation is observed before each fetch, during the fetch and during
///   the sleep
///
/// `target` names the polled object in logs and errors.
pub async fn wait_for_state<T, F, Fut>(
    cancel: &Cancellation,
    policy: PollPolicy,
    target: &str,
    desired: T::State,
    mut fetch: F,
) -> Result<T, ProviderError>
where
    T: Stateful,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut last_state: Option<String> = None;

    for attempt in 1..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(cancelled_error(target));
        }

        let current = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_error(target)),
            result = fetch() => result?,
        };

        let state = current.current_state();
        if state == desired {
            debug!(target, attempt, state = %state, "reached desired state");
            return Ok(current);
        }

        debug!(target, attempt, state = %state, desired = %desired, "waiting for state");
        last_state = Some(state.to_string());

        if attempt < policy.max_retries {
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled_error(target)),
                _ = tokio::time::sleep(policy.interval) => {},
            }
        }
    }

    Err(ProviderError::MaxRetriesReached {
        target: target.to_string(),
        desired: desired.to_string(),
        last_state: last_state.unwrap_or_else(|| "unknown".to_string()),
        attempts: policy.max_retries,
    })
}

/// Poll `fetch` until it reports [`ProviderError::NotFound`].
///
/// Used after a delete request to block until the object is really gone.
pub async fn wait_until_deleted<T, F, Fut>(
    cancel: &Cancellation,
    policy: PollPolicy,
    target: &str,
    mut fetch: F,
) -> Result<(), ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    for attempt in 1..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(cancelled_error(target));
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_error(target)),
            result = fetch() => result,
        };

        match result {
            Err(e) if e.is_not_found() => {
                debug!(target, attempt, "object deleted");
                return Ok(());
            },
            Err(e) => return Err(e),
            Ok(_) => debug!(target, attempt, "waiting for deletion"),
        }

        if attempt < policy.max_retries {
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled_error(target)),
                _ = tokio::time::sleep(policy.interval) => {},
            }
        }
    }

    Err(ProviderError::MaxRetriesReached {
        target: target.to_string(),
        desired: "deleted".to_string(),
        last_state: "present".to_string(),
        attempts: policy.max_retries,
    })
}

/// Run `op`, retrying only while it fails with an authentication error.
///
/// Credentials created moments before the provider runs can take a short
/// while to become valid, so the initial login check tolerates a few
/// `PermissionDenied` answers. Any other error is returned at once.
pub async fn retry_on_auth_failure<T, F, Fut>(
    policy: PollPolicy,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_auth_failure() && attempt < attempts => {
                warn!(attempt, error = %e, "authentication failed, retrying");
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
