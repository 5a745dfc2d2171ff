//! Response correlation.
//!
//! The wire protocol carries no request ids, so replies are matched to
//! callers by kind and sub-filter alone. The [`Router`] keeps outstanding
//! waits in registration order; each decoded response fulfills the first wait
//! whose [`Expectation`] accepts it, and no other.
//!
//! Two waits with an identical expectation are served first-registered
//! first. The device answers each request once, so the later wait will
//! usually run into its deadline.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use microbit_protocol::{Button, Response};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Identifier of a registered wait.
pub type WaitId = u64;

/// Cap on how far out a deadline is scheduled (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, clamped to [`FAR_FUTURE`] so huge timeouts cannot overflow.
fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now + timeout.min(FAR_FUTURE)
}

/// What a pending wait will accept.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// A `TEMP` reply.
    Temperature,
    /// A `pressed` event accepted by the filter, or a `BUTTON_TIMEOUT` for
    /// exactly this filter.
    ///
    /// A `BUTTON_TIMEOUT` for another filter is left alone, so a stale
    /// timeout for one button cannot end a concurrent wait on another. Hosts
    /// that end the wait on any `BUTTON_TIMEOUT` see the same results, since
    /// the firmware echoes the filter it waited on.
    Button(Button),
    /// A `STATUS` line, optionally only one whose message starts with `prefix`.
    Status {
        /// Required message prefix.
        prefix: Option<String>,
    },
}

impl Expectation {
    /// Check whether `response` satisfies this expectation.
    pub fn matches(&self, response: &Response) -> bool {
        match (self, response) {
            (Expectation::Temperature, Response::Temperature { .. }) => true,
            (Expectation::Button(filter), Response::ButtonPress { button, .. }) => {
                response.is_press() && filter.accepts(*button)
            }
            (Expectation::Button(filter), Response::ButtonTimeout { waited_for, .. }) => {
                waited_for == filter
            }
            (Expectation::Status { prefix }, Response::Status { message, .. }) => prefix
                .as_deref()
                .map_or(true, |prefix| message.starts_with(prefix)),
            _ => false,
        }
    }
}

/// Why a wait ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline passed first.
    TimedOut,
    /// The router was closed (reader loop ended).
    Closed,
}

/// Result of routing one response.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The response completed this wait.
    Fulfilled(WaitId),
    /// No wait accepted the response.
    Unmatched(Response),
}

struct PendingWait {
    id: WaitId,
    expectation: Expectation,
    slot: oneshot::Sender<Response>,
    created: Instant,
}

#[derive(Default)]
struct RouterState {
    next_id: WaitId,
    pending: Vec<PendingWait>,
    closed: bool,
}

/// The set of outstanding waits.
#[derive(Default)]
pub struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Arc<Router> {
        Arc::new(Router::default())
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a wait that expires `timeout` from now.
    ///
    /// Timeouts beyond the far-future cap are clamped to it.
    ///
    /// Register before sending the command the wait belongs to, so a fast
    /// reply cannot slip past.
    pub fn register(self: &Arc<Self>, expectation: Expectation, timeout: Duration) -> WaitHandle {
        let (slot, rx) = oneshot::channel();
        let now = Instant::now();
        let mut state = self.lock();

        state.next_id += 1;
        let id = state.next_id;

        if state.closed {
            // Dropping the sender resolves the handle as closed.
            drop(slot);
        } else {
            if state.pending.iter().any(|w| w.expectation == expectation) {
                warn!(
                    ?expectation,
                    "overlapping wait with identical expectation; the earlier wait is served first"
                );
            }
            state.pending.push(PendingWait {
                id,
                expectation: expectation.clone(),
                slot,
                created: now,
            });
            trace!(id, ?expectation, ?timeout, "registered wait");
        }

        WaitHandle {
            id,
            router: Arc::clone(self),
            rx,
            deadline: deadline_after(now, timeout),
        }
    }

    /// Route a response to the first wait that accepts it.
    pub fn dispatch(&self, response: Response) -> DispatchOutcome {
        let mut state = self.lock();
        let mut response = response;

        while let Some(index) = state
            .pending
            .iter()
            .position(|w| w.expectation.matches(&response))
        {
            let wait = state.pending.remove(index);
            match wait.slot.send(response) {
                Ok(()) => {
                    trace!(
                        id = wait.id,
                        elapsed = ?wait.created.elapsed(),
                        "fulfilled wait"
                    );
                    return DispatchOutcome::Fulfilled(wait.id);
                }
                // The waiter went away between its deadline and removal.
                Err(returned) => response = returned,
            }
        }

        DispatchOutcome::Unmatched(response)
    }

    /// Remove a wait. No-op if it is already resolved.
    fn remove(&self, id: WaitId) -> bool {
        let mut state = self.lock();
        let before = state.pending.len();
        state.pending.retain(|w| w.id != id);
        before != state.pending.len()
    }

    /// Resolve every outstanding wait as closed and refuse new ones.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            let dropped = state.pending.len();
            state.pending.clear();
            debug!(dropped, "router closed");
        }
    }

    /// Check whether the router has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of outstanding waits.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Router")
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A caller's handle on one registered wait.
///
/// Dropping the handle withdraws the wait.
pub struct WaitHandle {
    id: WaitId,
    router: Arc<Router>,
    rx: oneshot::Receiver<Response>,
    deadline: Instant,
}

impl WaitHandle {
    /// Identifier of the wait.
    pub fn id(&self) -> WaitId {
        self.id
    }

    /// Suspend until the wait is fulfilled, its deadline passes, or the
    /// router closes.
    pub async fn wait(mut self) -> Result<Response, WaitError> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(_) => {
                self.router.remove(self.id);
                // A response may have landed between the deadline and removal.
                match self.rx.try_recv() {
                    Ok(response) => Ok(response),
                    Err(_) => {
                        debug!(id = self.id, "wait timed out");
                        Err(WaitError::TimedOut)
                    }
                }
            }
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        if self.router.remove(self.id) {
            trace!(id = self.id, "withdrew wait");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(celsius: i32) -> Response {
        Response::Temperature {
            celsius,
            timestamp_ms: 1,
        }
    }

    fn press(button: Button) -> Response {
        Response::ButtonPress {
            button,
            action: "pressed".to_string(),
            timestamp_ms: 7,
        }
    }

    #[test]
    fn test_expectation_matching() {
        assert!(Expectation::Temperature.matches(&temp(20)));
        assert!(Expectation::Button(Button::Any).matches(&press(Button::B)));
        assert!(Expectation::Button(Button::A).matches(&press(Button::A)));
        assert!(!Expectation::Button(Button::A).matches(&press(Button::B)));

        let released = Response::ButtonPress {
            button: Button::A,
            action: "released".to_string(),
            timestamp_ms: 7,
        };
        assert!(!Expectation::Button(Button::A).matches(&released));

        let timeout_any = Response::ButtonTimeout {
            waited_for: Button::Any,
            timeout_secs: 5.0,
        };
        assert!(Expectation::Button(Button::Any).matches(&timeout_any));
        assert!(!Expectation::Button(Button::A).matches(&timeout_any));

        let ready = Response::Status {
            message: "ready".to_string(),
            timestamp_ms: 0,
        };
        assert!(Expectation::Status { prefix: None }.matches(&ready));
        assert!(Expectation::Status {
            prefix: Some("ready".to_string())
        }
        .matches(&ready));
        assert!(!Expectation::Status {
            prefix: Some("displayed".to_string())
        }
        .matches(&ready));
        assert!(!Expectation::Temperature.matches(&ready));
    }

    #[tokio::test]
    async fn test_first_registered_wins() {
        let router = Router::new();
        let first = router.register(Expectation::Temperature, Duration::from_secs(5));
        let second = router.register(Expectation::Temperature, Duration::from_secs(5));

        assert_eq!(router.dispatch(temp(21)), DispatchOutcome::Fulfilled(first.id()));
        assert_eq!(router.pending_count(), 1);
        assert_eq!(first.wait().await, Ok(temp(21)));

        assert_eq!(router.dispatch(temp(22)), DispatchOutcome::Fulfilled(second.id()));
        assert_eq!(second.wait().await, Ok(temp(22)));
    }

    #[tokio::test]
    async fn test_unmatched_response_is_returned() {
        let router = Router::new();
        let _wait = router.register(Expectation::Temperature, Duration::from_secs(5));

        let status = Response::Status {
            message: "displayed:hi".to_string(),
            timestamp_ms: 3,
        };
        assert_eq!(
            router.dispatch(status.clone()),
            DispatchOutcome::Unmatched(status)
        );
        assert_eq!(router.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_withdraws_wait() {
        let router = Router::new();
        let handle = router.register(Expectation::Temperature, Duration::from_secs(5));
        assert_eq!(router.pending_count(), 1);

        drop(handle);
        assert_eq!(router.pending_count(), 0);
        assert!(matches!(router.dispatch(temp(1)), DispatchOutcome::Unmatched(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_once() {
        let router = Router::new();
        let handle = router.register(Expectation::Button(Button::A), Duration::from_secs(2));

        assert_eq!(handle.wait().await, Err(WaitError::TimedOut));
        assert_eq!(router.pending_count(), 0);
        // A late reply is a no-op against the finished wait.
        assert!(matches!(
            router.dispatch(press(Button::A)),
            DispatchOutcome::Unmatched(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_is_clamped() {
        let router = Router::new();
        let handle = router.register(Expectation::Temperature, Duration::MAX);
        assert_eq!(router.pending_count(), 1);

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(router.dispatch(temp(19)), DispatchOutcome::Fulfilled(handle.id()));
        assert_eq!(handle.wait().await, Ok(temp(19)));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(2)), now + Duration::from_secs(2));
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
        assert_eq!(
            deadline_after(now, Duration::from_secs_f64(1e19)),
            now + FAR_FUTURE
        );
    }

    #[tokio::test]
    async fn test_close_resolves_waiters() {
        let router = Router::new();
        let handle = router.register(Expectation::Temperature, Duration::from_secs(5));

        router.close();
        router.close();

        assert!(router.is_closed());
        assert_eq!(handle.wait().await, Err(WaitError::Closed));

        let late = router.register(Expectation::Temperature, Duration::from_secs(5));
        assert_eq!(router.pending_count(), 0);
        assert_eq!(late.wait().await, Err(WaitError::Closed));
    }
}
