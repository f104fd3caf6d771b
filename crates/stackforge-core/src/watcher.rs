//! Status watcher: poll a stack until it leaves a set of transitional
//! statuses, surfacing its new events along the way.
//!
//! States: initializing (first describe) -> polling -> terminal or gone.
//! Polling is a fixed interval with no backoff. Every connector failure
//! other than "stack absent" is fatal.

use std::fmt;
use std::time::{Duration, Instant};

use stackforge_connector::{ConnectorError, RemoteStack, StackConnector, StackEvent};
pub use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};

/// Status reported when the stack disappears while being watched.
pub const GONE: &str = "GONE";

const PAUSE_SLICE: Duration = Duration::from_millis(100);

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    /// Wall-clock budget for one watch; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
    /// Number of past events surfaced before polling starts.
    pub history_window: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: None,
            history_window: 5,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────

/// How a watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// First observed status outside the continue set.
    Settled(String),
    /// The stack no longer exists.
    Gone,
}

impl WatchOutcome {
    pub fn status(&self) -> &str {
        match self {
            Self::Settled(status) => status,
            Self::Gone => GONE,
        }
    }

    pub fn is(&self, status: &str) -> bool {
        matches!(self, Self::Settled(s) if s == status)
    }
}

impl fmt::Display for WatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

// ─── Event cursor ────────────────────────────────────────────────────

/// The newest event already surfaced, identified by event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCursor {
    event_id: String,
}

impl EventCursor {
    pub fn at(event: &StackEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Events newer than the cursor in a newest-first history: everything
    /// before the cursor's position, or the whole history when the cursor
    /// event is no longer in it.
    pub fn unseen<'e>(&self, events: &'e [StackEvent]) -> &'e [StackEvent] {
        match events.iter().position(|e| e.event_id == self.event_id) {
            Some(pos) => &events[..pos],
            None => events,
        }
    }
}

// ─── Observer ────────────────────────────────────────────────────────

/// Receives what the watcher sees. Injected so callers choose where
/// progress goes.
pub trait WatchObserver: Send + Sync {
    /// Recent history before polling starts, oldest first.
    fn on_history(&self, stack: &str, events: &[StackEvent]);

    /// One new event, delivered oldest first.
    fn on_event(&self, stack: &str, event: &StackEvent);
}

impl<T: WatchObserver + ?Sized> WatchObserver for &T {
    fn on_history(&self, stack: &str, events: &[StackEvent]) {
        (**self).on_history(stack, events);
    }

    fn on_event(&self, stack: &str, event: &StackEvent) {
        (**self).on_event(stack, event);
    }
}

/// Writes every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

fn format_event(event: &StackEvent) -> String {
    format!(
        "{} {} {} {} {} {}",
        event.timestamp.to_rfc3339(),
        event.resource_status,
        event.resource_type,
        event.logical_resource_id,
        event.physical_resource_id.as_deref().unwrap_or("-"),
        event.status_reason.as_deref().unwrap_or("-"),
    )
}

impl WatchObserver for TracingObserver {
    fn on_history(&self, stack: &str, events: &[StackEvent]) {
        tracing::info!("last {} events for {stack}", events.len());
        for event in events {
            tracing::info!("{}", format_event(event));
        }
        tracing::info!("new events:");
    }

    fn on_event(&self, _stack: &str, event: &StackEvent) {
        tracing::info!("{}", format_event(event));
    }
}

// ─── Pacing ──────────────────────────────────────────────────────────

/// Clock and sleep used by the poll loop.
pub trait Pacer: Send + Sync {
    fn now(&self) -> Instant;

    /// Wait for `interval`. Returns false when `cancel` fired first.
    fn pause(&self, interval: Duration, cancel: &CancellationToken) -> bool;
}

/// Real clock, blocking sleep in short slices so cancellation is noticed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn pause(&self, interval: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return true;
            }
            std::thread::sleep(left.min(PAUSE_SLICE));
        }
    }
}

// ─── Watcher ─────────────────────────────────────────────────────────

pub struct StackWatcher<'a, C: StackConnector> {
    connector: &'a C,
    config: &'a WatchConfig,
    observer: &'a dyn WatchObserver,
    pacer: &'a dyn Pacer,
    cancel: &'a CancellationToken,
}

impl<'a, C: StackConnector> StackWatcher<'a, C> {
    pub fn new(
        connector: &'a C,
        config: &'a WatchConfig,
        observer: &'a dyn WatchObserver,
        pacer: &'a dyn Pacer,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            connector,
            config,
            observer,
            pacer,
            cancel,
        }
    }

    /// Poll `stack` while its status is one of `continue_statuses`.
    ///
    /// Returns the first status outside the set, or `Gone` as soon as any
    /// fetch reports the stack absent. Sleeps once after every status poll.
    pub fn watch(&self, stack: &str, continue_statuses: &[&str]) -> Result<WatchOutcome> {
        let started = self.pacer.now();

        let Some(remote) = self.describe(stack)? else {
            return Ok(WatchOutcome::Gone);
        };
        let Some(history) = absent_as_none(self.connector.describe_events(stack))? else {
            return Ok(WatchOutcome::Gone);
        };

        let window = history.len().min(self.config.history_window);
        let recent: Vec<StackEvent> = history[..window].iter().rev().cloned().collect();
        self.observer.on_history(stack, &recent);
        let mut cursor = history.first().map(EventCursor::at);
        let mut status = remote.status;

        while continue_statuses.contains(&status.as_str()) {
            if self.cancel.is_cancelled() {
                return Err(ForgeError::WatchCancelled {
                    stack: stack.to_string(),
                    status,
                });
            }
            if let Some(max_wait) = self.config.max_wait {
                let elapsed = self.pacer.now().saturating_duration_since(started);
                if elapsed >= max_wait {
                    return Err(ForgeError::WatchTimeout {
                        stack: stack.to_string(),
                        status,
                        elapsed,
                    });
                }
            }

            let Some(events) = absent_as_none(self.connector.describe_events(stack))? else {
                return Ok(WatchOutcome::Gone);
            };
            let unseen = match &cursor {
                Some(cursor) => cursor.unseen(&events),
                None => &events[..],
            };
            if let Some(newest) = unseen.first() {
                for event in unseen.iter().rev() {
                    self.observer.on_event(stack, event);
                }
                cursor = Some(EventCursor::at(newest));
            }

            let Some(remote) = self.describe(stack)? else {
                return Ok(WatchOutcome::Gone);
            };
            status = remote.status;
            tracing::debug!("{stack} is {status}");
            // A cancelled pause is reported at the top of the loop, and only
            // if the stack is still transitional.
            self.pacer.pause(self.next_pause(started), self.cancel);
        }

        Ok(WatchOutcome::Settled(status))
    }

    /// The poll interval, cut short so no pause runs past `max_wait`.
    fn next_pause(&self, started: Instant) -> Duration {
        let interval = self.config.poll_interval;
        match self.config.max_wait {
            Some(max_wait) => {
                let elapsed = self.pacer.now().saturating_duration_since(started);
                interval.min(max_wait.saturating_sub(elapsed))
            }
            None => interval,
        }
    }

    fn describe(&self, stack: &str) -> Result<Option<RemoteStack>> {
        absent_as_none(self.connector.describe_stack(stack))
    }
}

fn absent_as_none<T>(result: std::result::Result<T, ConnectorError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
