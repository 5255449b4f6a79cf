use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Pending { text: String, deadline: Instant },
}

/// Coalesces bursts of query edits into one commit after a quiet interval.
///
/// There is no timer thread: the event loop calls `poll` whenever it wakes up
/// and uses `time_until_due` to bound how long it sleeps. Restarting the timer
/// is just overwriting the deadline.
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    state: State,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Debouncer {
            interval,
            state: State::Idle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending { .. })
    }

    /// Stages `text` and (re)starts the quiet interval, dropping whatever was
    /// staged before.
    pub fn on_query_changed(&mut self, text: &str, now: Instant) {
        trace!("Staging query {text:?}");
        self.state = State::Pending {
            text: text.to_string(),
            deadline: now + self.interval,
        };
    }

    /// Returns the staged text once its deadline has passed and goes back to
    /// idle. Fires at most once per burst.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let due = matches!(&self.state, State::Pending { deadline, .. } if now >= *deadline);
        if !due {
            return None;
        }
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Pending { text, .. } => {
                trace!("Debounce expired, committing {text:?}");
                Some(text)
            }
            State::Idle => None,
        }
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            State::Pending { deadline, .. } => Some(deadline.saturating_duration_since(now)),
            State::Idle => None,
        }
    }
}
