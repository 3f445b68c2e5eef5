//! Connection-health state machine.

use crate::config::SyncConfig;
use std::fmt;
use std::time::{Duration, Instant};

/// Health of the link to the data server, as seen by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The last poll succeeded.
    Connected,
    /// Some recent polls failed, fewer than the configured maximum.
    Interrupted,
    /// Too many consecutive failures, or the failure streak outlasted the
    /// disconnect timeout.
    Disconnected,
}

impl ConnectionState {
    /// Returns the lowercase state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Interrupted => "interrupted",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a recorded poll result did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    /// State before the poll.
    pub previous: ConnectionState,
    /// State after the poll.
    pub current: ConnectionState,
    /// True exactly once per disconnect episode, when the session must be
    /// torn down.
    pub teardown: bool,
}

impl HealthUpdate {
    /// Returns true if the connection state changed.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Tracks consecutive poll failures and decides when to tear down.
///
/// Once teardown has fired the machine is closing: further results are
/// ignored until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    max_missed_polls: u32,
    disconnect_timeout: Duration,
    handshake_grace: Duration,
    state: ConnectionState,
    missed_polls: u32,
    first_failure: Option<Instant>,
    ever_connected: bool,
    closing: bool,
}

impl ConnectionHealth {
    /// Creates a state machine for a client that has not yet connected.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            max_missed_polls: config.max_missed_polls.max(1),
            disconnect_timeout: config.disconnect_timeout,
            handshake_grace: config.handshake_grace,
            state: ConnectionState::Connected,
            missed_polls: 0,
            first_failure: None,
            ever_connected: false,
            closing: false,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the number of consecutive failed polls.
    pub fn missed_polls(&self) -> u32 {
        self.missed_polls
    }

    /// Returns when the current failure streak started.
    pub fn first_failure(&self) -> Option<Instant> {
        self.first_failure
    }

    /// Returns true once any poll has succeeded.
    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    /// Returns true after teardown has fired.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Failure streak tolerated before teardown.
    ///
    /// A client that never connected also gets the handshake grace, so a
    /// slow first contact does not end the session before it started.
    pub fn teardown_after(&self) -> Duration {
        if self.ever_connected {
            self.disconnect_timeout
        } else {
            self.disconnect_timeout.saturating_add(self.handshake_grace)
        }
    }

    /// Records a successful poll.
    pub fn record_success(&mut self) -> HealthUpdate {
        let previous = self.state;
        if !self.closing {
            self.missed_polls = 0;
            self.first_failure = None;
            self.ever_connected = true;
            self.state = ConnectionState::Connected;
        }
        self.update(previous, false)
    }

    /// Records a failed poll now.
    pub fn record_failure(&mut self) -> HealthUpdate {
        self.record_failure_at(Instant::now())
    }

    /// Records a failed poll at `now`.
    pub fn record_failure_at(&mut self, now: Instant) -> HealthUpdate {
        let previous = self.state;
        if self.closing {
            return self.update(previous, false);
        }

        self.missed_polls = self.missed_polls.saturating_add(1);
        let first = *self.first_failure.get_or_insert(now);

        self.state = if self.missed_polls >= self.max_missed_polls {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Interrupted
        };

        let teardown = now.saturating_duration_since(first) > self.teardown_after();
        if teardown {
            self.closing = true;
            self.state = ConnectionState::Disconnected;
        }
        self.update(previous, teardown)
    }

    /// Returns to the initial, never-connected state.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Connected;
        self.missed_polls = 0;
        self.first_failure = None;
        self.ever_connected = false;
        self.closing = false;
    }

    fn update(&self, previous: ConnectionState, teardown: bool) -> HealthUpdate {
        HealthUpdate {
            previous,
            current: self.state,
            teardown,
        }
    }
}
