//! Sync client: poll cycle, client operations and poller task.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::health::{ConnectionHealth, ConnectionState, HealthUpdate};
use crate::transport::SyncTransport;
use dosesync_protocol::DocumentKind;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Receives what the poller learns.
///
/// Callbacks run on the thread that performed the poll, never while the
/// client holds an internal lock.
pub trait SyncApplier: Send + Sync {
    /// Takes a changed tracker document and its modification time.
    fn apply_tracker(&self, document: Value, mtime: f64) -> SyncResult<()>;

    /// Runs after a successful apply.
    fn refresh(&self) {}

    /// Observes connection state transitions.
    fn connection_changed(&self, _previous: ConnectionState, _current: ConnectionState) {}

    /// Ends the session after a sustained disconnect. Called once per
    /// disconnect episode.
    fn teardown(&self, error: &SyncError);
}

/// Result of one call to [`SyncClient::poll`].
#[derive(Debug)]
pub enum PollOutcome {
    /// Another poll was in flight, or the client is closing.
    Skipped,
    /// The tracker has not changed since the last poll.
    Unchanged,
    /// A changed tracker was fetched and applied.
    Applied {
        /// Modification time of the applied document.
        mtime: f64,
    },
    /// The poll failed.
    Failed(SyncError),
}

/// Statistics about polling.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Polls that reached the network.
    pub polls_attempted: u64,
    /// Polls dropped by the in-flight guard or while closing.
    pub polls_skipped: u64,
    /// Polls that found no change.
    pub polls_unchanged: u64,
    /// Polls that applied a new tracker.
    pub polls_applied: u64,
    /// Polls that failed.
    pub polls_failed: u64,
    /// Last successful poll.
    pub last_success: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Keeps a local copy of the tracker in step with a data server.
pub struct SyncClient<T: SyncTransport, A: SyncApplier> {
    config: SyncConfig,
    transport: T,
    applier: A,
    health: Mutex<ConnectionHealth>,
    last_mtime: Mutex<Option<f64>>,
    pushed: Mutex<Option<Value>>,
    in_flight: AtomicBool,
    stats: RwLock<SyncStats>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Probe {
    Unchanged,
    Changed { document: Value, mtime: f64 },
}

impl<T: SyncTransport, A: SyncApplier> SyncClient<T, A> {
    /// Creates a client. Nothing is sent until the first poll.
    pub fn new(config: SyncConfig, transport: T, applier: A) -> Self {
        let health = ConnectionHealth::new(&config);
        Self {
            config,
            transport,
            applier,
            health: Mutex::new(health),
            last_mtime: Mutex::new(None),
            pushed: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the applier.
    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// Returns the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.health.lock().state()
    }

    /// Returns a snapshot of the connection-health state machine.
    pub fn health(&self) -> ConnectionHealth {
        self.health.lock().clone()
    }

    /// Returns true after teardown has fired.
    pub fn is_closing(&self) -> bool {
        self.health.lock().is_closing()
    }

    /// Returns the tracker modification time last seen, if any.
    pub fn last_seen_mtime(&self) -> Option<f64> {
        *self.last_mtime.lock()
    }

    /// Returns polling statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Starts a new session: clears the health state and the last-seen
    /// modification time so the next poll fetches the tracker.
    pub fn reset(&self) {
        self.health.lock().reset();
        *self.last_mtime.lock() = None;
        *self.pushed.lock() = None;
    }

    /// Runs one poll cycle.
    ///
    /// Probes `tracker-meta`, and only when the modification time differs
    /// from the last one seen (or nothing was seen yet) fetches the tracker
    /// and hands it to the applier. A fetched tracker equal to the one this
    /// client last pushed is recorded as seen without being applied. Returns [`PollOutcome::Skipped`] without
    /// touching the network if a poll is already running or the client is
    /// closing.
    pub fn poll(&self) -> PollOutcome {
        if self.is_closing() {
            self.stats.write().polls_skipped += 1;
            return PollOutcome::Skipped;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("poll already in flight, skipping");
            self.stats.write().polls_skipped += 1;
            return PollOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);
        self.stats.write().polls_attempted += 1;

        match self.probe() {
            Ok(probe) => {
                let update = self.health.lock().record_success();
                self.notify(update, None);
                self.stats.write().last_success = Some(Instant::now());
                match probe {
                    Probe::Unchanged => {
                        self.stats.write().polls_unchanged += 1;
                        PollOutcome::Unchanged
                    }
                    Probe::Changed { document, mtime } => self.deliver(document, mtime),
                }
            }
            Err(err) => {
                debug!(error = %err, "poll failed");
                let update = self.health.lock().record_failure();
                self.notify(update, Some(&err));
                self.record_error(&err);
                PollOutcome::Failed(err)
            }
        }
    }

    fn probe(&self) -> SyncResult<Probe> {
        let mtime = self.transport.tracker_meta()?;
        if *self.last_mtime.lock() == Some(mtime) {
            return Ok(Probe::Unchanged);
        }
        let document = self.transport.fetch(DocumentKind::Tracker)?;
        if self.pushed.lock().take().as_ref() == Some(&document) {
            debug!(mtime, "remote tracker is our own push");
            *self.last_mtime.lock() = Some(mtime);
            return Ok(Probe::Unchanged);
        }
        Ok(Probe::Changed { document, mtime })
    }

    fn deliver(&self, document: Value, mtime: f64) -> PollOutcome {
        match self.applier.apply_tracker(document, mtime) {
            Ok(()) => {
                *self.last_mtime.lock() = Some(mtime);
                self.applier.refresh();
                self.stats.write().polls_applied += 1;
                debug!(mtime, "applied remote tracker");
                PollOutcome::Applied { mtime }
            }
            Err(err) => {
                // last_mtime stays put so the next poll fetches again.
                warn!(error = %err, "applier rejected remote tracker");
                self.record_error(&err);
                PollOutcome::Failed(err)
            }
        }
    }

    fn notify(&self, update: HealthUpdate, error: Option<&SyncError>) {
        if update.changed() {
            info!(from = %update.previous, to = %update.current, "connection state changed");
            self.applier
                .connection_changed(update.previous, update.current);
        }
        if update.teardown {
            if let Some(err) = error {
                warn!(error = %err, "host unreachable for too long, tearing down session");
                self.applier.teardown(err);
            }
        }
    }

    fn record_error(&self, err: &SyncError) {
        let mut stats = self.stats.write();
        stats.polls_failed += 1;
        stats.last_error = Some(err.to_string());
    }

    /// Liveness probe. Returns the server time in epoch seconds.
    ///
    /// Client operations do not drive the connection state; only polls do.
    pub fn ping(&self) -> SyncResult<f64> {
        self.transport.ping()
    }

    /// Fetches the tracker document.
    pub fn fetch_tracker(&self) -> SyncResult<Value> {
        self.transport.fetch(DocumentKind::Tracker)
    }

    /// Fetches the library document.
    pub fn fetch_library(&self) -> SyncResult<Value> {
        self.transport.fetch(DocumentKind::Library)
    }

    /// Replaces the tracker on the server.
    ///
    /// The pushed document is remembered. If the next tracker fetched is
    /// still equal to it, the poll records its modification time without
    /// applying it back. Any other content, including a write by another
    /// client that landed right after this one, is applied as usual.
    pub fn push_tracker(&self, document: &Value) -> SyncResult<()> {
        DocumentKind::Tracker.validate(document)?;
        self.transport.push(DocumentKind::Tracker, document)?;
        *self.pushed.lock() = Some(document.clone());
        Ok(())
    }

    /// Replaces the library on the server.
    pub fn push_library(&self, document: &Value) -> SyncResult<()> {
        DocumentKind::Library.validate(document)?;
        self.transport.push(DocumentKind::Library, document)
    }
}

/// Handle to a running poller task.
pub struct PollerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Returns true once the poller has ended, e.g. after teardown.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the poller and waits for a running poll to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }

    /// Waits for the poller to end on its own.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl<T, A> SyncClient<T, A>
where
    T: SyncTransport + 'static,
    A: SyncApplier + 'static,
{
    /// Polls every `poll_interval` on the tokio runtime.
    ///
    /// Each poll runs on the blocking pool. Ticks missed during a slow poll
    /// are dropped. The task ends after teardown or on
    /// [`PollerHandle::stop`].
    pub fn spawn_poller(self: &Arc<Self>) -> PollerHandle {
        let client = Arc::clone(self);
        let period = self.config.poll_interval.max(Duration::from_millis(10));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(url = %client.config.base_url, ?period, "poller started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let worker = Arc::clone(&client);
                let mut poll = tokio::task::spawn_blocking(move || worker.poll());
                let stopping = tokio::select! {
                    _ = &mut stop_rx => true,
                    result = &mut poll => {
                        if let Err(err) = result {
                            warn!(error = %err, "poll task failed");
                        }
                        false
                    }
                };
                if stopping {
                    // The running poll may still apply; let it land first.
                    if let Err(err) = poll.await {
                        warn!(error = %err, "poll task failed");
                    }
                    break;
                }

                if client.is_closing() {
                    break;
                }
            }
            info!("poller stopped");
        });

        PollerHandle { stop_tx, task }
    }
}

/// An in-memory applier for testing.
#[derive(Debug, Default)]
pub struct MemoryApplier {
    tracker: Mutex<Option<(Value, f64)>>,
    applied: Mutex<u64>,
    refreshes: Mutex<u64>,
    transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    teardowns: Mutex<Vec<String>>,
    reject: AtomicBool,
}

impl MemoryApplier {
    /// Creates an empty applier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `apply_tracker` fail while set.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Returns the last applied tracker and its modification time.
    pub fn tracker(&self) -> Option<(Value, f64)> {
        self.tracker.lock().clone()
    }

    /// Returns the number of applied trackers.
    pub fn applied(&self) -> u64 {
        *self.applied.lock()
    }

    /// Returns the number of refreshes.
    pub fn refreshes(&self) -> u64 {
        *self.refreshes.lock()
    }

    /// Returns all observed state transitions.
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions.lock().clone()
    }

    /// Returns the errors passed to `teardown`.
    pub fn teardowns(&self) -> Vec<String> {
        self.teardowns.lock().clone()
    }
}

impl SyncApplier for MemoryApplier {
    fn apply_tracker(&self, document: Value, mtime: f64) -> SyncResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SyncError::Apply("rejected".into()));
        }
        *self.tracker.lock() = Some((document, mtime));
        *self.applied.lock() += 1;
        Ok(())
    }

    fn refresh(&self) {
        *self.refreshes.lock() += 1;
    }

    fn connection_changed(&self, previous: ConnectionState, current: ConnectionState) {
        self.transitions.lock().push((previous, current));
    }

    fn teardown(&self, error: &SyncError) {
        self.teardowns.lock().push(error.to_string());
    }
}

impl<A: SyncApplier + ?Sized> SyncApplier for Arc<A> {
    fn apply_tracker(&self, document: Value, mtime: f64) -> SyncResult<()> {
        (**self).apply_tracker(document, mtime)
    }

    fn refresh(&self) {
        (**self).refresh()
    }

    fn connection_changed(&self, previous: ConnectionState, current: ConnectionState) {
        (**self).connection_changed(previous, current)
    }

    fn teardown(&self, error: &SyncError) {
        (**self).teardown(error)
    }
}
