//! Access control for the data server.
//!
//! Every request is gated twice before it reaches the store:
//!
//! 1. [`authorize`] compares the supplied access key with the configured
//!    one (no key configured means open mode)
//! 2. [`AccessController::admit`] charges the caller's request budget for
//!    the current window
//!
//! Denials are written to the log through [`AccessController::audit`],
//! which emits at most `audit_burst` lines per caller per audit window.
//! All counters are process-local and owned by the controller instance.

use dosesync_protocol::ErrorCode;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::warn;

/// Caller tables are swept of expired windows once they grow past this.
const PRUNE_THRESHOLD: usize = 1024;

/// Access control configuration.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Shared secret; `None` disables authentication.
    pub access_key: Option<String>,
    /// Accepted requests per caller per window (0 = unlimited).
    pub rate_limit: u32,
    /// Length of the request budget window.
    pub rate_window: Duration,
    /// Audit lines per caller per audit window.
    pub audit_burst: u32,
    /// Length of the audit window.
    pub audit_window: Duration,
}

impl AccessConfig {
    /// Creates an open-mode configuration with default limits.
    pub fn new() -> Self {
        Self {
            access_key: None,
            rate_limit: 120,
            rate_window: Duration::from_secs(60),
            audit_burst: 5,
            audit_window: Duration::from_secs(60),
        }
    }

    /// Requires the given access key. An empty key keeps open mode.
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.access_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Sets the request budget per window.
    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    /// Sets the audit line budget per window.
    pub fn with_audit_limit(mut self, burst: u32, window: Duration) -> Self {
        self.audit_burst = burst;
        self.audit_window = window;
        self
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks a supplied access key against the configured one.
///
/// An absent or empty configured key authorizes everything. Otherwise the
/// supplied key must match exactly. Keys are compared through their SHA-256
/// digests so the comparison time does not depend on the matching prefix.
pub fn authorize(provided: Option<&str>, configured: Option<&str>) -> bool {
    let configured = match configured {
        None | Some("") => return true,
        Some(key) => key,
    };
    match provided {
        Some(provided) => {
            Sha256::digest(provided.as_bytes()) == Sha256::digest(configured.as_bytes())
        }
        None => false,
    }
}

/// Counter for one caller within one rolling window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
    /// Denied charges in this window (audit only).
    overflow: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
            overflow: 0,
        }
    }

    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }

    /// Rolls the window if it elapsed, then charges one unit.
    ///
    /// Returns true while the count stays within `quota`.
    fn charge(&mut self, now: Instant, length: Duration, quota: u32) -> bool {
        if self.expired(now, length) {
            *self = Window::new(now);
        }
        self.count = self.count.saturating_add(1);
        self.count <= quota
    }
}

/// Emitted and suppressed audit lines for one denial kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    /// Lines written to the log.
    pub emitted: u64,
    /// Denials that were not logged because the caller's budget was spent.
    pub suppressed: u64,
}

/// Gate in front of the document store.
///
/// Holds the per-caller request budgets and audit budgets. Each table has
/// its own lock; neither is shared with the store.
#[derive(Debug)]
pub struct AccessController {
    config: AccessConfig,
    budgets: Mutex<CallerTable>,
    audit_budgets: Mutex<CallerTable>,
    audit_stats: Mutex<HashMap<ErrorCode, AuditStats>>,
}

impl AccessController {
    /// Creates a controller with empty counters.
    pub fn new(config: AccessConfig) -> Self {
        Self {
            config,
            budgets: Mutex::new(CallerTable::new()),
            audit_budgets: Mutex::new(CallerTable::new()),
            audit_stats: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Returns true if an access key is required.
    pub fn requires_key(&self) -> bool {
        self.config.access_key.is_some()
    }

    /// Checks a supplied access key.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        authorize(provided, self.config.access_key.as_deref())
    }

    /// Charges one request to `caller`'s budget.
    ///
    /// Returns false once the caller exceeded its quota in the current window.
    pub fn admit(&self, caller: IpAddr) -> bool {
        self.admit_at(caller, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, caller: IpAddr, now: Instant) -> bool {
        if self.config.rate_limit == 0 {
            return true;
        }
        let mut budgets = self.budgets.lock();
        budgets.prune(now, self.config.rate_window);
        budgets
            .window(caller, now)
            .charge(now, self.config.rate_window, self.config.rate_limit)
    }

    /// Records a denial, logging it if `caller`'s audit budget allows.
    ///
    /// Returns true if a log line was emitted.
    pub fn audit(&self, kind: ErrorCode, caller: IpAddr) -> bool {
        self.audit_at(kind, caller, Instant::now())
    }

    /// [`audit`](Self::audit) with an explicit clock reading.
    pub fn audit_at(&self, kind: ErrorCode, caller: IpAddr, now: Instant) -> bool {
        let (emit, suppressed_before) = {
            let mut budgets = self.audit_budgets.lock();
            budgets.prune(now, self.config.audit_window);
            let window = budgets.window(caller, now);
            let carried = if window.expired(now, self.config.audit_window) {
                window.overflow
            } else {
                0
            };
            let emit = window.charge(now, self.config.audit_window, self.config.audit_burst);
            if !emit {
                window.overflow = window.overflow.saturating_add(1);
            }
            (emit, carried)
        };

        {
            let mut stats = self.audit_stats.lock();
            let entry = stats.entry(kind).or_default();
            if emit {
                entry.emitted += 1;
            } else {
                entry.suppressed += 1;
            }
        }

        if emit {
            warn!(
                kind = %kind,
                caller = %caller,
                suppressed_before,
                "request denied"
            );
        }
        emit
    }

    /// Runs both gates for one request.
    ///
    /// Authorization runs first; a request with a bad key never charges the
    /// budget. The denial is audited before returning its code.
    pub fn check(&self, provided: Option<&str>, caller: IpAddr) -> Result<(), ErrorCode> {
        let denial = if !self.authorize(provided) {
            ErrorCode::InvalidAccessKey
        } else if !self.admit(caller) {
            ErrorCode::RateLimited
        } else {
            return Ok(());
        };
        self.audit(denial, caller);
        Err(denial)
    }

    /// Returns audit counters for one denial kind.
    pub fn audit_stats(&self, kind: ErrorCode) -> AuditStats {
        self.audit_stats
            .lock()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Number of callers with a live request budget.
    pub fn tracked_callers(&self) -> usize {
        self.budgets.lock().windows.len()
    }
}

/// Per-caller windows plus the time of the last expiry sweep.
#[derive(Debug)]
struct CallerTable {
    windows: HashMap<IpAddr, Window>,
    last_pruned: Option<Instant>,
}

impl CallerTable {
    fn new() -> Self {
        Self {
            windows: HashMap::new(),
            last_pruned: None,
        }
    }

    fn window(&mut self, caller: IpAddr, now: Instant) -> &mut Window {
        self.windows
            .entry(caller)
            .or_insert_with(|| Window::new(now))
    }

    /// Drops expired windows once the table is large, at most once per
    /// window length.
    fn prune(&mut self, now: Instant, length: Duration) {
        if self.windows.len() < PRUNE_THRESHOLD {
            return;
        }
        if self
            .last_pruned
            .is_some_and(|at| now.saturating_duration_since(at) < length)
        {
            return;
        }
        self.windows.retain(|_, window| !window.expired(now, length));
        self.last_pruned = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    fn controller(limit: u32, burst: u32) -> AccessController {
        AccessController::new(
            AccessConfig::new()
                .with_rate_limit(limit, Duration::from_secs(1))
                .with_audit_limit(burst, Duration::from_secs(1)),
        )
    }

    #[test]
    fn open_mode_authorizes_everything() {
        assert!(authorize(None, None));
        assert!(authorize(Some("anything"), None));
        assert!(authorize(None, Some("")));
        assert!(authorize(Some("x"), Some("")));
    }

    #[test]
    fn configured_key_requires_exact_match() {
        assert!(authorize(Some("s3cret"), Some("s3cret")));
        assert!(!authorize(Some("s3cret "), Some("s3cret")));
        assert!(!authorize(Some("S3CRET"), Some("s3cret")));
        assert!(!authorize(Some(""), Some("s3cret")));
        assert!(!authorize(None, Some("s3cret")));
    }

    #[test]
    fn empty_key_config_is_open_mode() {
        let config = AccessConfig::new().with_access_key("");
        assert!(config.access_key.is_none());
        assert!(!AccessController::new(config).requires_key());
    }

    #[test]
    fn third_call_in_window_is_denied() {
        let access = controller(2, 5);
        let start = Instant::now();

        assert!(access.admit_at(ip(1), start));
        assert!(access.admit_at(ip(1), start + Duration::from_millis(100)));
        assert!(!access.admit_at(ip(1), start + Duration::from_millis(200)));

        // Window elapsed: the budget is fresh again.
        assert!(access.admit_at(ip(1), start + Duration::from_millis(1100)));
        assert!(access.admit_at(ip(1), start + Duration::from_millis(1200)));
        assert!(!access.admit_at(ip(1), start + Duration::from_millis(1300)));
    }

    #[test]
    fn budgets_are_per_caller() {
        let access = controller(1, 5);
        let now = Instant::now();

        assert!(access.admit_at(ip(1), now));
        assert!(!access.admit_at(ip(1), now));
        assert!(access.admit_at(ip(2), now));
        assert_eq!(access.tracked_callers(), 2);
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let access = controller(0, 5);
        let now = Instant::now();
        for _ in 0..1000 {
            assert!(access.admit_at(ip(1), now));
        }
    }

    #[test]
    fn audit_lines_are_bounded() {
        let access = controller(100, 2);
        let start = Instant::now();

        let emitted = (0..5)
            .filter(|i| {
                access.audit_at(
                    ErrorCode::InvalidAccessKey,
                    ip(7),
                    start + Duration::from_millis(i * 10),
                )
            })
            .count();
        assert_eq!(emitted, 2);

        let stats = access.audit_stats(ErrorCode::InvalidAccessKey);
        assert_eq!(stats, AuditStats { emitted: 2, suppressed: 3 });

        // A new audit window allows logging again.
        assert!(access.audit_at(
            ErrorCode::InvalidAccessKey,
            ip(7),
            start + Duration::from_millis(1500)
        ));
        // Another caller has its own budget.
        assert!(access.audit_at(ErrorCode::RateLimited, ip(8), start));
        assert_eq!(access.audit_stats(ErrorCode::RateLimited).emitted, 1);
    }

    #[test]
    fn audit_window_independent_of_rate_window() {
        let access = AccessController::new(
            AccessConfig::new()
                .with_rate_limit(1, Duration::from_secs(10))
                .with_audit_limit(1, Duration::from_millis(100)),
        );
        let start = Instant::now();

        assert!(access.admit_at(ip(3), start));
        assert!(!access.admit_at(ip(3), start));
        assert!(access.audit_at(ErrorCode::RateLimited, ip(3), start));
        assert!(!access.audit_at(ErrorCode::RateLimited, ip(3), start));

        let later = start + Duration::from_millis(200);
        assert!(!access.admit_at(ip(3), later));
        assert!(access.audit_at(ErrorCode::RateLimited, ip(3), later));
    }

    #[test]
    fn check_orders_gates() {
        let access = AccessController::new(
            AccessConfig::new()
                .with_access_key("k")
                .with_rate_limit(1, Duration::from_secs(60)),
        );

        assert_eq!(access.check(Some("bad"), ip(1)), Err(ErrorCode::InvalidAccessKey));
        // The rejected key did not spend the budget.
        assert_eq!(access.check(Some("k"), ip(1)), Ok(()));
        assert_eq!(access.check(Some("k"), ip(1)), Err(ErrorCode::RateLimited));

        assert_eq!(access.audit_stats(ErrorCode::InvalidAccessKey).emitted, 1);
        assert_eq!(access.audit_stats(ErrorCode::RateLimited).emitted, 1);
    }

    #[test]
    fn expired_budgets_are_pruned() {
        let access = controller(5, 5);
        let start = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            let caller = IpAddr::V4(Ipv4Addr::from(i as u32 + 1));
            access.admit_at(caller, start);
        }
        assert_eq!(access.tracked_callers(), PRUNE_THRESHOLD);

        access.admit_at(ip(1), start + Duration::from_secs(5));
        assert_eq!(access.tracked_callers(), 1);
    }

    #[test]
    fn large_table_is_swept_once_per_window() {
        let window = Duration::from_secs(1);
        let start = Instant::now();
        let fill = |table: &mut CallerTable| {
            for i in 0..PRUNE_THRESHOLD as u32 {
                table.window(IpAddr::V4(Ipv4Addr::from(i + 1)), start);
            }
        };

        let mut table = CallerTable::new();
        fill(&mut table);
        table.prune(start + Duration::from_secs(2), window);
        assert!(table.windows.is_empty());

        // Expired again, but the last sweep was less than a window ago.
        fill(&mut table);
        table.prune(start + Duration::from_millis(2500), window);
        assert_eq!(table.windows.len(), PRUNE_THRESHOLD);

        table.prune(start + Duration::from_millis(3100), window);
        assert!(table.windows.is_empty());
    }
}
