//! In-memory connector for connection manager tests
//!
//! [`MockConnector`] stands in for PostgreSQL. It can refuse a given number of
//! connection attempts, fail fatally, slow down establishment, cap the number
//! of concurrent sessions, and break the live transport so the next liveness
//! check fails. Every session it hands out is counted on checkout and on drop,
//! so tests can prove that scoped acquisition releases resources on every exit
//! path.
//!
//! Like a real pool, a capped transport makes a caller wait up to the
//! configured acquire timeout for a free slot before reporting
//! `PoolExhausted`, and closing a transport waits until every session it lent
//! out has been returned.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_db::{BackoffStrategy, Connector, DatabaseError, PoolConfig, RetryPolicy, Transport};

/// Interval at which a waiting mock re-checks session counts
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Builds a configuration pointing at nothing, with zero backoff
///
/// The acquire timeout is shortened so saturation tests finish quickly.
pub fn mock_pool_config(max_attempts: u32) -> PoolConfig {
    PoolConfig::new("mock-host", "tester", "testdb")
        .password("not-a-real-password")
        .acquire_timeout(Duration::from_millis(200))
        .retry(RetryPolicy::new(max_attempts).with_backoff(BackoffStrategy::None))
}

/// Session checkout/release counters shared by a connector and its transports
#[derive(Debug, Default)]
pub struct SessionCounters {
    acquired: AtomicU32,
    released: AtomicU32,
}

impl SessionCounters {
    pub fn acquired(&self) -> u32 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u32 {
        self.released.load(Ordering::SeqCst)
    }

    /// Sessions checked out and not yet dropped
    pub fn outstanding(&self) -> u32 {
        self.acquired() - self.released()
    }
}

/// Fault-injecting connector
#[derive(Debug, Default)]
pub struct MockConnector {
    failures_remaining: AtomicU32,
    fatal: AtomicBool,
    connects: AtomicU32,
    closes: Arc<AtomicU32>,
    healthy: Arc<AtomicBool>,
    counters: Arc<SessionCounters>,
    connect_delay: Duration,
    capacity: Option<u32>,
}

impl MockConnector {
    /// Creates a connector whose every attempt succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses the first `failures` attempts with a transient error
    pub fn failing(failures: u32) -> Self {
        let connector = Self::new();
        connector.fail_next(failures);
        connector
    }

    /// Fails every attempt with a non-retryable error (bad credentials)
    pub fn fatal() -> Self {
        let connector = Self::new();
        connector.fatal.store(true, Ordering::SeqCst);
        connector
    }

    /// Makes each attempt take `delay`
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Limits every transport to `sessions` concurrent checkouts
    pub fn with_capacity(mut self, sessions: u32) -> Self {
        self.capacity = Some(sessions);
        self
    }

    /// Refuses the next `failures` attempts
    pub fn fail_next(&self, failures: u32) {
        self.failures_remaining.store(failures, Ordering::SeqCst);
    }

    /// Marks the live transport healthy or broken
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Establishment attempts seen so far, failed ones included
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Transports closed so far
    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> &SessionCounters {
        &self.counters
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, config: &PoolConfig) -> Result<MockTransport, DatabaseError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if self.fatal.load(Ordering::SeqCst) {
            return Err(DatabaseError::configuration(
                "password authentication failed for user \"tester\"",
            ));
        }

        let refused = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DatabaseError::ConnectionFailed("connection refused".to_string()));
        }

        self.healthy.store(true, Ordering::SeqCst);
        Ok(MockTransport {
            healthy: Arc::clone(&self.healthy),
            closed: AtomicBool::new(false),
            closes: Arc::clone(&self.closes),
            counters: Arc::clone(&self.counters),
            lent: Arc::new(AtomicU32::new(0)),
            capacity: self.capacity,
            acquire_timeout: config.acquire_timeout,
        })
    }
}

/// Transport produced by [`MockConnector`]
#[derive(Debug)]
pub struct MockTransport {
    healthy: Arc<AtomicBool>,
    closed: AtomicBool,
    closes: Arc<AtomicU32>,
    counters: Arc<SessionCounters>,
    /// Sessions of this transport currently checked out
    lent: Arc<AtomicU32>,
    capacity: Option<u32>,
    acquire_timeout: Duration,
}

impl MockTransport {
    /// Sessions of this transport not yet returned
    pub fn lent(&self) -> u32 {
        self.lent.load(Ordering::SeqCst)
    }

    fn try_reserve(&self) -> bool {
        let limit = self.capacity.unwrap_or(u32::MAX);
        self.lent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    async fn acquire(&self) -> Result<MockSession, DatabaseError> {
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;
        loop {
            if self.is_closed() {
                return Err(DatabaseError::ConnectionFailed("pool closed".to_string()));
            }
            if self.try_reserve() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DatabaseError::PoolExhausted);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            counters: Arc::clone(&self.counters),
            lent: Arc::clone(&self.lent),
            statements: Vec::new(),
        })
    }

    async fn ping(&self, _session: &mut MockSession) -> Result<(), DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::HealthCheckFailed("transport closed".to_string()));
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(DatabaseError::HealthCheckFailed(
                "server closed the connection".to_string(),
            ));
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        while self.lent() > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A checked-out session; counts itself released when dropped
#[derive(Debug)]
pub struct MockSession {
    counters: Arc<SessionCounters>,
    lent: Arc<AtomicU32>,
    statements: Vec<String>,
}

impl MockSession {
    /// Records a statement; statements starting with `FAIL` error out
    pub fn execute(&mut self, sql: &str) -> Result<u64, DatabaseError> {
        if sql.starts_with("FAIL") {
            return Err(DatabaseError::QueryFailed(format!(
                "syntax error at or near \"{}\"",
                sql
            )));
        }
        self.statements.push(sql.to_string());
        Ok(1)
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.lent.fetch_sub(1, Ordering::SeqCst);
    }
}
