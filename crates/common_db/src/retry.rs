//! Retry policy for establishing the database transport

use std::time::Duration;

/// Default number of connection attempts before giving up
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
/// Delay before the second attempt; doubled for each attempt after that
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Upper bound on any single backoff delay
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let multiplier = 2u32.saturating_pow(exponent);
                std::cmp::min(base.saturating_mul(multiplier), *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Bounded retry policy for transport establishment
///
/// `max_attempts` counts every attempt including the first, so a policy of 3
/// tolerates two failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of connection attempts (at least 1).
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Create a new retry policy with the default exponential backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffStrategy::default(),
        }
    }

    /// A single attempt with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::None,
        }
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Returns true if another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt that follows `attempt`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_after_attempt(attempt)
    }

    /// Longest time a caller can spend sleeping in backoff for one establishment.
    ///
    /// Excludes the attempts themselves; see `PoolConfig::max_establishment_time`.
    pub fn max_total_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS)
    }
}
