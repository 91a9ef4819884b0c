//! Exponential backoff with optional partial jitter.
//!
//! A `BackoffGenerator` tracks how many times a caller has backed off and how
//! long it has slept in total, and answers whether another attempt fits in the
//! configured budget. Both `backoff()` and `backoff_jitter()` return that
//! answer after sleeping, so retry loops read as:
//!
//! ```ignore
//! loop {
//!     match call().await {
//!         Ok(v) => return Ok(v),
//!         Err(e) if is_retryable(&e) => {
//!             if !backoff.backoff_jitter().await { break; }
//!         }
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```
use std::time::Duration;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::debug;

/// Ceiling applied to every computed interval, in milliseconds.
pub const MAX_INTERVAL_MS: u64 = i32::MAX as u64;

pub const DEFAULT_BASE_MS: u64 = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackoffConfigError {
    #[error("jitter_divisor must be greater than or equal to 1, got: {0}")]
    InvalidJitterDivisor(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffGeneratorOptions {
    /// Interval of the first backoff, doubled on every attempt.
    pub base_ms: u64,
    pub max_interval_ms: u64,
    /// Width of the jitter band as a fraction of the interval: 1 is full
    /// jitter, 4 randomizes the top quarter of the interval.
    pub jitter_divisor: u32,
    pub max_attempts: Option<u32>,
    pub max_cumulative_backoff_time_ms: Option<u64>,
}

impl Default for BackoffGeneratorOptions {
    fn default() -> Self {
        BackoffGeneratorOptions {
            base_ms: DEFAULT_BASE_MS,
            max_interval_ms: MAX_INTERVAL_MS,
            jitter_divisor: 1,
            max_attempts: None,
            max_cumulative_backoff_time_ms: None,
        }
    }
}

/// `min(base * 2^attempt, max_interval_ms, MAX_INTERVAL_MS)`, saturating.
pub fn calculate_sleep_ms(base_ms: u64, attempt: u32, max_interval_ms: u64) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base_ms
        .saturating_mul(factor)
        .min(max_interval_ms)
        .min(MAX_INTERVAL_MS)
}

#[derive(Debug)]
pub struct BackoffGenerator {
    options: BackoffGeneratorOptions,
    attempt: u32,
    cumulative_backoff_time_ms: u64,
    rnd: SystemRandom,
}

impl BackoffGenerator {
    pub fn new(options: BackoffGeneratorOptions) -> Result<Self, BackoffConfigError> {
        if options.jitter_divisor == 0 {
            return Err(BackoffConfigError::InvalidJitterDivisor(options.jitter_divisor));
        }
        Ok(BackoffGenerator {
            options,
            attempt: 0,
            cumulative_backoff_time_ms: 0,
            rnd: SystemRandom::new(),
        })
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn cumulative_backoff_time_ms(&self) -> u64 {
        self.cumulative_backoff_time_ms
    }

    pub fn options(&self) -> &BackoffGeneratorOptions {
        &self.options
    }

    /// Resets the attempt counter and the time spent sleeping. Configuration is kept.
    pub fn restart(&mut self) {
        self.attempt = 0;
        self.cumulative_backoff_time_ms = 0;
    }

    pub fn should_continue(&self) -> bool {
        let attempts_left = self
            .options
            .max_attempts
            .map_or(true, |max| self.attempt < max);
        let time_left = self
            .options
            .max_cumulative_backoff_time_ms
            .map_or(true, |max| self.cumulative_backoff_time_ms < max);
        attempts_left && time_left
    }

    /// Sleeps for the full exponential interval.
    ///
    /// Returns `false` without sleeping when the budget is already spent,
    /// otherwise returns `should_continue()` after the sleep.
    pub async fn backoff(&mut self) -> bool {
        if !self.should_continue() {
            return false;
        }
        let interval = self.next_interval_ms();
        self.sleep(interval).await
    }

    /// Sleeps for `(interval - interval/d) + floor(random * interval/d)`
    /// where `d` is the configured jitter divisor.
    ///
    /// Same return contract as [`BackoffGenerator::backoff`].
    pub async fn backoff_jitter(&mut self) -> bool {
        if !self.should_continue() {
            return false;
        }
        let interval = self.next_interval_ms();
        let band = interval / u64::from(self.options.jitter_divisor);
        let jittered = (interval - band) + self.random_below(band);
        self.sleep(jittered).await
    }

    fn next_interval_ms(&self) -> u64 {
        let interval = calculate_sleep_ms(
            self.options.base_ms,
            self.attempt,
            self.options.max_interval_ms,
        );
        match self.options.max_cumulative_backoff_time_ms {
            Some(max) => interval.min(max.saturating_sub(self.cumulative_backoff_time_ms)),
            None => interval,
        }
    }

    async fn sleep(&mut self, interval_ms: u64) -> bool {
        debug!(attempt = self.attempt, interval_ms, "backing off");
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        self.cumulative_backoff_time_ms = self.cumulative_backoff_time_ms.saturating_add(interval_ms);
        self.attempt = self.attempt.saturating_add(1);
        self.should_continue()
    }

    // Uniform in [0, bound). Falls back to no jitter if the system RNG fails.
    fn random_below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        let mut bytes = [0u8; 8];
        match self.rnd.fill(&mut bytes) {
            Ok(()) => u64::from_le_bytes(bytes) % bound,
            Err(_) => 0,
        }
    }
}
