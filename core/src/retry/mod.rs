//! Keyed exponential-backoff retry
//!
//! [`RetryManager`] runs async operations with exponential backoff,
//! optional jitter and a per-attempt timeout, tracking state per logical
//! operation key (e.g. `"asr_connection"`). Only one retry loop may be in
//! flight per key at any time.

/// Retry error types
pub mod error;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

pub use error::{AttemptTimeout, RetryError, RetryResult};

/// Retry policy for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,
    /// Randomize each delay by +/-10%
    pub jitter: bool,
    /// Per-attempt timeout in milliseconds (None disables the timeout race)
    pub timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_factor: 2.0,
            jitter: true,
            timeout_ms: Some(30000),
        }
    }
}

impl RetryConfig {
    /// Network requests: 5 attempts, 1s -> 30s, x2, jitter, 60s timeout
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_factor: 2.0,
            jitter: true,
            timeout_ms: Some(60000),
        }
    }

    /// Audio services: 3 attempts, 2s -> 8s, x2, no jitter, 20s timeout
    pub fn audio() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            max_delay_ms: 8000,
            backoff_factor: 2.0,
            jitter: false,
            timeout_ms: Some(20000),
        }
    }

    /// Quick retry: 2 attempts, 0.5s -> 2s, x2, jitter, 10s timeout
    pub fn fast() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 500,
            max_delay_ms: 2000,
            backoff_factor: 2.0,
            jitter: true,
            timeout_ms: Some(10000),
        }
    }

    /// Long-running retry: 10 attempts, 2s -> 60s, x1.5, jitter, 300s timeout
    pub fn persistent() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_factor: 1.5,
            jitter: true,
            timeout_ms: Some(300000),
        }
    }
}

/// Optional callbacks observed during a retry loop
#[derive(Default)]
pub struct RetryOptions {
    /// Return false to stop retrying on this error
    pub retry_if: Option<Box<dyn Fn(&anyhow::Error) -> bool + Send + Sync>>,
    /// Called before each backoff sleep with (attempt, error)
    pub on_retry: Option<Box<dyn Fn(u32, &anyhow::Error) + Send + Sync>>,
    /// Called once on success with the attempt number
    pub on_success: Option<Box<dyn Fn(u32) + Send + Sync>>,
    /// Called once when all attempts are exhausted
    pub on_final_failure: Option<Box<dyn Fn(&anyhow::Error, u32) + Send + Sync>>,
}

/// Snapshot of the retry state for one key
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Attempts made so far
    pub attempts: u32,
    /// When the last attempt started
    pub last_attempt: Option<Instant>,
    /// When the next attempt is scheduled
    pub next_retry_at: Option<Instant>,
    /// Whether a retry loop is currently in flight
    pub is_retrying: bool,
    /// Total backoff delay accrued
    pub total_delay: Duration,
    pub(crate) cancelled: bool,
}

impl RetryState {
    fn new() -> Self {
        Self {
            attempts: 0,
            last_attempt: None,
            next_retry_at: None,
            is_retrying: false,
            total_delay: Duration::ZERO,
            cancelled: false,
        }
    }
}

/// Keyed retry manager
///
/// Cheap to clone; clones share the same state table.
#[derive(Clone, Default)]
pub struct RetryManager {
    states: Arc<Mutex<HashMap<String, RetryState>>>,
}

impl RetryManager {
    /// Create a new retry manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` with retries under `config`
    ///
    /// Attempts run 1..=`max_attempts`, each raced against the configured
    /// timeout. Between failed attempts the loop sleeps
    /// `min(max_delay, initial_delay * backoff_factor^(attempt-1))`,
    /// jittered by +/-10% when enabled.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Concurrent`] immediately if a retry for `key` is
    ///   already in flight
    /// - [`RetryError::Cancelled`] if `cancel_retry(key)` was called
    /// - [`RetryError::Exhausted`] once the last attempt fails or
    ///   `retry_if` returns false
    pub async fn retry<T, F, Fut>(
        &self,
        key: &str,
        mut operation: F,
        config: &RetryConfig,
        options: RetryOptions,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        {
            let mut states = self.states.lock().unwrap();
            let state = states
                .entry(key.to_string())
                .or_insert_with(RetryState::new);

            // One in-flight retry loop per key
            if state.is_retrying {
                return Err(RetryError::Concurrent {
                    key: key.to_string(),
                });
            }

            state.is_retrying = true;
            state.cancelled = false;
        }

        let result = self
            .run_attempts(key, &mut operation, config, &options)
            .await;

        if let Some(state) = self.states.lock().unwrap().get_mut(key) {
            state.is_retrying = false;
        }

        result
    }

    async fn run_attempts<T, F, Fut>(
        &self,
        key: &str,
        operation: &mut F,
        config: &RetryConfig,
        options: &RetryOptions,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // A zero max_attempts config still runs one attempt
        let max_attempts = config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            {
                let mut states = self.states.lock().unwrap();
                if let Some(state) = states.get_mut(key) {
                    state.attempts = attempt;
                    state.last_attempt = Some(Instant::now());
                }
            }

            let outcome = match config.timeout_ms {
                Some(timeout_ms) => {
                    match tokio::time::timeout(Duration::from_millis(timeout_ms), operation())
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(anyhow::Error::new(AttemptTimeout(timeout_ms))),
                    }
                }
                None => operation().await,
            };

            match outcome {
                Ok(result) => {
                    debug!(key, attempt, "Retry operation succeeded");
                    if let Some(on_success) = &options.on_success {
                        on_success(attempt);
                    }
                    self.reset_retry_state(key);
                    return Ok(result);
                }
                Err(error) => {
                    let give_up = attempt == max_attempts
                        || options
                            .retry_if
                            .as_ref()
                            .map(|retry_if| !retry_if(&error))
                            .unwrap_or(false);

                    if give_up {
                        warn!(key, attempt, error = %error, "Retry operation failed for good");
                        if let Some(on_final_failure) = &options.on_final_failure {
                            on_final_failure(&error, attempt);
                        }
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }

                    if let Some(on_retry) = &options.on_retry {
                        on_retry(attempt, &error);
                    }

                    let delay = Self::delay_for_attempt(attempt, config);
                    debug!(key, attempt, delay_ms = delay.as_millis() as u64, "Backing off");

                    {
                        let mut states = self.states.lock().unwrap();
                        if let Some(state) = states.get_mut(key) {
                            state.next_retry_at = Some(Instant::now() + delay);
                            state.total_delay += delay;
                        }
                    }

                    tokio::time::sleep(delay).await;

                    let cancelled = self
                        .states
                        .lock()
                        .unwrap()
                        .get(key)
                        .map(|state| state.cancelled)
                        .unwrap_or(false);
                    if cancelled {
                        debug!(key, "Retry cancelled during backoff");
                        return Err(RetryError::Cancelled {
                            key: key.to_string(),
                        });
                    }
                }
            }
        }

        unreachable!("retry loop always returns within max_attempts");
    }

    /// Compute the backoff delay for an attempt
    ///
    /// `min(max_delay, initial_delay * backoff_factor^(attempt-1))`,
    /// jittered by +/-10% when the config enables it.
    pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut delay_ms =
            config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
        delay_ms = delay_ms.min(config.max_delay_ms as f64);

        if config.jitter {
            let jitter_range = delay_ms * 0.1;
            let jitter = rand::thread_rng().gen_range(-1.0..=1.0) * jitter_range;
            delay_ms += jitter;
        }

        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }

    /// Mark a key's in-flight retry for cancellation
    ///
    /// Takes effect at the next backoff boundary; the retry call returns
    /// [`RetryError::Cancelled`].
    pub fn cancel_retry(&self, key: &str) {
        if let Some(state) = self.states.lock().unwrap().get_mut(key) {
            state.cancelled = true;
        }
    }

    /// Forget the retry state for a key
    pub fn reset_retry_state(&self, key: &str) {
        self.states.lock().unwrap().remove(key);
    }

    /// Snapshot the retry state for a key
    pub fn retry_state(&self, key: &str) -> Option<RetryState> {
        self.states.lock().unwrap().get(key).cloned()
    }

    /// Snapshot all retry states
    pub fn all_retry_states(&self) -> HashMap<String, RetryState> {
        self.states.lock().unwrap().clone()
    }

    /// Whether a new retry loop may start for this key
    pub fn can_retry(&self, key: &str, config: &RetryConfig) -> bool {
        match self.states.lock().unwrap().get(key) {
            Some(state) => state.attempts < config.max_attempts && !state.is_retrying,
            None => true,
        }
    }

    /// Time remaining until the next scheduled attempt, if any
    pub fn time_until_next_retry(&self, key: &str) -> Option<Duration> {
        let states = self.states.lock().unwrap();
        let next = states.get(key)?.next_retry_at?;
        Some(next.saturating_duration_since(Instant::now()))
    }

    /// Drop all retry states
    pub fn clear_all_retry_states(&self) {
        self.states.lock().unwrap().clear();
    }

    /// Heuristic: is this error worth retrying at all
    pub fn is_retryable_error(error: &anyhow::Error) -> bool {
        const RETRYABLE: [&str; 7] = [
            "network",
            "timeout",
            "connection",
            "fetch",
            "websocket",
            "temporary",
            "unavailable",
        ];

        let message = error.to_string().to_lowercase();
        RETRYABLE.iter().any(|keyword| message.contains(keyword))
    }

    /// Heuristic: is this HTTP status worth retrying
    pub fn is_retryable_http_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }
}
