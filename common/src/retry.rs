// Retry executor with exponential backoff and jitter

use crate::clock::{elapsed_between, Clock};
use crate::telemetry;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Predicate deciding whether a failure is retried
pub type RetryCondition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Exponential backoff with optional symmetric jitter
///
/// Delay before retry number `n` (1-based: the attempt that just failed) is
/// `min(max_delay, base_delay * multiplier^(n-1))`, then jittered by up to
/// `±jitter_factor` of that value and clamped to `[0, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter fraction in `0.0..=1.0`; zero disables jitter
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            jitter_factor: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay after the given failed attempt, without jitter
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay after the given failed attempt, with jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        if self.jitter_factor == 0.0 || base.is_zero() {
            return base;
        }

        let spread = base.as_secs_f64() * self.jitter_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let jittered = (base.as_secs_f64() + offset).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }

    /// Sum of unjittered delays slept across `max_attempts` attempts
    pub fn total_base_delay(&self, max_attempts: u32) -> Duration {
        (1..max_attempts).map(|n| self.base_delay_for(n)).sum()
    }
}

/// Retry configuration for one kind of operation
pub struct RetryConfig<E> {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub retry_condition: RetryCondition<E>,
}

impl<E: Retryable + 'static> RetryConfig<E> {
    /// Configuration that retries whatever the error classifies as retryable
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_condition: Arc::new(|err: &E| err.is_retryable()),
        }
    }

    /// Social platforms rate-limit aggressively: fewer attempts, longer base delay
    pub fn platform_default() -> Self {
        Self::new(
            2,
            BackoffPolicy::new(Duration::from_secs(3), Duration::from_secs(30), 2.0),
        )
    }
}

impl<E: Retryable + 'static> Default for RetryConfig<E> {
    fn default() -> Self {
        Self::new(3, BackoffPolicy::default())
    }
}

impl<E> RetryConfig<E> {
    pub fn with_retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Arc::new(condition);
        self
    }

    fn should_retry(&self, err: &E) -> bool {
        (self.retry_condition)(err)
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            retry_condition: Arc::clone(&self.retry_condition),
        }
    }
}

impl<E> std::fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Failure returned by [`RetryExecutor::run`]
#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("gave up after {attempts} attempt(s) in {elapsed:?}: {source}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: E,
    },

    #[error("non-retryable failure on attempt {attempts} after {elapsed:?}: {source}")]
    Aborted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: E,
    },

    #[error("cancelled after {attempts} attempt(s) in {elapsed:?}")]
    Cancelled {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<E>,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// Attempts actually made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Aborted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Time from the first attempt until the executor gave up
    pub fn elapsed(&self) -> Duration {
        match self {
            RetryError::Exhausted { elapsed, .. }
            | RetryError::Aborted { elapsed, .. }
            | RetryError::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// Runs operations with classified retries and backoff
///
/// Sleeps go through the injected [`Clock`] so only the task running the
/// operation is suspended. `cancel_pending` stops retries that have not started
/// yet; an attempt already in progress always runs to completion.
pub struct RetryExecutor {
    clock: Arc<dyn Clock>,
    in_flight: AtomicUsize,
    cancelled: watch::Sender<bool>,
}

impl RetryExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            clock,
            in_flight: AtomicUsize::new(0),
            cancelled,
        }
    }

    /// Number of `run` calls currently executing or backing off
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Skip every retry that has not started yet, including ones sleeping in backoff
    pub fn cancel_pending(&self) {
        self.cancelled.send_replace(true);
    }

    /// Accept new attempts again after `cancel_pending`
    pub fn resume(&self) {
        self.cancelled.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        config: &RetryConfig<E>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let mut cancel_rx = self.cancelled.subscribe();
        let started = self.clock.now();
        let max_attempts = config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        if *cancel_rx.borrow_and_update() {
            return Err(RetryError::Cancelled {
                attempts: 0,
                elapsed: Duration::ZERO,
                last_error: None,
            });
        }

        loop {
            let err = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !config.should_retry(&err) {
                debug!(attempt, error = %err, "Non-retryable failure, not retrying");
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    elapsed: elapsed_between(started, self.clock.now()),
                    source: err,
                });
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "Retry attempts exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    elapsed: elapsed_between(started, self.clock.now()),
                    source: err,
                });
            }

            let delay = config.backoff.delay_for(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable failure, backing off"
            );

            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = wait_for_cancel(&mut cancel_rx) => {
                    debug!(attempt, "Pending retry cancelled");
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        elapsed: elapsed_between(started, self.clock.now()),
                        last_error: Some(err),
                    });
                }
            }

            if *cancel_rx.borrow_and_update() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    elapsed: elapsed_between(started, self.clock.now()),
                    last_error: Some(err),
                });
            }

            attempt += 1;
        }
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        telemetry::update_retry_in_flight(current);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let current = self.counter.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        telemetry::update_retry_in_flight(current);
    }
}
