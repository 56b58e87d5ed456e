//! Retry with exponential backoff

use censor_core::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Decides whether an error is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Called before each retry with the upcoming attempt number, the error, and the delay
pub type RetryObserver = Arc<dyn Fn(u32, &Error, Duration) + Send + Sync>;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry behavior
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,

    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,

    /// Fraction of the delay added or removed at random, 0.1 is ±10%
    pub jitter: f64,

    /// Defaults to [`Error::is_retryable`]
    pub retry_if: Option<RetryPredicate>,

    pub on_retry: Option<RetryObserver>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: 0.1,
            retry_if: None,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retry_if(mut self, f: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Arc::new(f));
        self
    }

    pub fn with_on_retry(
        mut self,
        f: impl Fn(u32, &Error, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T>,

    /// Attempts made, including the first
    pub attempts: u32,
}

/// Runs operations under a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct Retryer {
    config: RetryConfig,
}

impl Retryer {
    /// Zero delays and multiplier fall back to the defaults
    pub fn new(mut config: RetryConfig) -> Self {
        if config.initial_delay.is_zero() {
            config.initial_delay = DEFAULT_INITIAL_DELAY;
        }
        if config.max_delay.is_zero() {
            config.max_delay = DEFAULT_MAX_DELAY;
        }
        if config.multiplier == 0.0 {
            config.multiplier = DEFAULT_MULTIPLIER;
        }
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn should_retry(&self, err: &Error) -> bool {
        match &self.config.retry_if {
            Some(f) => f(err),
            None => err.is_retryable(),
        }
    }

    /// Backoff before retry number `attempt + 1`: initial × multiplier^attempt ± jitter, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(attempt as i32);

        let mut delay = base;
        if self.config.jitter > 0.0 {
            let spread = base * self.config.jitter;
            delay += (rand::thread_rng().gen::<f64>() * 2.0 - 1.0) * spread;
        }

        let capped = delay.clamp(0.0, self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Run `op` until it succeeds, the predicate rejects the error, or retries run out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts: attempt + 1,
                    }
                }
                Err(e) => e,
            };

            if attempt >= self.config.max_retries || !self.should_retry(&err) {
                return Retried {
                    result: Err(err),
                    attempts: attempt + 1,
                };
            }

            let delay = self.delay_for(attempt);
            debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
            if let Some(on_retry) = &self.config.on_retry {
                on_retry(attempt + 1, &err, delay);
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Retry `op` up to `max_retries` times with default backoff
pub async fn retry<T, F, Fut>(max_retries: u32, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retryer::new(RetryConfig::default().with_max_retries(max_retries))
        .run(op)
        .await
        .result
}
