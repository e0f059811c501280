use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::TaxCheckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retryable,
    Fatal,
}

pub trait Classify {
    fn retryability(&self) -> Retryability;
}

impl Classify for TaxCheckError {
    fn retryability(&self) -> Retryability {
        if self.is_transient() {
            Retryability::Retryable
        } else {
            Retryability::Fatal
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: usize },
    Fatal { error: E, attempts: usize },
    Exhausted { error: E, attempts: usize },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Fatal { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Runs `op` until it succeeds, fails fatally, or `max_attempts` full
    /// attempts have been made. `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        E: Classify + fmt::Display,
        F: FnMut(usize) -> Result<T, E>,
    {
        let mut attempt = 1usize;
        loop {
            match op(attempt) {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) if error.retryability() == Retryability::Fatal => {
                    return RetryOutcome::Fatal {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) if attempt >= self.max_attempts => {
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    warn!(
                        "{label}: {error} (try {}/{})",
                        attempt + 1,
                        self.max_attempts
                    );
                    let delay = self.base_delay * attempt as u32;
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRY, Duration::from_millis(200))
    }
}
