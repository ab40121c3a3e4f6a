//! Bounded-retry generation.
//!
//! "Produce a value, reject it if it fails a predicate, try again up to N
//! times." Randomness, if any, lives in the injected `produce` function; the
//! generator itself holds no state and no seed.
//!
//! ```rust,ignore
//! let outcome = generate(2, || scores.draw(), |score| *score >= 80)?;
//! match outcome {
//!     GenerationOutcome::Accepted { value, .. } => deliver(value),
//!     GenerationOutcome::Exhausted { value, .. } => deliver_degraded(value),
//! }
//! ```

use std::future::Future;

use memebot_core::ConfigError;

/// One produced value and whether it passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt<T> {
    pub value: T,
    /// 1-based index of the attempt.
    pub attempt_index: u32,
    pub accepted: bool,
}

/// Result of a bounded generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome<T> {
    /// The first value that passed the predicate.
    Accepted { value: T, attempts: u32 },
    /// No value passed; this is the last one produced.
    Exhausted { value: T, attempts: u32 },
}

impl<T> GenerationOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Accepted { value, .. } | Self::Exhausted { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Accepted { value, .. } | Self::Exhausted { value, .. } => value,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Accepted { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

fn check_attempts(max_attempts: u32) -> Result<(), ConfigError> {
    if max_attempts < 1 {
        return Err(ConfigError::new(
            "generator",
            "max_attempts must be at least 1",
        ));
    }
    Ok(())
}

/// Calls `produce` up to `max_attempts` times and returns the first value
/// `accept` approves, or the last value produced.
pub fn generate<T, P, A>(
    max_attempts: u32,
    mut produce: P,
    mut accept: A,
) -> Result<GenerationOutcome<T>, ConfigError>
where
    P: FnMut() -> T,
    A: FnMut(&T) -> bool,
{
    check_attempts(max_attempts)?;

    let mut attempts = 1;
    loop {
        let value = produce();
        if accept(&value) {
            return Ok(GenerationOutcome::Accepted { value, attempts });
        }
        if attempts == max_attempts {
            return Ok(GenerationOutcome::Exhausted { value, attempts });
        }
        attempts += 1;
    }
}

/// Like [`generate`], also returning every attempt in order.
pub fn generate_recorded<T, P, A>(
    max_attempts: u32,
    produce: P,
    mut accept: A,
) -> Result<(GenerationOutcome<T>, Vec<GenerationAttempt<T>>), ConfigError>
where
    T: Clone,
    P: FnMut() -> T,
    A: FnMut(&T) -> bool,
{
    let mut history = Vec::new();
    let outcome = generate(max_attempts, produce, |value: &T| {
        let accepted = accept(value);
        history.push(GenerationAttempt {
            value: value.clone(),
            attempt_index: history.len() as u32 + 1,
            accepted,
        });
        accepted
    })?;
    Ok((outcome, history))
}

/// Asynchronous [`generate`]: `produce` receives the 1-based attempt index.
pub async fn generate_async<T, P, Fut, A>(
    max_attempts: u32,
    mut produce: P,
    mut accept: A,
) -> Result<GenerationOutcome<T>, ConfigError>
where
    P: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    A: FnMut(&T) -> bool,
{
    check_attempts(max_attempts)?;

    let mut attempts = 1;
    loop {
        let value = produce(attempts).await;
        if accept(&value) {
            return Ok(GenerationOutcome::Accepted { value, attempts });
        }
        if attempts == max_attempts {
            return Ok(GenerationOutcome::Exhausted { value, attempts });
        }
        attempts += 1;
    }
}
