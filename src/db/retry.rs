use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{Result, StoreError};

use super::session::Session;

/// Retry budget for a unit of backend work.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Runs `work` against the session, retrying on transient backend
/// conflicts.
///
/// When a savepoint name is given, each attempt runs inside that savepoint
/// and a failed attempt is rolled back to it, so the enclosing transaction
/// is not poisoned. Transient failures back off a randomized interval
/// (base ± 25%) between attempts; once the budget is exhausted the
/// conflict surfaces as [`StoreError::ConcurrentModification`].
pub(crate) fn with_retry<T>(
    session: &Session,
    policy: &RetryPolicy,
    savepoint: Option<&str>,
    op: &'static str,
    mut work: impl FnMut(&Session) -> Result<T>,
) -> Result<T> {
    let max = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        if let Some(name) = savepoint {
            session.savepoint(name)?;
        }
        match work(session) {
            Ok(value) => {
                if let Some(name) = savepoint {
                    session.release_savepoint(name)?;
                }
                return Ok(value);
            }
            Err(err) => {
                let transient = is_transient(session, &err);
                if let Some(name) = savepoint {
                    session.rollback_to_savepoint(name)?;
                    session.release_savepoint(name)?;
                }
                if !transient {
                    return Err(err);
                }
                if attempt >= max {
                    warn!(op, attempts = attempt, error = %err, "store.retry.exhausted");
                    return Err(StoreError::ConcurrentModification(op));
                }
                let delay = jittered(policy.backoff);
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "store.retry.backoff"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn is_transient(session: &Session, err: &StoreError) -> bool {
    let Some(code) = err.backend_code() else {
        return false;
    };
    let codes = session.dialect().transient_error_codes();
    codes.is_empty() || codes.contains(&code)
}

fn jittered(base: Duration) -> Duration {
    let factor = 0.75 + rand::thread_rng().gen::<f64>() * 0.5;
    base.mul_f64(factor)
}
