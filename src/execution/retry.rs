//! Retrying work that lost a deadlock.

use super::connection::ConnectionError;
use tracing::warn;

/// How many times deadlocked work is attempted before giving up.
pub const MAX_DEADLOCK_RETRIES: u32 = 5;

/// Run `block` on a connection from `open`, retrying with a fresh
/// connection while it fails with [`ConnectionError::Deadlock`].
///
/// Other errors, and the final deadlock once `max_attempts` is reached, are
/// returned as is. Errors from `open` are not retried.
pub fn with_deadlock_retry<C, T, O, B>(
    max_attempts: u32,
    mut open: O,
    mut block: B,
) -> Result<T, ConnectionError>
where
    O: FnMut() -> Result<C, ConnectionError>,
    B: FnMut(&mut C) -> Result<T, ConnectionError>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut connection = open()?;
        match block(&mut connection) {
            Err(e) if e.is_deadlock() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "Deadlock, retrying on a new connection");
            }
            result => return result,
        }
    }
}
