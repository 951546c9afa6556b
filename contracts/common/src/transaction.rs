//! All-or-nothing execution
//!
//! State here is plain owned data, so a transaction is a snapshot taken
//! before the operation and written back if the operation fails.

use tracing::debug;

use crate::errors::AusdResult;

/// Runs `op` against `state`; on error `state` is restored to its value
/// before the call and the error is returned unchanged
pub fn transactional<S, T, F>(state: &mut S, op: F) -> AusdResult<T>
where
    S: Clone,
    F: FnOnce(&mut S) -> AusdResult<T>,
{
    let snapshot = state.clone();
    match op(state) {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!(code = err.code(), "rolling back");
            *state = snapshot;
            Err(err)
        }
    }
}
