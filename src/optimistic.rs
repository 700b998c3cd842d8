use std::future::Future;

use crate::client::Error;

/// Applies a local change, awaits the server call, and undoes the change if
/// the call fails.
///
/// `call` is not polled until after `apply` runs. On success the caller
/// commits whatever the server returned.
pub async fn optimistic<T, A, F, R>(apply: A, call: F, revert: R) -> Result<T, Error>
where
    A: FnOnce(),
    F: Future<Output = Result<T, Error>>,
    R: FnOnce(),
{
    apply();
    match call.await {
        Ok(value) => Ok(value),
        Err(err) => {
            revert();
            Err(err)
        }
    }
}
