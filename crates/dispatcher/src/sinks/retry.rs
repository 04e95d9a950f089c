//! Retry loop shared by the sinks

use std::future::Future;

use contracts::{ContractError, RetryPolicy};
use tracing::debug;

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only [`ContractError::is_transient`] errors are retried. Returns the value
/// and the number of attempts spent.
pub(crate) async fn with_retry<T, F, Fut>(
    sink_name: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), ContractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ContractError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if e.is_transient() && attempt < policy.max_attempts() => {
                let delay = policy.backoff_with_jitter(attempt, rand::random::<f64>());
                debug!(
                    sink = %sink_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying sink call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
