use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use mec_core::{ChainCommunicationError, ChainResult};
use tracing::warn;

/// Retry budget for `LedgerTransient` errors (spec §4.1 / §7): base 200 ms,
/// cap 2 s, at most 5 attempts total. Only `Transient` errors are retried;
/// everything else (reverts, timeouts) is returned on the first attempt.
pub async fn with_retry<F, Fut, T>(mut op: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(None)
        .build();

    const MAX_TRIES: usize = 5;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(ChainCommunicationError::Transient(msg)) if attempt < MAX_TRIES => {
                let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(2));
                warn!(attempt, %msg, ?wait, "retrying after transient ledger error");
                tokio::time::sleep(wait).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_budget() {
        let calls = AtomicUsize::new(0);
        let result: ChainResult<()> = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ChainCommunicationError::Transient("node unreachable".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_non_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result: ChainResult<()> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainCommunicationError::ServiceNotOpen) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
