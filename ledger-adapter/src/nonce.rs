use std::future::Future;

use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use tokio::sync::Mutex;

/// Serializes every signed write this process makes from its one account.
///
/// Holds the next nonce to use. `with_nonce` takes the lock for the whole
/// sign-then-submit call so two concurrent writers can never be handed the
/// same nonce (spec §5, nonce mutex); the nonce only advances if the
/// callback succeeds, so a failed submit is retried with the same nonce
/// (spec §4.1, "on submit failure, the nonce is not advanced").
pub struct NonceManager {
    next: Mutex<U256>,
}

impl NonceManager {
    /// Seed the counter from the node's reported transaction count for
    /// `address`.
    pub async fn new<M: Middleware>(client: &M, address: Address) -> Result<Self, M::Error> {
        let next = client.get_transaction_count(address, None).await?;
        Ok(Self {
            next: Mutex::new(next),
        })
    }

    pub async fn with_nonce<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(U256) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = self.next.lock().await;
        let nonce = *guard;
        let result = f(nonce).await;
        if result.is_ok() {
            *guard += U256::one();
        }
        result
    }

    /// Current value of the counter, for diagnostics and tests. Does not
    /// take the lock across an operation, so it is only a snapshot.
    pub async fn peek(&self) -> U256 {
        *self.next.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advances_only_on_success() {
        let mgr = NonceManager {
            next: Mutex::new(U256::from(5)),
        };

        let used: Result<(), &str> = mgr.with_nonce(|_n| async { Err("boom") }).await;
        assert!(used.is_err());
        assert_eq!(mgr.peek().await, U256::from(5));

        let used: Result<(), &str> = mgr.with_nonce(|_n| async { Ok(()) }).await;
        assert!(used.is_ok());
        assert_eq!(mgr.peek().await, U256::from(6));
    }

    #[tokio::test]
    async fn serializes_concurrent_callers() {
        let mgr = NonceManager {
            next: Mutex::new(U256::zero()),
        };
        let mut seen = Vec::new();
        for _ in 0..5 {
            let nonce = mgr
                .with_nonce(|n| async move { Ok::<_, ()>(n) })
                .await
                .unwrap();
            seen.push(nonce);
        }
        assert_eq!(
            seen,
            vec![
                U256::from(0),
                U256::from(1),
                U256::from(2),
                U256::from(3),
                U256::from(4)
            ]
        );
    }
}
