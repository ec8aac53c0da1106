//! The only surface through which the Federation Manager touches the
//! ledger: transaction signing, nonce management, event log polling, and
//! revert-reason classification.

mod adapter;
mod bytes32;
mod contract;
pub mod cursor;
pub mod error;
pub mod events;
mod nonce;
pub mod retry;

pub use adapter::{EthereumLedgerAdapter, LedgerAdapter, DEFAULT_LOOKBACK_BLOCKS};
#[cfg(feature = "test-utils")]
pub use adapter::MockLedgerAdapter;
pub use nonce::NonceManager;
