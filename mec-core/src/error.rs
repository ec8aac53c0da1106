/// Errors surfaced by the ledger adapter and propagated up through the
/// Federation Manager.
///
/// This mirrors the taxonomy in the design doc: transient node errors are
/// retried internally by the adapter and never reach this type; everything
/// else is surfaced verbatim so callers can distinguish an expected
/// rejection (`ServiceNotOpen`) from a true fault.
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// A transient node error survived the adapter's retry budget.
    #[error("transient ledger error: {0}")]
    Transient(String),
    /// The contract reverted. The string is the revert reason, verbatim.
    #[error("reverted: {0}")]
    Revert(String),
    /// A transaction was mined but its receipt reported failure.
    #[error("transaction failed")]
    TransactionFailed,
    /// A wait loop (event, state, receipt) exceeded its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// `RegisterDomain` called for an address that already has a binding.
    #[error("domain already registered")]
    AlreadyRegistered,
    /// `UnregisterDomain`/op called for an address with no binding.
    #[error("domain not registered")]
    NotRegistered,
    /// `PlaceBid` reverted specifically because the request closed between
    /// check and submit. Callers treat this as an expected, filterable
    /// outcome rather than a fault.
    #[error("service not open")]
    ServiceNotOpen,
    /// Anything else: provider construction failures, ABI mismatches, etc.
    #[error(transparent)]
    Other(#[from] eyre::Report),
}

impl ChainCommunicationError {
    /// `true` for the one revert string the protocol treats as expected.
    pub fn is_service_not_open(&self) -> bool {
        matches!(self, Self::ServiceNotOpen)
    }

    pub fn is_already_registered(&self) -> bool {
        matches!(self, Self::AlreadyRegistered)
    }

    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered)
    }
}
