use mec_core::ChainCommunicationError;

/// The one revert string the protocol treats as an expected, filterable
/// outcome rather than a fault (spec §4.1, §7).
const SERVICE_NOT_OPEN: &str = "Service: not open";
/// `registerDomain` reverts with this reason when the caller already has a
/// binding in the registry.
const DOMAIN_ALREADY_REGISTERED: &str = "Domain: already registered";
/// `unregisterDomain` reverts with this reason when the caller has no
/// binding to remove.
const DOMAIN_NOT_REGISTERED: &str = "Domain: not registered";

pub(crate) fn map_transient(report: eyre::Report) -> ChainCommunicationError {
    ChainCommunicationError::Transient(report.to_string())
}

/// Classify an error surfaced while submitting or waiting on a transaction.
/// `message` is the error's `Display` rendering; ethers folds revert reasons
/// into it for both eth_call simulation failures and mined-but-reverted
/// receipts.
pub(crate) fn classify_send_error(message: &str) -> ChainCommunicationError {
    if message.contains(SERVICE_NOT_OPEN) {
        return ChainCommunicationError::ServiceNotOpen;
    }
    if message.contains(DOMAIN_ALREADY_REGISTERED) {
        return ChainCommunicationError::AlreadyRegistered;
    }
    if message.contains(DOMAIN_NOT_REGISTERED) {
        return ChainCommunicationError::NotRegistered;
    }
    if let Some(reason) = extract_revert_reason(message) {
        return ChainCommunicationError::Revert(reason);
    }
    ChainCommunicationError::Transient(message.to_string())
}

fn extract_revert_reason(message: &str) -> Option<String> {
    const MARKERS: &[&str] = &["revert", "Revert", "reverted"];
    for marker in MARKERS {
        if let Some(idx) = message.find(marker) {
            return Some(message[idx..].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_service_not_open() {
        let err = classify_send_error("execution reverted: Service: not open");
        assert!(matches!(err, ChainCommunicationError::ServiceNotOpen));
    }

    #[test]
    fn falls_back_to_transient_for_unstructured_errors() {
        let err = classify_send_error("connection refused");
        assert!(matches!(err, ChainCommunicationError::Transient(_)));
    }

    #[test]
    fn extracts_other_revert_reasons() {
        let err = classify_send_error("execution reverted: Domain: wrong caller");
        match err {
            ChainCommunicationError::Revert(reason) => {
                assert!(reason.contains("wrong caller"))
            }
            other => panic!("expected Revert, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_domain_already_registered() {
        let err = classify_send_error("execution reverted: Domain: already registered");
        assert!(err.is_already_registered());
    }

    #[test]
    fn recognizes_domain_not_registered() {
        let err = classify_send_error("execution reverted: Domain: not registered");
        assert!(err.is_not_registered());
    }
}
