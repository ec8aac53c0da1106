use ethers::types::Address;
use serde::{Deserialize, Serialize};

use super::bid::Bid;
use super::endpoint::Endpoint;
use super::service_id::ServiceId;

/// Where a service request sits in the announce -> bid -> choose-provider ->
/// deploy -> confirm sequence. The ledger is the source of truth for this;
/// this enum mirrors its state machine so callers can match on it locally
/// after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Accepting bids.
    Open,
    /// A winning provider has been chosen; no further bids are accepted.
    Closed,
    /// The winning provider has deployed the service and published its
    /// endpoint. Terminal: confirmation is tracked by the Federation
    /// Manager's own telemetry, not as a further ledger state.
    Deployed,
}

/// A consumer's announced request for a service, as tracked on one node's
/// local view after polling the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: ServiceId,
    pub consumer: Address,
    pub description: String,
    pub max_price: u64,
    pub state: ServiceState,
    pub bids: Vec<Bid>,
    pub winner: Option<Address>,
}

impl ServiceRequest {
    pub fn new(id: ServiceId, consumer: Address, description: impl Into<String>, max_price: u64) -> Self {
        Self {
            id,
            consumer,
            description: description.into(),
            max_price,
            state: ServiceState::Open,
            bids: Vec::new(),
            winner: None,
        }
    }

    /// Whether `provider` is this request's chosen winner.
    pub fn is_winner(&self, provider: Address) -> bool {
        self.winner == Some(provider)
    }
}

/// What a provider published after deploying a service: the container's
/// reachable endpoint, recorded alongside the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub service_id: ServiceId,
    pub provider: Address,
    pub endpoint: Endpoint,
}

impl DeploymentRecord {
    pub fn new(service_id: ServiceId, provider: Address, endpoint: Endpoint) -> Self {
        Self {
            service_id,
            provider,
            endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn is_winner_matches_recorded_address() {
        let provider = Address::from_low_u64_be(7);
        let mut req = ServiceRequest::new(
            ServiceId::from_raw("service1-n1"),
            Address::from_low_u64_be(1),
            "echo-service",
            100,
        );
        assert!(!req.is_winner(provider));
        req.winner = Some(provider);
        assert!(req.is_winner(provider));
    }

    #[test]
    fn deployment_record_carries_endpoint() {
        let endpoint = Endpoint {
            ip_address: Ipv4Addr::new(10, 0, 0, 5),
            vxlan_id: Some(201),
            vxlan_port: Some(6001),
            federation_net: None,
        };
        let rec = DeploymentRecord::new(
            ServiceId::from_raw("service1-n1"),
            Address::from_low_u64_be(7),
            endpoint,
        );
        assert_eq!(rec.endpoint.vxlan_id, Some(201));
    }
}
