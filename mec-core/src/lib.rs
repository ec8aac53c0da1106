//! Domain types shared by every component of the federation system.
//!
//! This crate has no I/O: it is the vocabulary that `ledger-adapter`,
//! `domain-orchestrator`, and `federation-manager` all speak. Keeping it
//! free of `tokio`/`ethers`-provider dependencies means it can be unit
//! tested without a chain or a container runtime in the loop.

mod error;
mod telemetry;
pub mod types;

pub use error::ChainCommunicationError;
pub use telemetry::PhaseRecorder;
pub use types::bid::{cheapest, qualifying, Bid};
pub use types::domain::{DomainRegistration, Role};
pub use types::endpoint::{subnet_for_node, vxlan_id_for_node, vxlan_port_for_node, Endpoint};
pub use types::service::{DeploymentRecord, ServiceRequest, ServiceState};
pub use types::service_id::ServiceId;

/// Convenience alias used throughout the ledger-facing crates.
pub type ChainResult<T> = std::result::Result<T, ChainCommunicationError>;
