use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// The two roles a domain can register under for a given run. A domain may
/// hold both roles across different runs, but the ledger binds one role per
/// registered address at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Consumer,
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Provider => "provider",
        }
    }
}

/// The binding a domain establishes on the ledger before it can take part
/// in the protocol: its account address, its declared role, and a human
/// readable name used only in logs and CSV output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRegistration {
    pub address: Address,
    pub role: Role,
    pub name: String,
}

impl DomainRegistration {
    pub fn new(address: Address, role: Role, name: impl Into<String>) -> Self {
        Self {
            address,
            role,
            name: name.into(),
        }
    }
}
