//! Ambient agent scaffolding shared by the Domain Orchestrator and the
//! Federation Manager: settings loading, tracing setup, Prometheus metrics,
//! and the `BaseAgent` supervision trait.

pub mod agent;
#[macro_use]
pub mod macros;
pub mod metrics;
pub mod settings;

pub use agent::{agent_main, run_all, BaseAgent, FederationAgentCore, NewFromSettings};
pub use metrics::CoreMetrics;
pub use settings::Settings;
