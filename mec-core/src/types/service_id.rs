use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A domain-scoped unique identifier for a service request, of the form
/// `service<unix-sec>-<domain>`.
///
/// The ledger stores this as a zero-padded byte array; stripping the
/// padding happens at the `ledger-adapter` boundary, never here. This type
/// is a plain, comparable string newtype so it can be used as a `HashSet`/
/// `HashMap` key without re-deriving `Eq`/`Hash` at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Mint a fresh id for a service announced by `domain` right now.
    ///
    /// Two announcements from the same domain within the same second would
    /// collide; the ledger's `AnnounceService` call is expected to reject a
    /// duplicate id, and callers never retry a run with the same id (see
    /// spec §4.3 failure semantics), so this is not guarded against here.
    pub fn generate(domain: &str) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        Self(format!("service{secs}-{domain}"))
    }

    /// Wrap a raw id received from the ledger or an HTTP request body.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_embeds_domain_suffix() {
        let id = ServiceId::generate("consumer-a");
        assert!(id.as_str().starts_with("service"));
        assert!(id.as_str().ends_with("-consumer-a"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let id = ServiceId::from_raw("service1700000000-n2");
        let parsed: ServiceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
