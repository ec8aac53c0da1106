use ethers::types::Address;
use mec_core::ServiceId;

/// A decoded `OperatorRegistered` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredEvent {
    pub operator: Address,
    pub name: String,
}

/// A decoded `ServiceAnnouncement` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementEvent {
    pub service_id: ServiceId,
    pub consumer: Address,
    pub requirements: String,
}

/// A decoded `NewBid` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEvent {
    pub service_id: ServiceId,
    pub provider: Address,
    pub price: u64,
    pub bid_index: u64,
}

/// A decoded `ServiceAnnouncementClosed` log (aka "winner chosen").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedEvent {
    pub service_id: ServiceId,
    pub winner: Address,
    pub bid_index: u64,
}
