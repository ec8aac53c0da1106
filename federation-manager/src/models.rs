use mec_core::ServiceId;
use serde::{Deserialize, Serialize};

/// Body of `POST /start_experiments_consumer`.
#[derive(Debug, Deserialize)]
pub struct StartConsumerRequest {
    pub requirements: String,
    /// Bids that must arrive before selection (`offers_to_wait`).
    pub offers_to_wait: u64,
    /// Optional max acceptable price; bids above it are skipped silently.
    #[serde(default)]
    pub price_threshold: Option<u64>,
}

/// Body of `POST /start_experiments_provider`.
#[derive(Debug, Deserialize)]
pub struct StartProviderRequest {
    /// Substring filter applied to an announcement's requirements field.
    #[serde(default)]
    pub requirements_filter: Option<String>,
    pub bid_price: u64,
    pub image: String,
}

/// Body of `POST /start_experiments_provider_multiple_requests`.
#[derive(Debug, Deserialize)]
pub struct StartProviderBatchedRequest {
    #[serde(default)]
    pub requirements_filter: Option<String>,
    pub bid_price: u64,
    pub image: String,
    pub requests_to_wait: u64,
}

#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub service_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RunOutcome {
    pub fn success(service_id: &ServiceId) -> Self {
        Self {
            service_id: service_id.to_string(),
            outcome: "success".to_string(),
            detail: None,
        }
    }

    pub fn success_with_detail(service_id: &ServiceId, detail: impl Into<String>) -> Self {
        Self {
            service_id: service_id.to_string(),
            outcome: "success".to_string(),
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub deployed: Vec<String>,
    pub lost: Vec<String>,
    pub skipped: Vec<String>,
}
