use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::Router;
use ledger_adapter::LedgerAdapter;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::do_client::DoClient;
use crate::settings::Settings;

mod routes;

/// One running event-subscription forwarder (spec's supplemented
/// subscription surface): a background task polling a ledger event kind and
/// POSTing new entries to `callback_url`, cancelled by dropping its handle.
pub struct Subscription {
    pub kind: String,
    pub callback_url: String,
    pub task: JoinHandle<()>,
}

/// Shared state for every Federation Manager request handler.
pub struct AppState {
    pub adapter: Arc<dyn LedgerAdapter>,
    pub do_client: DoClient,
    pub settings: Settings,
    pub subscriptions: Mutex<std::collections::HashMap<u64, Subscription>>,
    pub next_subscription_id: AtomicU64,
}

impl AppState {
    pub fn new(adapter: Arc<dyn LedgerAdapter>, settings: Settings) -> Self {
        let do_client = DoClient::new(settings.do_base_url.clone());
        Self {
            adapter,
            do_client,
            settings,
            subscriptions: Mutex::new(std::collections::HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::router()).with_state(state)
}
