use std::sync::Arc;

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, Filter, Log, H256};

use mec_core::ChainResult;

use crate::error::map_transient;

/// A restartable event filter scoped from a start block, with a small
/// lookback window to catch logs emitted between two polling cycles.
///
/// Per spec §9 ("Event polling vs. subscriptions"): WebSocket subscriptions
/// can silently drop logs across a reorg, so every event stream in this
/// system is consumed by re-querying `eth_getLogs` rather than subscribing.
pub struct EventCursor<M> {
    client: Arc<M>,
    address: Address,
    event_signature: H256,
    start_block: u64,
    lookback: u64,
    last_polled_block: u64,
}

impl<M: Middleware + 'static> EventCursor<M> {
    pub fn new<E: EthEvent>(client: Arc<M>, address: Address, start_block: u64, lookback: u64) -> Self {
        Self {
            client,
            address,
            event_signature: E::signature(),
            start_block,
            lookback,
            last_polled_block: start_block,
        }
    }

    fn filter(&self, from: u64) -> Filter {
        Filter::new()
            .address(self.address)
            .topic0(self.event_signature)
            .from_block(BlockNumber::Number(from.into()))
            .to_block(BlockNumber::Latest)
    }

    async fn query(&self, from: u64) -> ChainResult<Vec<Log>> {
        self.client
            .get_logs(&self.filter(from))
            .await
            .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
    }

    /// All matching logs since the filter's start block, for a full re-scan.
    pub async fn get_all_entries(&mut self) -> ChainResult<Vec<Log>> {
        let logs = self.query(self.start_block).await?;
        if let Some(tip) = logs.iter().filter_map(|l| l.block_number).max() {
            self.last_polled_block = tip.as_u64();
        }
        Ok(logs)
    }

    /// Only logs since the last call (minus the lookback window), for tight
    /// poll loops.
    pub async fn get_new_entries(&mut self) -> ChainResult<Vec<Log>> {
        let from = self.last_polled_block.saturating_sub(self.lookback);
        let logs = self.query(from).await?;
        if let Some(tip) = logs.iter().filter_map(|l| l.block_number).max() {
            self.last_polled_block = tip.as_u64();
        }
        Ok(logs)
    }

    pub fn last_polled_block(&self) -> u64 {
        self.last_polled_block
    }
}

/// Decode every log whose topics match `E`, skipping (not failing on) any
/// log that turns out not to decode — a defensive measure against topic0
/// hash collisions across unrelated contracts at the same address filter.
pub fn decode_logs<E: EthEvent>(logs: &[Log]) -> Vec<(E, Log)> {
    logs.iter()
        .filter_map(|log| {
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            E::decode_log(&raw).ok().map(|event| (event, log.clone()))
        })
        .collect()
}
