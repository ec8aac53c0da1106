use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};

use mec_core::{Bid, ChainCommunicationError, ChainResult, Endpoint, ServiceId, ServiceState};

use crate::bytes32::{from_bytes32, to_bytes32};
use crate::contract::FederationContract;
use crate::cursor::{decode_logs, EventCursor};
use crate::error::{classify_send_error, map_transient};
use crate::events::{AnnouncementEvent, BidEvent, ClosedEvent, RegisteredEvent};
use crate::nonce::NonceManager;
use crate::retry::with_retry;

/// Default lookback window applied to every restarted event filter, in
/// blocks (spec §4.1: "default 10-20 blocks").
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 12;

/// How long a mined-transaction wait is allowed to take before the adapter
/// gives up and surfaces `Timeout`.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// The only surface through which the rest of the system touches the
/// ledger (spec §4.1). One concrete, `ethers`-backed implementation
/// ([`EthereumLedgerAdapter`]) exists; callers depend on this trait so
/// Federation Manager logic can be unit tested against a `mockall` mock.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    async fn register_domain(&self, name: &str) -> ChainResult<H256>;
    async fn unregister_domain(&self) -> ChainResult<H256>;
    async fn announce_service(
        &self,
        domain_name: &str,
        requirements: &str,
        consumer_endpoint: &Endpoint,
    ) -> ChainResult<(H256, ServiceId, u64)>;
    async fn get_service_state(&self, service_id: &ServiceId) -> ChainResult<ServiceState>;
    async fn get_bid_count(&self, service_id: &ServiceId) -> ChainResult<u64>;
    async fn get_bid(&self, service_id: &ServiceId, index: u64) -> ChainResult<Bid>;
    async fn get_bids(&self, service_id: &ServiceId) -> ChainResult<Vec<Bid>>;
    async fn place_bid(&self, service_id: &ServiceId, price: u64, provider_endpoint: &Endpoint) -> ChainResult<H256>;
    async fn choose_provider(&self, service_id: &ServiceId, bid_index: u64) -> ChainResult<H256>;
    async fn is_winner(&self, service_id: &ServiceId) -> ChainResult<bool>;
    async fn service_deployed(&self, service_id: &ServiceId, federated_host: &str) -> ChainResult<H256>;
    async fn get_service_info(&self, service_id: &ServiceId, as_provider: bool) -> ChainResult<(Endpoint, Option<String>)>;

    async fn current_block(&self) -> ChainResult<u64>;
    /// `None` if the transaction hasn't been mined yet, `Some(true/false)`
    /// for its mined success/failure status.
    async fn transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<bool>>;
    async fn get_new_announcements(&self, since_block: u64) -> ChainResult<(Vec<AnnouncementEvent>, u64)>;
    async fn get_new_bids(&self, since_block: u64) -> ChainResult<(Vec<BidEvent>, u64)>;
    async fn get_new_closed(&self, since_block: u64) -> ChainResult<(Vec<ClosedEvent>, u64)>;
    async fn get_new_registrations(&self, since_block: u64) -> ChainResult<(Vec<RegisteredEvent>, u64)>;
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// `ethers`-backed implementation against an EVM-compatible ledger node.
pub struct EthereumLedgerAdapter {
    client: Arc<SignerClient>,
    contract: FederationContract<SignerClient>,
    nonce: NonceManager,
    address: Address,
}

impl EthereumLedgerAdapter {
    pub async fn connect(rpc_url: &str, contract_address: Address, private_key: H256, chain_id: u64) -> eyre::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let wallet: LocalWallet = LocalWallet::from_bytes(private_key.as_bytes())?.with_chain_id(chain_id);
        let address = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let nonce = NonceManager::new(client.as_ref(), address)
            .await
            .map_err(|e| eyre::eyre!(e.to_string()))?;
        let contract = FederationContract::new(contract_address, client.clone());
        Ok(Self {
            client,
            contract,
            nonce,
            address,
        })
    }

    fn cursor<E: ethers::contract::EthEvent>(&self, start_block: u64) -> EventCursor<SignerClient> {
        EventCursor::new::<E>(self.client.clone(), self.contract.address(), start_block, DEFAULT_LOOKBACK_BLOCKS)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> ChainResult<()> {
        let pending = self.client.get_transaction_receipt(tx_hash);
        let receipt = tokio::time::timeout(RECEIPT_TIMEOUT, pending)
            .await
            .map_err(|_| ChainCommunicationError::Timeout("transaction receipt"))?
            .map_err(|e| map_transient(eyre::eyre!(e.to_string())))?;
        match receipt {
            Some(r) if r.status == Some(1u64.into()) => Ok(()),
            Some(_) => Err(ChainCommunicationError::TransactionFailed),
            None => Err(ChainCommunicationError::Timeout("transaction receipt")),
        }
    }
}

fn state_from_u8(state: u8) -> ServiceState {
    match state {
        0 => ServiceState::Open,
        1 => ServiceState::Closed,
        _ => ServiceState::Deployed,
    }
}

#[async_trait]
impl LedgerAdapter for EthereumLedgerAdapter {
    async fn register_domain(&self, name: &str) -> ChainResult<H256> {
        let name_bytes = to_bytes32(name);
        let contract = &self.contract;
        with_retry(|| async {
            self.nonce
                .with_nonce(|nonce| async move {
                    let call = contract.register_domain(name_bytes).nonce(nonce);
                    let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                    let hash = pending.tx_hash();
                    self.wait_for_receipt(hash).await?;
                    Ok(hash)
                })
                .await
        })
        .await
    }

    async fn unregister_domain(&self) -> ChainResult<H256> {
        let contract = &self.contract;
        with_retry(|| async {
            self.nonce
                .with_nonce(|nonce| async move {
                    let call = contract.unregister_domain().nonce(nonce);
                    let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                    let hash = pending.tx_hash();
                    self.wait_for_receipt(hash).await?;
                    Ok(hash)
                })
                .await
        })
        .await
    }

    async fn announce_service(
        &self,
        domain_name: &str,
        requirements: &str,
        consumer_endpoint: &Endpoint,
    ) -> ChainResult<(H256, ServiceId, u64)> {
        let service_id = ServiceId::generate(domain_name);
        let service_id_bytes = to_bytes32(service_id.as_str());
        let requirements_bytes = to_bytes32(requirements);
        let endpoint = consumer_endpoint.format();
        let contract = &self.contract;
        let hash = with_retry(|| async {
            self.nonce
                .with_nonce(|nonce| async move {
                    let call = contract
                        .announce_service(service_id_bytes, requirements_bytes, endpoint.clone())
                        .nonce(nonce);
                    let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                    let hash = pending.tx_hash();
                    self.wait_for_receipt(hash).await?;
                    Ok(hash)
                })
                .await
        })
        .await?;
        let start_block = self.current_block().await?;
        Ok((hash, service_id, start_block))
    }

    async fn get_service_state(&self, service_id: &ServiceId) -> ChainResult<ServiceState> {
        let id = to_bytes32(service_id.as_str());
        with_retry(|| async {
            self.contract
                .get_service_state(id)
                .call()
                .await
                .map(state_from_u8)
                .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
        })
        .await
    }

    async fn get_bid_count(&self, service_id: &ServiceId) -> ChainResult<u64> {
        let id = to_bytes32(service_id.as_str());
        with_retry(|| async {
            self.contract
                .get_bid_count(id)
                .call()
                .await
                .map(|n| n.as_u64())
                .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
        })
        .await
    }

    async fn get_bid(&self, service_id: &ServiceId, index: u64) -> ChainResult<Bid> {
        let id = to_bytes32(service_id.as_str());
        with_retry(|| async {
            let (provider, price, _endpoint) = self
                .contract
                .get_bid(id, index.into())
                .call()
                .await
                .map_err(|e| map_transient(eyre::eyre!(e.to_string())))?;
            Ok(Bid::new(provider, price.as_u64(), index))
        })
        .await
    }

    async fn get_bids(&self, service_id: &ServiceId) -> ChainResult<Vec<Bid>> {
        let count = self.get_bid_count(service_id).await?;
        let mut bids = Vec::with_capacity(count as usize);
        for index in 0..count {
            bids.push(self.get_bid(service_id, index).await?);
        }
        Ok(bids)
    }

    async fn place_bid(&self, service_id: &ServiceId, price: u64, provider_endpoint: &Endpoint) -> ChainResult<H256> {
        let id = to_bytes32(service_id.as_str());
        let endpoint = provider_endpoint.format();
        let contract = &self.contract;
        self.nonce
            .with_nonce(|nonce| async move {
                let call = contract.place_bid(id, price.into(), endpoint.clone()).nonce(nonce);
                let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                let hash = pending.tx_hash();
                self.wait_for_receipt(hash).await?;
                Ok(hash)
            })
            .await
    }

    async fn choose_provider(&self, service_id: &ServiceId, bid_index: u64) -> ChainResult<H256> {
        let id = to_bytes32(service_id.as_str());
        let contract = &self.contract;
        with_retry(|| async {
            self.nonce
                .with_nonce(|nonce| async move {
                    let call = contract.choose_provider(id, bid_index.into()).nonce(nonce);
                    let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                    let hash = pending.tx_hash();
                    self.wait_for_receipt(hash).await?;
                    Ok(hash)
                })
                .await
        })
        .await
    }

    async fn is_winner(&self, service_id: &ServiceId) -> ChainResult<bool> {
        let id = to_bytes32(service_id.as_str());
        with_retry(|| async {
            self.contract
                .is_winner(id)
                .from(self.address)
                .call()
                .await
                .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
        })
        .await
    }

    async fn service_deployed(&self, service_id: &ServiceId, federated_host: &str) -> ChainResult<H256> {
        let id = to_bytes32(service_id.as_str());
        let host = federated_host.to_string();
        let contract = &self.contract;
        with_retry(|| async {
            self.nonce
                .with_nonce(|nonce| async move {
                    let call = contract.service_deployed(id, host.clone()).nonce(nonce);
                    let pending = call.send().await.map_err(|e| classify_send_error(&e.to_string()))?;
                    let hash = pending.tx_hash();
                    self.wait_for_receipt(hash).await?;
                    Ok(hash)
                })
                .await
        })
        .await
    }

    async fn get_service_info(&self, service_id: &ServiceId, as_provider: bool) -> ChainResult<(Endpoint, Option<String>)> {
        let id = to_bytes32(service_id.as_str());
        let (peer_endpoint, federated_host) = with_retry(|| async {
            self.contract
                .get_service_info(id, as_provider)
                .call()
                .await
                .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
        })
        .await?;
        let endpoint = Endpoint::parse(&peer_endpoint).map_err(|e| ChainCommunicationError::Other(eyre::eyre!(e)))?;
        let federated_host = if federated_host.is_empty() { None } else { Some(federated_host) };
        Ok((endpoint, federated_host))
    }

    async fn current_block(&self) -> ChainResult<u64> {
        self.client
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| map_transient(eyre::eyre!(e.to_string())))
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<bool>> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| map_transient(eyre::eyre!(e.to_string())))?;
        Ok(receipt.map(|r| r.status == Some(1u64.into())))
    }

    async fn get_new_announcements(&self, since_block: u64) -> ChainResult<(Vec<AnnouncementEvent>, u64)> {
        let mut cursor = self.cursor::<crate::contract::ServiceAnnouncementFilter>(since_block);
        let logs = cursor.get_new_entries().await?;
        let events = decode_logs::<crate::contract::ServiceAnnouncementFilter>(&logs)
            .into_iter()
            .map(|(ev, _)| AnnouncementEvent {
                service_id: ServiceId::from_raw(from_bytes32(ev.service_id)),
                consumer: ev.consumer,
                requirements: from_bytes32(ev.requirements),
            })
            .collect();
        Ok((events, cursor.last_polled_block()))
    }

    async fn get_new_bids(&self, since_block: u64) -> ChainResult<(Vec<BidEvent>, u64)> {
        let mut cursor = self.cursor::<crate::contract::NewBidFilter>(since_block);
        let logs = cursor.get_new_entries().await?;
        let events = decode_logs::<crate::contract::NewBidFilter>(&logs)
            .into_iter()
            .map(|(ev, _)| BidEvent {
                service_id: ServiceId::from_raw(from_bytes32(ev.service_id)),
                provider: ev.provider,
                price: ev.price.as_u64(),
                bid_index: ev.bid_index.as_u64(),
            })
            .collect();
        Ok((events, cursor.last_polled_block()))
    }

    async fn get_new_closed(&self, since_block: u64) -> ChainResult<(Vec<ClosedEvent>, u64)> {
        let mut cursor = self.cursor::<crate::contract::ServiceAnnouncementClosedFilter>(since_block);
        let logs = cursor.get_new_entries().await?;
        let events = decode_logs::<crate::contract::ServiceAnnouncementClosedFilter>(&logs)
            .into_iter()
            .map(|(ev, _)| ClosedEvent {
                service_id: ServiceId::from_raw(from_bytes32(ev.service_id)),
                winner: ev.winner,
                bid_index: ev.bid_index.as_u64(),
            })
            .collect();
        Ok((events, cursor.last_polled_block()))
    }

    async fn get_new_registrations(&self, since_block: u64) -> ChainResult<(Vec<RegisteredEvent>, u64)> {
        let mut cursor = self.cursor::<crate::contract::OperatorRegisteredFilter>(since_block);
        let logs = cursor.get_new_entries().await?;
        let events = decode_logs::<crate::contract::OperatorRegisteredFilter>(&logs)
            .into_iter()
            .map(|(ev, _)| RegisteredEvent {
                operator: ev.operator,
                name: from_bytes32(ev.name),
            })
            .collect();
        Ok((events, cursor.last_polled_block()))
    }
}
