//! Chain access used by the monitor, token cache, swap client and ledger

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use refill_types::{RefillError, RefillResult};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{UiLoadedAddresses, UiTransactionEncoding};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Signatures returned per `getSignaturesForAddress` page
const SIGNATURE_PAGE_SIZE: usize = 1_000;

/// Raw mint or token account as stored on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// The parts of a confirmed transaction the ledger needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSnapshot {
    pub signature: String,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub block_time: Option<i64>,
    /// Static keys followed by writable then readonly lookup-table keys
    pub account_keys: Vec<Pubkey>,
}

/// Chain operations consumed by the bot
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance in lamports
    async fn get_balance(&self, address: &Pubkey) -> RefillResult<u64>;

    /// Account data, or `None` when the account does not exist
    async fn get_account_data(&self, address: &Pubkey) -> RefillResult<Option<AccountSnapshot>>;

    /// Broadcast a signed transaction
    async fn send_transaction(&self, transaction: &VersionedTransaction) -> RefillResult<Signature>;

    /// Signatures involving `address`, newest first, stopping before `until`
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        until: Option<&str>,
    ) -> RefillResult<Vec<String>>;

    async fn get_transaction(&self, signature: &str) -> RefillResult<TransactionSnapshot>;
}

/// `ChainClient` over the Solana JSON-RPC API
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    cancel: CancellationToken,
}

impl SolanaRpc {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        commitment: CommitmentConfig,
        cancel: CancellationToken,
    ) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(endpoint.to_string(), timeout, commitment);
        Self {
            client: Arc::new(client),
            commitment,
            cancel,
        }
    }

    /// Race an RPC call against the shutdown signal
    async fn guarded<T, F>(&self, operation: &str, call: F) -> RefillResult<T>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RefillError::cancelled(operation)),
            result = call => result.map_err(|e| RefillError::rpc_error(&format!("{}: {}", operation, e), None)),
        }
    }
}

fn parse_signature(signature: &str) -> RefillResult<Signature> {
    Signature::from_str(signature)
        .map_err(|e| RefillError::decode_error("transaction signature", &format!("{}: {}", signature, e)))
}

fn parse_keys(keys: &[String]) -> RefillResult<Vec<Pubkey>> {
    keys.iter()
        .map(|key| {
            Pubkey::from_str(key).map_err(|e| RefillError::decode_error("loaded address", &e.to_string()))
        })
        .collect()
}

#[async_trait]
impl ChainClient for SolanaRpc {
    async fn get_balance(&self, address: &Pubkey) -> RefillResult<u64> {
        self.guarded("getBalance", self.client.get_balance(address)).await
    }

    async fn get_account_data(&self, address: &Pubkey) -> RefillResult<Option<AccountSnapshot>> {
        let response = self
            .guarded(
                "getAccountInfo",
                self.client.get_account_with_commitment(address, self.commitment),
            )
            .await?;

        Ok(response.value.map(|account| AccountSnapshot {
            owner: account.owner,
            data: account.data,
        }))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> RefillResult<Signature> {
        self.guarded("sendTransaction", self.client.send_transaction(transaction)).await
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        until: Option<&str>,
    ) -> RefillResult<Vec<String>> {
        let until = until.map(parse_signature).transpose()?;
        let mut signatures = Vec::new();
        let mut before = None;

        loop {
            let config = GetConfirmedSignaturesForAddress2Config {
                before,
                until,
                limit: Some(SIGNATURE_PAGE_SIZE),
                commitment: Some(self.commitment),
            };
            let page = self
                .guarded(
                    "getSignaturesForAddress",
                    self.client.get_signatures_for_address_with_config(address, config),
                )
                .await?;

            let page_len = page.len();
            signatures.extend(page.into_iter().map(|status| status.signature));
            debug!(address = %address, page_len, total = signatures.len(), "Fetched signature page");

            if page_len < SIGNATURE_PAGE_SIZE {
                break;
            }
            match signatures.last() {
                Some(last) => before = Some(parse_signature(last)?),
                None => break,
            }
        }

        Ok(signatures)
    }

    async fn get_transaction(&self, signature: &str) -> RefillResult<TransactionSnapshot> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let parsed = parse_signature(signature)?;
        let confirmed = self
            .guarded(
                "getTransaction",
                self.client.get_transaction_with_config(&parsed, config),
            )
            .await?;

        let transaction = confirmed.transaction.transaction.decode().ok_or_else(|| {
            RefillError::decode_error("transaction", &format!("{} is not base64 encoded", signature))
        })?;
        let mut account_keys = transaction.message.static_account_keys().to_vec();

        let mut snapshot = TransactionSnapshot {
            signature: signature.to_string(),
            block_time: confirmed.block_time,
            ..TransactionSnapshot::default()
        };

        if let Some(meta) = confirmed.transaction.meta {
            let loaded: Option<UiLoadedAddresses> = meta.loaded_addresses.into();
            if let Some(loaded) = loaded {
                account_keys.extend(parse_keys(&loaded.writable)?);
                account_keys.extend(parse_keys(&loaded.readonly)?);
            }
            snapshot.pre_balances = meta.pre_balances;
            snapshot.post_balances = meta.post_balances;
        }

        snapshot.account_keys = account_keys;
        Ok(snapshot)
    }
}
