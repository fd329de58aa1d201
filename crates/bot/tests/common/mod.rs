//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use refill_bot::jupiter::{Quote, QuoteRequest, SwapApi};
use refill_bot::rpc::{AccountSnapshot, ChainClient, TransactionSnapshot};
use refill_bot::token_cache::{TokenInfoSource, TokenMetadataCache};
use refill_bot::BotConfig;
use refill_types::{RefillError, RefillResult, TokenMetadata, NATIVE_MINT};
use serde_json::Map;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::VersionedTransaction;

pub const OUTPUT_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

// ============================================================================
// Chain
// ============================================================================

#[derive(Default)]
pub struct FakeChain {
    pub balance: Mutex<u64>,
    pub accounts: Mutex<HashMap<Pubkey, AccountSnapshot>>,
    /// Newest first
    pub signatures: Mutex<Vec<String>>,
    pub transactions: Mutex<HashMap<String, TransactionSnapshot>>,
    pub failing_transactions: Mutex<HashSet<String>>,
    pub balance_calls: AtomicUsize,
    pub account_calls: AtomicUsize,
    pub transaction_fetches: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, lamports: u64) {
        *self.balance.lock().unwrap() = lamports;
    }

    pub fn add_account(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address, AccountSnapshot { owner, data });
    }

    pub fn set_signatures(&self, signatures: &[&str]) {
        *self.signatures.lock().unwrap() = signatures.iter().map(|s| s.to_string()).collect();
    }

    pub fn add_transaction(&self, tx: TransactionSnapshot) {
        self.transactions.lock().unwrap().insert(tx.signature.clone(), tx);
    }

    pub fn fail_transaction(&self, signature: &str) {
        self.failing_transactions.lock().unwrap().insert(signature.to_string());
    }

    pub fn heal_transaction(&self, signature: &str) {
        self.failing_transactions.lock().unwrap().remove(signature);
    }

    pub fn fetches(&self) -> usize {
        self.transaction_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_balance(&self, _address: &Pubkey) -> RefillResult<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_account_data(&self, address: &Pubkey) -> RefillResult<Option<AccountSnapshot>> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn send_transaction(&self, _transaction: &VersionedTransaction) -> RefillResult<Signature> {
        Ok(Signature::new_unique())
    }

    async fn get_signatures_for_address(
        &self,
        _address: &Pubkey,
        until: Option<&str>,
    ) -> RefillResult<Vec<String>> {
        Ok(self
            .signatures
            .lock()
            .unwrap()
            .iter()
            .take_while(|sig| Some(sig.as_str()) != until)
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, signature: &str) -> RefillResult<TransactionSnapshot> {
        self.transaction_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_transactions.lock().unwrap().contains(signature) {
            return Err(RefillError::rpc_error("transaction unavailable", None));
        }
        self.transactions
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| RefillError::rpc_error("transaction not found", None))
    }
}

// ============================================================================
// Token directory
// ============================================================================

#[derive(Default)]
pub struct FakeTokenSource {
    pub tokens: Mutex<HashMap<String, TokenMetadata>>,
    pub fetches: AtomicUsize,
}

impl FakeTokenSource {
    pub fn with_defaults() -> Arc<Self> {
        let source = Self::default();
        source.add(TokenMetadata::new(NATIVE_MINT, "SOL", "Wrapped SOL", 9));
        source.add(TokenMetadata::new(OUTPUT_MINT, "TAX", "Taxed Token", 6));
        Arc::new(source)
    }

    pub fn add(&self, token: TokenMetadata) {
        self.tokens.lock().unwrap().insert(token.address.clone(), token);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenInfoSource for FakeTokenSource {
    async fn fetch_token(&self, address: &str) -> RefillResult<TokenMetadata> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| RefillError::http_error(&format!("unknown token {}", address)))
    }
}

pub fn token_cache(source: Arc<FakeTokenSource>, chain: Arc<FakeChain>) -> Arc<TokenMetadataCache> {
    Arc::new(TokenMetadataCache::new(source, chain, Duration::from_secs(3600)))
}

// ============================================================================
// Aggregator
// ============================================================================

pub fn quote(price_impact_pct: &str, slippage_bps: u16) -> Quote {
    Quote {
        input_mint: NATIVE_MINT.to_string(),
        output_mint: OUTPUT_MINT.to_string(),
        in_amount: "1500000000".to_string(),
        out_amount: "42000000".to_string(),
        other_amount_threshold: "41000000".to_string(),
        swap_mode: "ExactIn".to_string(),
        slippage_bps,
        platform_fee: None,
        price_impact_pct: price_impact_pct.to_string(),
        route_plan: vec![],
        context_slot: None,
        time_taken: None,
        extra: Map::new(),
    }
}

/// Records every call and replays scripted results
#[derive(Default)]
pub struct SpySwapApi {
    pub quote_requests: Mutex<Vec<QuoteRequest>>,
    pub quotes: Mutex<VecDeque<RefillResult<Quote>>>,
    pub swaps: Mutex<VecDeque<RefillResult<Signature>>>,
    pub submitted: Mutex<Vec<Quote>>,
}

impl SpySwapApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_quote(&self, quote: RefillResult<Quote>) {
        self.quotes.lock().unwrap().push_back(quote);
    }

    pub fn push_swap(&self, result: RefillResult<Signature>) {
        self.swaps.lock().unwrap().push_back(result);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_requests.lock().unwrap().len()
    }

    pub fn swap_calls(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl SwapApi for SpySwapApi {
    async fn get_quote(&self, request: &QuoteRequest) -> RefillResult<Quote> {
        self.quote_requests.lock().unwrap().push(request.clone());
        self.quotes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(quote("0.1", request.slippage_bps)))
    }

    async fn execute_swap(
        &self,
        _wallet: &Keypair,
        quote: &Quote,
        _priority_fee_lamports: u64,
    ) -> RefillResult<Signature> {
        self.submitted.lock().unwrap().push(quote.clone());
        self.swaps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Signature::new_unique()))
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub fn config() -> BotConfig {
    BotConfig::from_toml_str(&format!(
        r#"
[wallet]
min_sol_balance = "1.0"
reserve_amount = "0.1"

[token]
output_mint = "{}"
swap_amount = "1.5"
slippage_bps = 250

[monitor]
check_interval_minutes = 1
max_retries = 2
retry_delay_seconds = 1
"#,
        OUTPUT_MINT
    ))
    .unwrap()
}

/// Mint account bytes with a zeroed base layout and one transfer fee record
pub fn transfer_fee_mint(bps: u16, max_fee: u64, collector: &Pubkey) -> Vec<u8> {
    let mut data = vec![0u8; 82];
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&bps.to_le_bytes());
    data.extend_from_slice(&max_fee.to_le_bytes());
    data.extend_from_slice(collector.as_ref());
    data
}
