//! Jupiter aggregator client
//!
//! Quotes and swap transactions come from the aggregator's HTTP API; the
//! returned transaction is signed locally and broadcast through the chain
//! client. Submission only means the RPC node accepted the transaction.

pub mod rate_limit;
pub mod token_api;
pub mod types;

pub use rate_limit::RateLimiter;
pub use token_api::JupiterTokenApi;
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use refill_types::{
    RefillError, RefillResult, TokenMetadata, DEFAULT_COMPUTE_UNIT_LIMIT,
    TOKEN_2022_COMPUTE_UNIT_LIMIT,
};
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::JupiterConfig;
use crate::logging::short_address;
use crate::rpc::ChainClient;
use crate::token_cache::TokenMetadataCache;

/// Quote and swap operations used by the trader
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> RefillResult<Quote>;

    /// Build, sign and submit the swap for `quote`
    async fn execute_swap(
        &self,
        wallet: &Keypair,
        quote: &Quote,
        priority_fee_lamports: u64,
    ) -> RefillResult<Signature>;
}

/// Query string for the quote endpoint
pub fn quote_query(request: &QuoteRequest, only_direct_routes: bool) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("inputMint", request.input_mint.clone()),
        ("outputMint", request.output_mint.clone()),
        ("amount", request.amount.to_string()),
        ("onlyDirectRoutes", only_direct_routes.to_string()),
        ("prioritizationFeeLamports", "auto".to_string()),
        ("computeUnitPriceMicroLamports", "auto".to_string()),
    ];

    if request.slippage_bps == 0 {
        query.push(("dynamicSlippage", "true".to_string()));
    } else {
        query.push(("slippageBps", request.slippage_bps.to_string()));
    }

    if !request.dexes.is_empty() {
        query.push(("dexes", request.dexes.join(",")));
    }
    query
}

/// Compute budget requested for a swap into `output`
pub fn compute_unit_limit(output: &TokenMetadata) -> u32 {
    if output.is_token_2022() {
        TOKEN_2022_COMPUTE_UNIT_LIMIT
    } else {
        DEFAULT_COMPUTE_UNIT_LIMIT
    }
}

/// Decode the base64 transaction returned by the swap endpoint
pub fn decode_swap_transaction(encoded: &str) -> RefillResult<VersionedTransaction> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| RefillError::TransactionDecodeError {
            reason: format!("invalid base64: {}", e),
        })?;
    bincode::deserialize(&bytes).map_err(|e| RefillError::TransactionDecodeError {
        reason: format!("invalid transaction bytes: {}", e),
    })
}

/// Sign every required signer slot that belongs to `wallet`
///
/// Slots owned by other keys must already carry a signature.
pub fn sign_transaction(
    mut transaction: VersionedTransaction,
    wallet: &Keypair,
) -> RefillResult<VersionedTransaction> {
    let required = transaction.message.header().num_required_signatures as usize;
    let keys = transaction.message.static_account_keys();
    if keys.len() < required {
        return Err(RefillError::TransactionDecodeError {
            reason: format!("{} required signers but only {} account keys", required, keys.len()),
        });
    }
    let signers = keys[..required].to_vec();

    transaction.signatures.resize(required, Signature::default());
    let message = transaction.message.serialize();
    let wallet_key = wallet.pubkey();

    for (index, signer) in signers.iter().enumerate() {
        if *signer == wallet_key {
            transaction.signatures[index] = wallet.sign_message(&message);
        } else if transaction.signatures[index] == Signature::default() {
            return Err(RefillError::SigningKeyMismatch {
                required: signer.to_string(),
            });
        }
    }
    Ok(transaction)
}

/// `SwapApi` over the Jupiter v6 HTTP API
pub struct JupiterClient {
    http: reqwest::Client,
    config: JupiterConfig,
    tokens: Arc<TokenMetadataCache>,
    chain: Arc<dyn ChainClient>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl JupiterClient {
    pub fn new(
        config: JupiterConfig,
        tokens: Arc<TokenMetadataCache>,
        chain: Arc<dyn ChainClient>,
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> RefillResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RefillError::http_error(&format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            tokens,
            chain,
            limiter,
            cancel,
        })
    }

    /// Warm the token cache for both sides of a quote
    async fn warm_tokens(&self, request: &QuoteRequest) -> RefillResult<()> {
        for mint in [&request.input_mint, &request.output_mint] {
            match self.tokens.get(mint).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(mint = %short_address(mint), error = %e, "Failed to load token info"),
            }
        }
        Ok(())
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> RefillResult<Quote> {
        let query = quote_query(request, self.config.only_direct_routes);
        debug!(endpoint = %self.config.quote_endpoint, ?query, "Requesting quote");

        let response = self
            .http
            .get(&self.config.quote_endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| RefillError::http_error(&format!("quote request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefillError::http_error(&format!("quote response: {}", e)))?;
        if !status.is_success() {
            return Err(RefillError::QuoteUnavailable {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RefillError::decode_error("quote response", &e.to_string()))
    }

    async fn request_swap(&self, request: &SwapRequest<'_>) -> RefillResult<SwapResponse> {
        let response = self
            .http
            .post(&self.config.swap_endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RefillError::BuildRequestError {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RefillError::BuildRequestError {
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(RefillError::BuildRequestError {
                reason: format!("status {}: {}", status, body),
            });
        }

        serde_json::from_str(&body).map_err(|e| RefillError::decode_error("swap response", &e.to_string()))
    }
}

#[async_trait]
impl SwapApi for JupiterClient {
    async fn get_quote(&self, request: &QuoteRequest) -> RefillResult<Quote> {
        self.warm_tokens(request).await?;
        self.limiter.acquire(&self.cancel).await?;

        let quote = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RefillError::cancelled("quote")),
            quote = self.fetch_quote(request) => quote?,
        };

        info!(
            input = %short_address(&quote.input_mint),
            output = %short_address(&quote.output_mint),
            in_amount = %quote.in_amount,
            out_amount = %quote.out_amount,
            price_impact_pct = %quote.price_impact_pct,
            route = %quote.route_labels(),
            "Received quote"
        );
        Ok(quote)
    }

    async fn execute_swap(
        &self,
        wallet: &Keypair,
        quote: &Quote,
        priority_fee_lamports: u64,
    ) -> RefillResult<Signature> {
        let output = self.tokens.get(&quote.output_mint).await?;
        let request = SwapRequest {
            user_public_key: wallet.pubkey().to_string(),
            wrap_and_unwrap_sol: true,
            use_shared_accounts: true,
            prioritization_fee_lamports: priority_fee_lamports,
            as_legacy_transaction: false,
            use_token_ledger: false,
            dynamic_compute_unit_limit: true,
            skip_user_accounts_rpc_calls: true,
            quote_response: quote,
            compute_unit_limit: compute_unit_limit(&output),
            compute_unit_price: 0,
        };
        debug!(
            priority_fee_lamports,
            compute_unit_limit = request.compute_unit_limit,
            token_2022 = output.is_token_2022(),
            "Submitting swap request"
        );

        self.limiter.acquire(&self.cancel).await?;
        let swap = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RefillError::cancelled("swap build")),
            swap = self.request_swap(&request) => swap?,
        };

        let transaction = decode_swap_transaction(&swap.swap_transaction)?;
        let signed = sign_transaction(transaction, wallet)?;

        let signature = self.chain.send_transaction(&signed).await.map_err(|e| {
            if e.is_cancelled() {
                e
            } else {
                RefillError::SubmissionError {
                    reason: e.to_string(),
                }
            }
        })?;

        info!(signature = %signature, "Swap transaction submitted");
        Ok(signature)
    }
}
