//! Swap execution pipeline

use std::sync::Arc;

use chrono::Utc;
use refill_types::{
    effective_slippage_bps, from_raw_str, max_price_impact_pct, parse_price_impact, to_raw,
    RefillError, RefillResult, SwapOutcome,
};
use rust_decimal::Decimal;
use solana_sdk::signature::Keypair;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::jupiter::{Quote, QuoteRequest, SwapApi};
use crate::logging::short_address;
use crate::retry::{with_retry, RetryPolicy};
use crate::token_cache::TokenMetadataCache;

/// Trade parameters taken from the `token` and `wallet` sections
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSettings {
    pub input_mint: String,
    pub output_mint: String,
    pub swap_amount: Decimal,
    pub reserve_amount: Decimal,
    pub slippage_bps: u16,
    pub priority_fee_lamports: u64,
    pub dexes: Vec<String>,
}

impl From<&BotConfig> for TradeSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            input_mint: config.token.input_mint.clone(),
            output_mint: config.token.output_mint.clone(),
            swap_amount: config.token.swap_amount,
            reserve_amount: config.wallet.reserve_amount,
            slippage_bps: config.token.slippage_bps,
            priority_fee_lamports: config.token.priority_fee_lamports,
            dexes: config.token.dexes.clone(),
        }
    }
}

/// Reject quotes whose price impact exceeds the slippage budget
///
/// Returns the impact magnitude in percent. The budget is the effective
/// slippage alone, so a zero budget only admits zero-impact quotes even when
/// the aggregator picked its own slippage.
pub fn check_price_impact(quote: &Quote, slippage_bps: u16) -> RefillResult<Decimal> {
    let impact_pct = parse_price_impact(&quote.price_impact_pct)?;
    let max_pct = max_price_impact_pct(slippage_bps);
    if impact_pct > max_pct {
        return Err(RefillError::PriceImpactTooHigh { impact_pct, max_pct });
    }
    Ok(impact_pct)
}

/// Swaps the configured amount of the input token into the output token
pub struct Trader {
    settings: TradeSettings,
    api: Arc<dyn SwapApi>,
    tokens: Arc<TokenMetadataCache>,
    wallet: Arc<Keypair>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Trader {
    pub fn new(
        settings: TradeSettings,
        api: Arc<dyn SwapApi>,
        tokens: Arc<TokenMetadataCache>,
        wallet: Arc<Keypair>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            api,
            tokens,
            wallet,
            retry,
            cancel,
        }
    }

    pub fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    /// Run one swap given the wallet's current balance
    pub async fn execute(&self, balance: Decimal) -> RefillResult<SwapOutcome> {
        let required = self.settings.swap_amount + self.settings.reserve_amount;
        if balance < required {
            return Err(RefillError::InsufficientBalance {
                available: balance,
                required,
            });
        }

        let input = self.tokens.get(&self.settings.input_mint).await?;
        let output = self.tokens.get(&self.settings.output_mint).await?;

        let raw_amount = to_raw(self.settings.swap_amount, input.decimals)?;
        let slippage_bps = effective_slippage_bps(self.settings.slippage_bps, output.transfer_fee_bps());
        if output.transfer_fee_bps() > 0 {
            info!(
                token = %output.symbol,
                transfer_fee_bps = output.transfer_fee_bps(),
                base_slippage_bps = self.settings.slippage_bps,
                effective_slippage_bps = slippage_bps,
                "Widening slippage for transfer fee"
            );
        }

        let request = QuoteRequest {
            input_mint: self.settings.input_mint.clone(),
            output_mint: self.settings.output_mint.clone(),
            amount: raw_amount,
            slippage_bps,
            dexes: self.settings.dexes.clone(),
        };

        let api = &self.api;
        let request = &request;
        let quote = with_retry("quote", &self.retry, &self.cancel, move || api.get_quote(request)).await?;
        let impact_pct = check_price_impact(&quote, slippage_bps)?;

        info!(
            input = %input.symbol,
            output = %output.symbol,
            amount = %self.settings.swap_amount,
            price_impact_pct = %impact_pct,
            "Executing swap"
        );

        // The first attempt spends the quote checked above; later attempts
        // fetch and check a fresh one.
        let wallet = &self.wallet;
        let priority_fee = self.settings.priority_fee_lamports;
        let mut checked = Some((quote, impact_pct));
        let (signature, quote, impact_pct) = with_retry("swap", &self.retry, &self.cancel, || {
            let checked = checked.take();
            async move {
                let (quote, impact_pct) = match checked {
                    Some(checked) => checked,
                    None => {
                        let quote = api.get_quote(request).await?;
                        let impact_pct = check_price_impact(&quote, slippage_bps)?;
                        (quote, impact_pct)
                    }
                };
                let signature = api.execute_swap(wallet, &quote, priority_fee).await?;
                Ok((signature, quote, impact_pct))
            }
        })
        .await?;

        // The swap is already submitted, so unreadable amounts must not fail it
        let input_amount = match from_raw_str(&quote.in_amount, input.decimals) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(input = %short_address(&input.address), error = %e, "Unreadable input amount");
                self.settings.swap_amount
            }
        };
        let output_amount = match from_raw_str(&quote.out_amount, output.decimals) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(output = %short_address(&output.address), error = %e, "Unreadable output amount");
                Decimal::ZERO
            }
        };

        info!(
            signature = %signature,
            input_amount = %input_amount,
            output_amount = %output_amount,
            "Swap submitted"
        );

        Ok(SwapOutcome {
            signature: signature.to_string(),
            input_amount,
            output_amount,
            price_impact_pct: impact_pct,
            timestamp: Utc::now(),
        })
    }
}
