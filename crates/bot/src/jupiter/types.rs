//! Jupiter quote and swap API payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of one quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount in the input token's smallest unit
    pub amount: u64,
    /// 0 requests dynamic slippage
    pub slippage_bps: u16,
    pub dexes: Vec<String>,
}

/// Quote returned by the aggregator
///
/// Unknown fields are kept so the quote can be echoed back unchanged in the
/// swap request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    pub other_amount_threshold: String,
    #[serde(default)]
    pub swap_mode: String,
    pub slippage_bps: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_fee: Option<PlatformFee>,
    pub price_impact_pct: String,
    #[serde(default)]
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_slot: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Quote {
    /// Hop labels in route order, for logging
    pub fn route_labels(&self) -> String {
        self.route_plan
            .iter()
            .map(|step| step.swap_info.label.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFee {
    pub amount: String,
    pub fee_bps: u16,
}

/// One hop of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    #[serde(default)]
    pub label: String,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    pub fee_amount: String,
    pub fee_mint: String,
}

/// Swap-build request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest<'a> {
    pub user_public_key: String,
    pub wrap_and_unwrap_sol: bool,
    pub use_shared_accounts: bool,
    pub prioritization_fee_lamports: u64,
    pub as_legacy_transaction: bool,
    pub use_token_ledger: bool,
    pub dynamic_compute_unit_limit: bool,
    pub skip_user_accounts_rpc_calls: bool,
    pub quote_response: &'a Quote,
    pub compute_unit_limit: u32,
    /// 0 lets the aggregator price compute units
    pub compute_unit_price: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 encoded, unsigned versioned transaction
    pub swap_transaction: String,
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
}

/// Token directory entry
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfoResponse {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}
