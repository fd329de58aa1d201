//! Decimal amount scaling between human-readable and smallest-unit values

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::BPS_DENOMINATOR;
use crate::errors::RefillError;
use crate::RefillResult;

/// Largest scale a `Decimal` can carry
const MAX_DECIMALS: u8 = 28;

fn check_decimals(value: &str, decimals: u8) -> RefillResult<()> {
    if decimals > MAX_DECIMALS {
        return Err(RefillError::invalid_amount(
            value,
            &format!("{} decimals exceeds the supported maximum of {}", decimals, MAX_DECIMALS),
        ));
    }
    Ok(())
}

/// Convert a human-readable amount into the token's smallest unit
///
/// `raw = round(amount * 10^decimals)` with halves rounded up.
pub fn to_raw(amount: Decimal, decimals: u8) -> RefillResult<u64> {
    let text = amount.to_string();
    check_decimals(&text, decimals)?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RefillError::invalid_amount(&text, "amount must not be negative"));
    }

    let scale = Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0);
    let scaled = amount
        .checked_mul(scale)
        .ok_or_else(|| RefillError::invalid_amount(&text, "overflow while scaling"))?;

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| RefillError::invalid_amount(&text, "does not fit in a u64"))
}

/// Convert a smallest-unit amount back into a human-readable decimal
pub fn from_raw(raw: u64, decimals: u8) -> RefillResult<Decimal> {
    check_decimals(&raw.to_string(), decimals)?;
    Ok(Decimal::from_i128_with_scale(raw as i128, decimals as u32).normalize())
}

/// Same as [`from_raw`] for the string amounts returned by the aggregator
pub fn from_raw_str(raw: &str, decimals: u8) -> RefillResult<Decimal> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| RefillError::invalid_amount(raw, &e.to_string()))?;
    from_raw(value, decimals)
}

/// Base slippage widened by the output token's transfer fee
pub fn effective_slippage_bps(base_bps: u16, transfer_fee_bps: u16) -> u16 {
    let total = base_bps as u64 + transfer_fee_bps as u64;
    total.min(BPS_DENOMINATOR) as u16
}

/// Largest tolerated price impact, as a percentage, for a slippage budget
pub fn max_price_impact_pct(slippage_bps: u16) -> Decimal {
    Decimal::new(slippage_bps as i64, 2)
}

/// Parse an aggregator price impact percentage and return its magnitude
pub fn parse_price_impact(value: &str) -> RefillResult<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map(|impact| impact.abs())
        .map_err(|_| RefillError::PriceImpactParseError {
            value: value.to_string(),
        })
}
