//! Records exchanged between the balance monitor, trader and orchestrator

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::RefillError;

// ============================================================================
// Balance Samples
// ============================================================================

/// One balance observation; produced once per poll tick
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSample {
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub met_threshold: bool,
    pub error: Option<RefillError>,
}

impl BalanceSample {
    pub fn observed(amount: Decimal, min_balance: Decimal) -> Self {
        Self {
            amount,
            timestamp: Utc::now(),
            met_threshold: amount >= min_balance,
            error: None,
        }
    }

    pub fn failed(error: RefillError) -> Self {
        Self {
            amount: Decimal::ZERO,
            timestamp: Utc::now(),
            met_threshold: false,
            error: Some(error),
        }
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Orchestrator lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    #[default]
    Idle,
    Checking,
    Swapping,
    Error,
    Stopped,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Swapping => "swapping",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Whole-value run state owned by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub current_balance: Decimal,
    pub last_swap_amount: Decimal,
    pub last_swap_timestamp: Option<DateTime<Utc>>,
    pub total_swaps: u64,
    pub error_count: u64,
    pub status: BotStatus,
}

// ============================================================================
// Swap Outcomes
// ============================================================================

/// Terminal record of a successful swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub signature: String,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    pub price_impact_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Swap counters reported by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotStats {
    pub started_at: Option<DateTime<Utc>>,
    pub total_swaps: u64,
    pub successful_swaps: u64,
    pub failed_swaps: u64,
    pub last_outcome: Option<SwapOutcome>,
}

impl BotStats {
    pub fn record_success(&mut self, outcome: SwapOutcome) {
        self.total_swaps += 1;
        self.successful_swaps += 1;
        self.last_outcome = Some(outcome);
    }

    pub fn record_failure(&mut self) {
        self.total_swaps += 1;
        self.failed_swaps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_classification() {
        let min = Decimal::new(10, 1);
        assert!(!BalanceSample::observed(Decimal::new(5, 1), min).met_threshold);
        assert!(BalanceSample::observed(Decimal::new(12, 1), min).met_threshold);
        assert!(BalanceSample::observed(min, min).met_threshold);
    }

    #[test]
    fn test_stats_counters() {
        let mut stats = BotStats::default();
        stats.record_failure();
        stats.record_success(SwapOutcome {
            signature: "sig".to_string(),
            input_amount: Decimal::ONE,
            output_amount: Decimal::new(42, 0),
            price_impact_pct: Decimal::ZERO,
            timestamp: Utc::now(),
        });
        assert_eq!(stats.total_swaps, 2);
        assert_eq!(stats.successful_swaps, 1);
        assert_eq!(stats.failed_swaps, 1);
        assert_eq!(stats.last_outcome.map(|o| o.signature), Some("sig".to_string()));
    }

    #[test]
    fn test_failed_sample_never_meets_threshold() {
        let sample = BalanceSample::failed(RefillError::rpc_error("unreachable", None));
        assert!(!sample.met_threshold);
        assert!(sample.error.is_some());
    }
}
