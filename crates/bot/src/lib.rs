//! Balance-triggered swap bot for Solana token-2022 assets
//!
//! Watches a wallet's SOL balance and, once it reaches the configured
//! threshold, swaps a fixed amount into the target token through the Jupiter
//! aggregator. Also keeps a resumable ledger of payouts received from a
//! designated source address.

pub mod bot;
pub mod config;
pub mod jupiter;
pub mod ledger;
pub mod logging;
pub mod monitor;
pub mod retry;
pub mod rpc;
pub mod token_cache;
pub mod trader;

pub use bot::Bot;
pub use config::{create_example_config, BotConfig};
pub use jupiter::{JupiterClient, JupiterTokenApi, Quote, QuoteRequest, RateLimiter, SwapApi};
pub use ledger::{LedgerStore, TransferAggregates, TransferLedger, TransferLedgerCache, TransferRecord};
pub use monitor::{BalanceMonitor, MonitorSettings, MonitorState, SampleReceiver};
pub use retry::{with_retry, RetryPolicy};
pub use rpc::{AccountSnapshot, ChainClient, SolanaRpc, TransactionSnapshot};
pub use token_cache::{TokenInfoSource, TokenMetadataCache, TtlCache};
pub use trader::{check_price_impact, TradeSettings, Trader};
