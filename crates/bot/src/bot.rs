//! Orchestrator: feeds monitor samples to the trader and owns the run state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use refill_types::{BalanceSample, BotStats, BotStatus, RefillError, RefillResult, RunState, TokenMetadata};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::jupiter::{JupiterClient, JupiterTokenApi, RateLimiter, SwapApi};
use crate::ledger::{LedgerStore, TransferAggregates, TransferLedgerCache};
use crate::monitor::{BalanceMonitor, MonitorSettings};
use crate::retry::RetryPolicy;
use crate::rpc::{ChainClient, SolanaRpc};
use crate::token_cache::TokenMetadataCache;
use crate::trader::{TradeSettings, Trader};

/// Balance-triggered refill bot
pub struct Bot {
    config: BotConfig,
    wallet: Arc<Keypair>,
    chain: Arc<dyn ChainClient>,
    tokens: Arc<TokenMetadataCache>,
    trader: Trader,
    state: watch::Sender<RunState>,
    stats: Mutex<BotStats>,
    stop: CancellationToken,
    running: AtomicBool,
}

impl Bot {
    /// Assemble a bot from already-built collaborators
    pub fn new(
        config: BotConfig,
        wallet: Arc<Keypair>,
        chain: Arc<dyn ChainClient>,
        tokens: Arc<TokenMetadataCache>,
        api: Arc<dyn SwapApi>,
        cancel: &CancellationToken,
    ) -> Self {
        let stop = cancel.child_token();
        let trader = Trader::new(
            TradeSettings::from(&config),
            api,
            tokens.clone(),
            wallet.clone(),
            RetryPolicy::from(&config.monitor),
            stop.clone(),
        );
        let (state, _) = watch::channel(RunState::default());

        Self {
            config,
            wallet,
            chain,
            tokens,
            trader,
            state,
            stats: Mutex::new(BotStats::default()),
            stop,
            running: AtomicBool::new(false),
        }
    }

    /// Build the RPC, token and Jupiter clients described by `config`
    pub fn connect(config: BotConfig, cancel: &CancellationToken) -> RefillResult<Self> {
        let wallet = Arc::new(config.keypair()?);

        let chain: Arc<dyn ChainClient> = Arc::new(SolanaRpc::new(
            &config.rpc.endpoint,
            Duration::from_secs(config.rpc.timeout_seconds),
            config.commitment()?,
            cancel.clone(),
        ));
        let tokens = Arc::new(token_cache(&config, chain.clone(), cancel)?);
        let limiter = Arc::new(RateLimiter::per_second(config.jupiter.requests_per_second));
        let api = Arc::new(JupiterClient::new(
            config.jupiter.clone(),
            tokens.clone(),
            chain.clone(),
            limiter,
            cancel.clone(),
        )?);

        info!(
            wallet = %wallet.pubkey(),
            rpc = %config.rpc.endpoint,
            output_mint = %config.token.output_mint,
            "Bot initialized"
        );
        Ok(Self::new(config, wallet, chain, tokens, api, cancel))
    }

    /// Resume from a previously captured state
    pub fn with_initial_state(self, state: RunState) -> Self {
        self.state.send_replace(state);
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn wallet(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    pub fn tokens(&self) -> &Arc<TokenMetadataCache> {
        &self.tokens
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub async fn stats(&self) -> BotStats {
        self.stats.lock().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the run loop and abandon any swap in flight
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Poll the balance and swap whenever it meets the threshold
    ///
    /// Returns when stopped or cancelled, or with the monitor's error if it
    /// fails to start.
    pub async fn run(&self) -> RefillResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RefillError::generic("bot is already running"));
        }
        self.stats.lock().await.started_at = Some(Utc::now());
        self.set_status(BotStatus::Idle);

        let monitor = Arc::new(BalanceMonitor::new(
            self.chain.clone(),
            self.wallet.pubkey(),
            MonitorSettings {
                min_balance: self.config.wallet.min_sol_balance,
                check_interval: self.config.monitor.check_interval(),
            },
            &self.stop,
        ));
        let mut samples = monitor.subscribe();
        let (errors_tx, mut errors) = mpsc::channel::<RefillError>(1);

        let monitor_task = tokio::spawn({
            let monitor = monitor.clone();
            async move {
                if let Err(e) = monitor.run().await {
                    let _ = errors_tx.send(e).await;
                }
            }
        });

        info!(
            wallet = %self.wallet.pubkey(),
            min_balance = %self.config.wallet.min_sol_balance,
            swap_amount = %self.config.token.swap_amount,
            "Bot started"
        );

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                Some(e) = errors.recv() => {
                    error!(error = %e, "Balance monitor failed");
                    self.record_error();
                    result = Err(e);
                    break;
                }
                sample = samples.recv() => match sample {
                    Some(sample) => self.handle_sample(sample).await,
                    None => break,
                },
            }
        }

        monitor.stop();
        if let Err(e) = monitor_task.await {
            warn!(error = %e, "Monitor task ended abnormally");
        }

        self.set_status(BotStatus::Stopped);
        self.running.store(false, Ordering::SeqCst);
        let state = self.state();
        info!(
            total_swaps = state.total_swaps,
            error_count = state.error_count,
            "Bot stopped"
        );
        result
    }

    /// React to one balance sample
    pub async fn handle_sample(&self, sample: BalanceSample) {
        if let Some(e) = sample.error {
            warn!(error = %e, "Balance check failed");
            self.record_error();
            return;
        }

        self.state.send_modify(|state| {
            state.current_balance = sample.amount;
            state.status = BotStatus::Checking;
        });

        if !sample.met_threshold {
            debug!(
                balance = %sample.amount,
                min_balance = %self.config.wallet.min_sol_balance,
                "Balance below threshold"
            );
            self.set_status(BotStatus::Idle);
            return;
        }

        info!(balance = %sample.amount, "Balance threshold met, swapping");
        self.set_status(BotStatus::Swapping);

        let result = tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(RefillError::cancelled("swap")),
            result = self.trader.execute(sample.amount) => result,
        };

        match result {
            Ok(outcome) => {
                self.state.send_modify(|state| {
                    state.total_swaps += 1;
                    state.last_swap_amount = outcome.input_amount;
                    state.last_swap_timestamp = Some(outcome.timestamp);
                    state.status = BotStatus::Idle;
                });
                self.stats.lock().await.record_success(outcome);
            }
            Err(e) if e.is_cancelled() => {
                debug!(error = %e, "Swap cancelled");
            }
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "Swap failed");
                self.stats.lock().await.record_failure();
                self.record_error();
            }
        }
    }

    /// Resolve token metadata through the cache
    pub async fn token_info(&self, mint: &str, refresh: bool) -> RefillResult<Arc<TokenMetadata>> {
        self.tokens.get_with_refresh(mint, refresh).await
    }

    /// Update the payout ledger for `wallet` (default: the bot wallet)
    pub async fn dividends(&self, wallet: Option<Pubkey>) -> RefillResult<TransferAggregates> {
        let source = self.config.dividend_source()?.ok_or_else(|| {
            RefillError::missing_config("token.dividend_address", "required for transfer history")
        })?;
        let ledger = TransferLedgerCache::new(
            self.chain.clone(),
            LedgerStore::new(self.config.ledger.cache_dir.clone()),
            source,
        );
        ledger.refresh(&wallet.unwrap_or_else(|| self.wallet.pubkey())).await
    }

    fn set_status(&self, status: BotStatus) {
        self.state.send_modify(|state| state.status = status);
    }

    fn record_error(&self) {
        self.state.send_modify(|state| {
            state.error_count += 1;
            state.status = BotStatus::Error;
        });
    }
}

fn token_cache(
    config: &BotConfig,
    chain: Arc<dyn ChainClient>,
    cancel: &CancellationToken,
) -> RefillResult<TokenMetadataCache> {
    let source = Arc::new(JupiterTokenApi::new(
        &config.jupiter.token_api_endpoint,
        Duration::from_secs(config.jupiter.timeout_seconds),
        cancel.clone(),
    )?);
    Ok(TokenMetadataCache::new(source, chain, config.cache_ttl()).with_force_refresh(config.token.refresh_cache))
}

