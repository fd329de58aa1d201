//! Periodic wallet balance polling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refill_types::{from_raw, BalanceSample, RefillResult, SOL_DECIMALS};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::rpc::ChainClient;

/// Settings that can change while the monitor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub min_balance: Decimal,
    pub check_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

/// Receiving end of the monitor's single-slot sample channel
///
/// Only the most recent unread sample is kept.
pub struct SampleReceiver {
    inner: watch::Receiver<Option<BalanceSample>>,
}

impl SampleReceiver {
    /// Wait for a sample newer than the last one received
    ///
    /// Returns `None` once the monitor is gone.
    pub async fn recv(&mut self) -> Option<BalanceSample> {
        loop {
            self.inner.changed().await.ok()?;
            if let Some(sample) = self.inner.borrow_and_update().clone() {
                return Some(sample);
            }
        }
    }

    /// Unread sample, if any, without waiting
    pub fn try_recv(&mut self) -> Option<BalanceSample> {
        if self.inner.has_changed().unwrap_or(false) {
            self.inner.borrow_and_update().clone()
        } else {
            None
        }
    }
}

/// Polls the wallet balance and publishes threshold samples
pub struct BalanceMonitor {
    chain: Arc<dyn ChainClient>,
    wallet: Pubkey,
    settings: watch::Sender<MonitorSettings>,
    samples: watch::Sender<Option<BalanceSample>>,
    running: AtomicBool,
    stop: CancellationToken,
}

impl BalanceMonitor {
    /// `cancel` is the process shutdown signal; `stop()` only ends this monitor
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Pubkey,
        settings: MonitorSettings,
        cancel: &CancellationToken,
    ) -> Self {
        let (settings, _) = watch::channel(settings);
        let (samples, _) = watch::channel(None);
        Self {
            chain,
            wallet,
            settings,
            samples,
            running: AtomicBool::new(false),
            stop: cancel.child_token(),
        }
    }

    pub fn subscribe(&self) -> SampleReceiver {
        SampleReceiver {
            inner: self.samples.subscribe(),
        }
    }

    pub fn state(&self) -> MonitorState {
        if self.running.load(Ordering::SeqCst) {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        *self.settings.borrow()
    }

    pub fn update_min_balance(&self, min_balance: Decimal) {
        self.settings.send_modify(|settings| settings.min_balance = min_balance);
        info!(min_balance = %min_balance, "Updated minimum balance");
    }

    /// Takes effect from the next wait
    pub fn update_check_interval(&self, check_interval: Duration) {
        self.settings.send_modify(|settings| settings.check_interval = check_interval);
        info!(interval = ?check_interval, "Updated check interval");
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Fetch and classify the balance without publishing it
    pub async fn sample_balance(&self) -> RefillResult<BalanceSample> {
        let lamports = self.chain.get_balance(&self.wallet).await?;
        let amount = from_raw(lamports, SOL_DECIMALS)?;
        let min_balance = self.settings.borrow().min_balance;
        Ok(BalanceSample::observed(amount, min_balance))
    }

    /// Sample the balance and publish the result, failures included
    pub async fn check_balance(&self) -> RefillResult<BalanceSample> {
        match self.sample_balance().await {
            Ok(sample) => {
                debug!(
                    balance = %sample.amount,
                    met_threshold = sample.met_threshold,
                    "Balance checked"
                );
                self.publish(sample.clone());
                Ok(sample)
            }
            Err(e) => {
                self.publish(BalanceSample::failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Replace any unread sample
    pub fn publish(&self, sample: BalanceSample) {
        self.samples.send_replace(Some(sample));
    }

    /// Check once, then poll until stopped
    ///
    /// A failed first check aborts the monitor; later failures are
    /// published and polling continues.
    pub async fn run(&self) -> RefillResult<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(wallet = %self.wallet, interval = ?self.settings().check_interval, "Balance monitor started");

        match self.sample_balance().await {
            Ok(sample) => self.publish(sample),
            Err(e) => {
                error!(error = %e, "Initial balance check failed");
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        let mut settings = self.settings.subscribe();
        let mut last_tick = Instant::now();
        loop {
            let deadline = last_tick + settings.borrow_and_update().check_interval;
            tokio::select! {
                _ = self.stop.cancelled() => break,
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep_until(deadline) => {
                    last_tick = Instant::now();
                    if let Err(e) = self.check_balance().await {
                        if e.is_cancelled() {
                            break;
                        }
                        warn!(error = %e, "Balance check failed");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Balance monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{AccountSnapshot, TransactionSnapshot};
    use async_trait::async_trait;
    use refill_types::{RefillError, LAMPORTS_PER_SOL};
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;
    use std::sync::Mutex;

    struct FixedBalance {
        lamports: Mutex<RefillResult<u64>>,
    }

    impl FixedBalance {
        fn new(lamports: RefillResult<u64>) -> Arc<Self> {
            Arc::new(Self {
                lamports: Mutex::new(lamports),
            })
        }

        fn set(&self, lamports: RefillResult<u64>) {
            *self.lamports.lock().unwrap() = lamports;
        }
    }

    #[async_trait]
    impl ChainClient for FixedBalance {
        async fn get_balance(&self, _address: &Pubkey) -> RefillResult<u64> {
            self.lamports.lock().unwrap().clone()
        }

        async fn get_account_data(&self, _address: &Pubkey) -> RefillResult<Option<AccountSnapshot>> {
            Ok(None)
        }

        async fn send_transaction(&self, _transaction: &VersionedTransaction) -> RefillResult<Signature> {
            Err(RefillError::generic("not supported"))
        }

        async fn get_signatures_for_address(
            &self,
            _address: &Pubkey,
            _until: Option<&str>,
        ) -> RefillResult<Vec<String>> {
            Ok(vec![])
        }

        async fn get_transaction(&self, _signature: &str) -> RefillResult<TransactionSnapshot> {
            Err(RefillError::generic("not supported"))
        }
    }

    fn monitor(chain: Arc<FixedBalance>, cancel: &CancellationToken) -> BalanceMonitor {
        BalanceMonitor::new(
            chain,
            Pubkey::new_unique(),
            MonitorSettings {
                min_balance: Decimal::ONE,
                check_interval: Duration::from_secs(60),
            },
            cancel,
        )
    }

    #[tokio::test]
    async fn test_threshold_classification() {
        let chain = FixedBalance::new(Ok(LAMPORTS_PER_SOL / 2));
        let monitor = monitor(chain.clone(), &CancellationToken::new());

        let sample = monitor.sample_balance().await.unwrap();
        assert_eq!(sample.amount, Decimal::new(5, 1));
        assert!(!sample.met_threshold);

        chain.set(Ok(1_200_000_000));
        let sample = monitor.sample_balance().await.unwrap();
        assert_eq!(sample.amount, Decimal::new(12, 1));
        assert!(sample.met_threshold);
    }

    #[tokio::test]
    async fn test_unread_sample_is_replaced() {
        let monitor = monitor(FixedBalance::new(Ok(0)), &CancellationToken::new());
        let mut samples = monitor.subscribe();

        monitor.publish(BalanceSample::observed(Decimal::new(5, 1), Decimal::ONE));
        monitor.publish(BalanceSample::observed(Decimal::new(12, 1), Decimal::ONE));

        let sample = samples.recv().await.unwrap();
        assert_eq!(sample.amount, Decimal::new(12, 1));
        assert!(samples.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_check_is_published() {
        let chain = FixedBalance::new(Err(RefillError::rpc_error("down", None)));
        let monitor = monitor(chain, &CancellationToken::new());
        let mut samples = monitor.subscribe();

        assert!(monitor.check_balance().await.is_err());
        let sample = samples.try_recv().unwrap();
        assert_eq!(sample.error, Some(RefillError::rpc_error("down", None)));
        assert!(!sample.met_threshold);
    }

    #[tokio::test]
    async fn test_initial_failure_stops_monitor() {
        let chain = FixedBalance::new(Err(RefillError::rpc_error("down", None)));
        let monitor = monitor(chain, &CancellationToken::new());
        let mut samples = monitor.subscribe();

        assert!(monitor.run().await.is_err());
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(samples.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_stopped() {
        let chain = FixedBalance::new(Ok(LAMPORTS_PER_SOL));
        let cancel = CancellationToken::new();
        let monitor = Arc::new(monitor(chain, &cancel));
        let mut samples = monitor.subscribe();

        let task = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });

        let first = samples.recv().await.unwrap();
        assert!(first.met_threshold);
        assert_eq!(monitor.state(), MonitorState::Running);

        monitor.update_min_balance(Decimal::TWO);
        assert_eq!(monitor.settings().min_balance, Decimal::TWO);

        let second = samples.recv().await.unwrap();
        assert!(!second.met_threshold);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
