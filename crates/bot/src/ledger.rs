//! Incremental, persisted history of payouts received from one source address

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};
use refill_types::{
    from_raw, RefillError, RefillResult, LEDGER_KEY_PREFIX_LEN, LEDGER_PROGRESS_INTERVAL, SOL_DECIMALS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, info, warn};

use crate::logging::short_address;
use crate::rpc::{ChainClient, TransactionSnapshot};

/// One inbound transfer, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub signature: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub pre_balance: Decimal,
    pub post_balance: Decimal,
}

/// Persisted ledger for a single wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferLedger {
    pub last_update: DateTime<Utc>,
    /// Newest signature already listed; empty until the first scan
    #[serde(default)]
    pub last_signature: String,
    #[serde(default)]
    pub transactions: BTreeMap<String, TransferRecord>,
    /// Signatures behind the watermark whose fetch failed
    #[serde(default)]
    pub pending: BTreeSet<String>,
}

impl TransferLedger {
    pub fn watermark(&self) -> Option<&str> {
        if self.last_signature.is_empty() {
            None
        } else {
            Some(&self.last_signature)
        }
    }
}

/// Rolling totals over the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferAggregates {
    pub total: Decimal,
    pub last_24h: Decimal,
    pub last_7d: Decimal,
    pub last_30d: Decimal,
    pub transfer_count: usize,
    pub last_received: Option<DateTime<Utc>>,
}

impl TransferAggregates {
    /// Recomputed from every record on each call
    pub fn from_ledger(ledger: &TransferLedger, now: DateTime<Utc>) -> Self {
        let mut aggregates = Self::default();
        for record in ledger.transactions.values() {
            aggregates.total += record.amount;
            aggregates.transfer_count += 1;

            let age = now - record.timestamp;
            if age <= Duration::days(1) {
                aggregates.last_24h += record.amount;
            }
            if age <= Duration::days(7) {
                aggregates.last_7d += record.amount;
            }
            if age <= Duration::days(30) {
                aggregates.last_30d += record.amount;
            }

            if aggregates.last_received.map_or(true, |last| record.timestamp > last) {
                aggregates.last_received = Some(record.timestamp);
            }
        }
        aggregates
    }
}

/// Ledger files under one directory, one per wallet
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, wallet: &Pubkey) -> PathBuf {
        let wallet = wallet.to_string();
        let key: String = wallet.chars().take(LEDGER_KEY_PREFIX_LEN).collect();
        self.dir.join(format!("dividend_cache_{}.json", key))
    }

    /// A missing file is an empty ledger
    pub fn load(&self, wallet: &Pubkey) -> RefillResult<TransferLedger> {
        let path = self.path_for(wallet);
        if !path.exists() {
            debug!(path = %path.display(), "No ledger file, starting empty");
            return Ok(TransferLedger::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let ledger = serde_json::from_str(&content)
            .map_err(|e| RefillError::decode_error("transfer ledger", &e.to_string()))?;
        Ok(ledger)
    }

    pub fn save(&self, wallet: &Pubkey, ledger: &TransferLedger) -> RefillResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let path = self.path_for(wallet);
        let content = serde_json::to_string_pretty(ledger)?;
        std::fs::write(&path, content).map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> RefillError {
    RefillError::io_error(&path.display().to_string(), &e.to_string())
}

/// Balance increase at `wallet` in a transaction that touched `source`
pub fn transfer_amount(tx: &TransactionSnapshot, source: &Pubkey, wallet: &Pubkey) -> Option<(u64, u64)> {
    if !tx.account_keys.contains(source) {
        return None;
    }
    let index = tx.account_keys.iter().position(|key| key == wallet)?;
    let pre = *tx.pre_balances.get(index)?;
    let post = *tx.post_balances.get(index)?;
    (post > pre).then_some((pre, post))
}

fn lamports_to_sol(lamports: u64) -> RefillResult<Decimal> {
    from_raw(lamports, SOL_DECIMALS)
}

/// Scans a wallet's history for payouts from `source`, resuming from the
/// persisted watermark
pub struct TransferLedgerCache {
    chain: Arc<dyn ChainClient>,
    store: LedgerStore,
    source: Pubkey,
}

impl TransferLedgerCache {
    pub fn new(chain: Arc<dyn ChainClient>, store: LedgerStore, source: Pubkey) -> Self {
        Self { chain, store, source }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Bring the ledger up to date and return the aggregates
    ///
    /// The watermark always advances to the newest listed signature. Fetches
    /// that fail, or are cut short by cancellation, land in the ledger's
    /// pending set and are retried on the next call. The ledger is written
    /// even when the scan stops early.
    pub async fn refresh(&self, wallet: &Pubkey) -> RefillResult<TransferAggregates> {
        let start = Instant::now();
        info!(
            wallet = %short_address(&wallet.to_string()),
            source = %short_address(&self.source.to_string()),
            "Fetching transfer history"
        );

        let mut ledger = self.store.load(wallet)?;
        let watermark = ledger.watermark().map(str::to_string);
        match &watermark {
            Some(sig) => debug!(since = %short_address(sig), "Resuming from watermark"),
            None => debug!("No watermark, scanning full history"),
        }

        let listed = self
            .chain
            .get_signatures_for_address(wallet, watermark.as_deref())
            .await?;
        let signatures: Vec<String> = listed
            .into_iter()
            .take_while(|sig| Some(sig.as_str()) != watermark.as_deref())
            .collect();

        let mut queue = signatures.clone();
        queue.extend(ledger.pending.iter().filter(|sig| !signatures.contains(sig)).cloned());
        info!(total = queue.len(), retrying = ledger.pending.len(), "Processing transactions");

        let mut processed = 0usize;
        let mut found = 0usize;

        for (index, signature) in queue.iter().enumerate() {
            processed += 1;
            if processed % LEDGER_PROGRESS_INTERVAL == 0 {
                info!(
                    processed,
                    total = queue.len(),
                    found,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Processing progress"
                );
            }

            if ledger.transactions.contains_key(signature) {
                ledger.pending.remove(signature);
                continue;
            }

            let tx = match self.chain.get_transaction(signature).await {
                Ok(tx) => tx,
                Err(e) if e.is_cancelled() => {
                    warn!("Transfer scan cancelled, saving partial ledger");
                    let unvisited = queue[index..]
                        .iter()
                        .filter(|sig| !ledger.transactions.contains_key(*sig))
                        .cloned()
                        .collect::<Vec<_>>();
                    ledger.pending.extend(unvisited);
                    break;
                }
                Err(e) => {
                    debug!(signature = %short_address(signature), error = %e, "Failed to get transaction");
                    ledger.pending.insert(signature.clone());
                    continue;
                }
            };
            ledger.pending.remove(signature);

            if tx.pre_balances.is_empty() || tx.post_balances.is_empty() {
                continue;
            }
            let Some((pre, post)) = transfer_amount(&tx, &self.source, wallet) else {
                continue;
            };

            let pre_balance = lamports_to_sol(pre)?;
            let post_balance = lamports_to_sol(post)?;
            let amount = post_balance - pre_balance;
            let timestamp = tx
                .block_time
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_else(Utc::now);

            debug!(
                signature = %short_address(signature),
                amount = %amount,
                pre_balance = %pre_balance,
                post_balance = %post_balance,
                "Found transfer"
            );
            found += 1;
            ledger.transactions.insert(
                signature.clone(),
                TransferRecord {
                    signature: signature.clone(),
                    amount,
                    timestamp,
                    pre_balance,
                    post_balance,
                },
            );
        }

        if let Some(newest) = signatures.first() {
            ledger.last_signature = newest.clone();
        }
        if !ledger.pending.is_empty() {
            warn!(pending = ledger.pending.len(), "Some transactions could not be fetched, will retry");
        }

        ledger.last_update = Utc::now();
        if let Err(e) = self.store.save(wallet, &ledger) {
            error!(error = %e, "Failed to save transfer ledger");
        }

        let aggregates = TransferAggregates::from_ledger(&ledger, Utc::now());
        info!(
            total_txs = ledger.transactions.len(),
            new_txs = signatures.len(),
            processed,
            found,
            total_amount = %aggregates.total,
            last_24h = %aggregates.last_24h,
            last_7d = %aggregates.last_7d,
            last_30d = %aggregates.last_30d,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transfer history processed"
        );
        Ok(aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refill_types::LAMPORTS_PER_SOL;
    use tempfile::TempDir;

    fn record(signature: &str, amount: Decimal, timestamp: DateTime<Utc>) -> TransferRecord {
        TransferRecord {
            signature: signature.to_string(),
            amount,
            timestamp,
            pre_balance: Decimal::ZERO,
            post_balance: amount,
        }
    }

    #[test]
    fn test_aggregate_windows() {
        let now = Utc::now();
        let mut ledger = TransferLedger::default();
        for (sig, amount, age) in [
            ("a", Decimal::new(1, 1), Duration::hours(2)),
            ("b", Decimal::new(2, 1), Duration::days(3)),
            ("c", Decimal::new(3, 1), Duration::days(20)),
            ("d", Decimal::new(4, 1), Duration::days(90)),
        ] {
            ledger.transactions.insert(sig.to_string(), record(sig, amount, now - age));
        }

        let aggregates = TransferAggregates::from_ledger(&ledger, now);
        assert_eq!(aggregates.total, Decimal::ONE);
        assert_eq!(aggregates.last_24h, Decimal::new(1, 1));
        assert_eq!(aggregates.last_7d, Decimal::new(3, 1));
        assert_eq!(aggregates.last_30d, Decimal::new(6, 1));
        assert_eq!(aggregates.transfer_count, 4);
        assert_eq!(aggregates.last_received, Some(now - Duration::hours(2)));
    }

    #[test]
    fn test_empty_ledger_aggregates() {
        let aggregates = TransferAggregates::from_ledger(&TransferLedger::default(), Utc::now());
        assert_eq!(aggregates, TransferAggregates::default());
    }

    #[test]
    fn test_transfer_amount_requires_source_and_increase() {
        let wallet = Pubkey::new_unique();
        let source = Pubkey::new_unique();
        let tx = TransactionSnapshot {
            signature: "sig".to_string(),
            pre_balances: vec![5_000, 1_000],
            post_balances: vec![4_000, 1_500],
            block_time: Some(1_700_000_000),
            account_keys: vec![source, wallet],
        };
        assert_eq!(transfer_amount(&tx, &source, &wallet), Some((1_000, 1_500)));

        let unrelated = TransactionSnapshot {
            account_keys: vec![Pubkey::new_unique(), wallet],
            ..tx.clone()
        };
        assert_eq!(transfer_amount(&unrelated, &source, &wallet), None);

        let outgoing = TransactionSnapshot {
            pre_balances: vec![5_000, 1_500],
            post_balances: vec![5_500, 1_000],
            ..tx
        };
        assert_eq!(transfer_amount(&outgoing, &source, &wallet), None);
    }

    #[test]
    fn test_store_round_trip() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = LedgerStore::new(dir.path().join("cache"));
        let wallet = Pubkey::new_unique();

        assert_eq!(store.load(&wallet)?, TransferLedger::default());

        let mut ledger = TransferLedger::default();
        ledger.last_signature = "sigB".to_string();
        ledger
            .transactions
            .insert("sigB".to_string(), record("sigB", Decimal::new(25, 2), Utc::now()));
        ledger.pending.insert("sigA".to_string());
        store.save(&wallet, &ledger)?;

        let path = store.path_for(&wallet);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert_eq!(name, format!("dividend_cache_{}.json", &wallet.to_string()[..8]));
        assert_eq!(store.load(&wallet)?, ledger);
        Ok(())
    }

    #[test]
    fn test_ledger_without_pending_set_loads() -> anyhow::Result<()> {
        let ledger: TransferLedger = serde_json::from_str(
            r#"{"last_update": "2024-01-01T00:00:00Z", "last_signature": "sigB", "transactions": {}}"#,
        )?;
        assert_eq!(ledger.watermark(), Some("sigB"));
        assert!(ledger.pending.is_empty());
        Ok(())
    }

    #[test]
    fn test_lamports_to_sol() {
        assert_eq!(lamports_to_sol(LAMPORTS_PER_SOL / 4).unwrap(), Decimal::new(25, 2));
    }
}
