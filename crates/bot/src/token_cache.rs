//! Token metadata cache with on-chain extension enrichment

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use refill_types::{decode_mint, RefillResult, TokenMetadata, TOKEN_2022_TAG};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::logging::short_address;
use crate::rpc::ChainClient;

// ============================================================================
// TTL Cache
// ============================================================================

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent map whose entries expire after a fixed time-to-live
///
/// Expired entries stay in the map, and in `len()`, until the next lookup
/// of their key evicts them.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, evicting it if it has expired
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if Instant::now() >= entry.expires_at {
                entries.remove(key);
            }
        }
        None
    }

    /// Store `value`, replacing any previous entry
    pub async fn insert(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ============================================================================
// Token Metadata Cache
// ============================================================================

/// Source of base token metadata (symbol, name, decimals, tags)
#[async_trait]
pub trait TokenInfoSource: Send + Sync {
    async fn fetch_token(&self, address: &str) -> RefillResult<TokenMetadata>;
}

/// Token metadata keyed by mint address
pub struct TokenMetadataCache {
    source: Arc<dyn TokenInfoSource>,
    chain: Arc<dyn ChainClient>,
    entries: TtlCache<String, Arc<TokenMetadata>>,
    force_refresh: bool,
}

impl TokenMetadataCache {
    pub fn new(source: Arc<dyn TokenInfoSource>, chain: Arc<dyn ChainClient>, ttl: Duration) -> Self {
        Self {
            source,
            chain,
            entries: TtlCache::new(ttl),
            force_refresh: false,
        }
    }

    /// Make every plain `get` bypass cached entries
    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub async fn get(&self, address: &str) -> RefillResult<Arc<TokenMetadata>> {
        self.get_with_refresh(address, self.force_refresh).await
    }

    pub async fn get_with_refresh(&self, address: &str, force: bool) -> RefillResult<Arc<TokenMetadata>> {
        if !force {
            if let Some(token) = self.entries.get(address).await {
                debug!(mint = %short_address(address), symbol = %token.symbol, "Token cache hit");
                return Ok(token);
            }
        }

        let base = self.source.fetch_token(address).await?;
        let token = Arc::new(self.enrich(address, base).await?);
        info!(
            mint = %short_address(address),
            symbol = %token.symbol,
            decimals = token.decimals,
            token_2022 = token.is_token_2022(),
            transfer_fee_bps = token.transfer_fee_bps(),
            "Token metadata loaded"
        );

        self.entries.insert(address.to_string(), token.clone()).await;
        Ok(token)
    }

    /// Merge mint account data into `base`; only cancellation is an error
    async fn enrich(&self, address: &str, base: TokenMetadata) -> RefillResult<TokenMetadata> {
        let mint = match Pubkey::from_str(address) {
            Ok(mint) => mint,
            Err(e) => {
                warn!(mint = %address, error = %e, "Skipping on-chain enrichment for unparsable mint");
                return Ok(base);
            }
        };

        let account = match self.chain.get_account_data(&mint).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(mint = %short_address(address), "Mint account not found");
                return Ok(base);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(mint = %short_address(address), error = %e, "Failed to fetch mint account");
                return Ok(base);
            }
        };

        let mut token = base;
        if account.owner == spl_token_2022::ID && !token.is_token_2022() {
            token = token.with_tags([TOKEN_2022_TAG]);
        }

        match decode_mint(&account.data) {
            Ok(decoded) => {
                for extension in &decoded.extensions {
                    debug!(mint = %short_address(address), extension = %extension.extension_type(), "Found mint extension");
                }
                Ok(token.with_decoded_mint(decoded))
            }
            Err(e) => {
                warn!(mint = %short_address(address), error = %e, "Failed to decode mint account");
                Ok(token)
            }
        }
    }

    pub async fn clear(&self) {
        self.entries.clear().await;
    }

    pub async fn count(&self) -> usize {
        self.entries.len().await
    }
}
