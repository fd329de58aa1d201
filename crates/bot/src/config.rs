use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use refill_types::{
    RefillError, RefillResult, BPS_DENOMINATOR, DEFAULT_PRIORITY_FEE_LAMPORTS,
    DEFAULT_QUOTE_ENDPOINT, DEFAULT_RPC_ENDPOINT, DEFAULT_SWAP_ENDPOINT,
    DEFAULT_TOKEN_API_ENDPOINT, NATIVE_MINT,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

/// Environment variable that overrides `wallet.private_key`
pub const PRIVATE_KEY_ENV: &str = "REFILL_PRIVATE_KEY";

/// Bot configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub wallet: WalletConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    pub token: TokenConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub jupiter: JupiterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Wallet and balance thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
    /// Base58 encoded 64-byte keypair
    #[serde(default)]
    pub private_key: String,

    /// SOL balance at which a refill swap is triggered
    pub min_sol_balance: Decimal,

    /// SOL kept aside for fees on top of the swap amount
    #[serde(default)]
    pub reserve_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    pub endpoint: String,

    #[serde(default = "default_rpc_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_commitment")]
    pub commitment: String,
}

/// Swap pair and trade parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    #[serde(default = "default_input_mint")]
    pub input_mint: String,

    pub output_mint: String,

    /// Address whose payouts the transfer ledger tracks
    #[serde(default)]
    pub dividend_address: Option<String>,

    pub swap_amount: Decimal,

    pub slippage_bps: u16,

    /// Bypass cached token metadata on every lookup
    #[serde(default)]
    pub refresh_cache: bool,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_minutes: u64,

    #[serde(default = "default_priority_fee")]
    pub priority_fee_lamports: u64,

    /// Restrict routing to these DEX labels
    #[serde(default)]
    pub dexes: Vec<String>,
}

/// Polling and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub check_interval_minutes: u64,

    pub max_retries: u32,

    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JupiterConfig {
    pub quote_endpoint: String,

    pub swap_endpoint: String,

    pub token_api_endpoint: String,

    #[serde(default)]
    pub only_direct_routes: bool,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Log file; rotated daily when set
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    pub cache_dir: PathBuf,
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_input_mint() -> String {
    NATIVE_MINT.to_string()
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_priority_fee() -> u64 {
    DEFAULT_PRIORITY_FEE_LAMPORTS
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_http_timeout() -> u64 {
    30
}

fn parse_pubkey(field: &str, value: &str) -> RefillResult<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|e| RefillError::invalid_address(value, &format!("{}: {}", field, e)))
}

impl BotConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> RefillResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RefillError::io_error(&path.display().to_string(), &e.to_string()))?;

        let mut config = Self::from_toml_str(&content)?;
        if let Ok(private_key) = std::env::var(PRIVATE_KEY_ENV) {
            if !private_key.trim().is_empty() {
                config.wallet.private_key = private_key.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration without validating it
    pub fn from_toml_str(content: &str) -> RefillResult<Self> {
        toml::from_str(content).map_err(|e| RefillError::Serialization {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> RefillResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| RefillError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path, content)
            .map_err(|e| RefillError::io_error(&path.display().to_string(), &e.to_string()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> RefillResult<()> {
        if self.wallet.private_key.trim().is_empty() {
            return Err(RefillError::missing_config(
                "wallet.private_key",
                &format!("set it in the config file or via {}", PRIVATE_KEY_ENV),
            ));
        }

        if self.rpc.endpoint.trim().is_empty() {
            return Err(RefillError::missing_config("rpc.endpoint", "RPC endpoint is required"));
        }

        if self.token.output_mint.trim().is_empty() {
            return Err(RefillError::missing_config("token.output_mint", "output mint is required"));
        }

        if self.wallet.min_sol_balance <= Decimal::ZERO {
            return Err(RefillError::invalid_config("wallet.min_sol_balance", "must be greater than 0"));
        }

        if self.wallet.reserve_amount < Decimal::ZERO {
            return Err(RefillError::invalid_config("wallet.reserve_amount", "must not be negative"));
        }

        if self.token.swap_amount <= Decimal::ZERO {
            return Err(RefillError::invalid_config("token.swap_amount", "must be greater than 0"));
        }

        if self.token.slippage_bps as u64 > BPS_DENOMINATOR {
            return Err(RefillError::invalid_config(
                "token.slippage_bps",
                &format!("{} exceeds {} (100%)", self.token.slippage_bps, BPS_DENOMINATOR),
            ));
        }

        if self.token.cache_ttl_minutes == 0 {
            return Err(RefillError::invalid_config("token.cache_ttl_minutes", "must be greater than 0"));
        }

        if self.monitor.check_interval_minutes == 0 {
            return Err(RefillError::invalid_config("monitor.check_interval_minutes", "must be greater than 0"));
        }

        if self.jupiter.requests_per_second == 0 {
            return Err(RefillError::invalid_config("jupiter.requests_per_second", "must be greater than 0"));
        }

        self.input_mint()?;
        self.output_mint()?;
        self.dividend_source()?;
        self.commitment()?;

        Ok(())
    }

    /// Decode the wallet keypair
    pub fn keypair(&self) -> RefillResult<Keypair> {
        let bytes = bs58::decode(self.wallet.private_key.trim())
            .into_vec()
            .map_err(|e| RefillError::invalid_config("wallet.private_key", &format!("invalid base58: {}", e)))?;
        Keypair::from_bytes(&bytes)
            .map_err(|e| RefillError::invalid_config("wallet.private_key", &format!("invalid keypair: {}", e)))
    }

    pub fn input_mint(&self) -> RefillResult<Pubkey> {
        parse_pubkey("token.input_mint", &self.token.input_mint)
    }

    pub fn output_mint(&self) -> RefillResult<Pubkey> {
        parse_pubkey("token.output_mint", &self.token.output_mint)
    }

    /// Payout source for the transfer ledger, if configured
    pub fn dividend_source(&self) -> RefillResult<Option<Pubkey>> {
        match self.token.dividend_address.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(address) => parse_pubkey("token.dividend_address", address).map(Some),
        }
    }

    pub fn commitment(&self) -> RefillResult<CommitmentConfig> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|e| RefillError::invalid_config("rpc.commitment", &e.to_string()))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token.cache_ttl_minutes * 60)
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            timeout_seconds: default_rpc_timeout(),
            commitment: default_commitment(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 5,
            max_retries: 3,
            retry_delay_seconds: 5,
        }
    }
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            quote_endpoint: DEFAULT_QUOTE_ENDPOINT.to_string(),
            swap_endpoint: DEFAULT_SWAP_ENDPOINT.to_string(),
            token_api_endpoint: DEFAULT_TOKEN_API_ENDPOINT.to_string(),
            only_direct_routes: false,
            requests_per_second: default_requests_per_second(),
            timeout_seconds: default_http_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_path: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
        }
    }
}

/// Create example configuration file
pub fn create_example_config<P: AsRef<Path>>(path: P) -> RefillResult<()> {
    let example_config = BotConfig {
        wallet: WalletConfig {
            private_key: String::new(),
            min_sol_balance: Decimal::new(5, 1),
            reserve_amount: Decimal::new(5, 2),
        },
        rpc: RpcConfig::default(),
        token: TokenConfig {
            input_mint: NATIVE_MINT.to_string(),
            output_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            dividend_address: None,
            swap_amount: Decimal::new(1, 1),
            slippage_bps: 50,
            refresh_cache: false,
            cache_ttl_minutes: default_cache_ttl(),
            priority_fee_lamports: DEFAULT_PRIORITY_FEE_LAMPORTS,
            dexes: vec![],
        },
        monitor: MonitorConfig::default(),
        jupiter: JupiterConfig::default(),
        logging: LoggingConfig {
            file_path: Some(PathBuf::from("logs/refill-bot.log")),
            ..LoggingConfig::default()
        },
        ledger: LedgerConfig::default(),
    };

    example_config.save(path)?;
    Ok(())
}
