use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use refill_bot::config::LoggingConfig;
use refill_bot::{create_example_config, logging, Bot, BotConfig};

#[derive(Parser, Debug)]
#[command(name = "refill-bot")]
#[command(about = "Swaps surplus SOL into a token-2022 asset whenever the wallet balance allows")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "refill.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the wallet and swap until interrupted
    Run,

    /// Update and summarize payouts received from the dividend address
    Dividends {
        /// Wallet to scan (defaults to the configured wallet)
        #[arg(long)]
        wallet: Option<String>,
    },

    /// Show token metadata, including on-chain extensions
    TokenInfo {
        mint: String,

        /// Bypass the metadata cache
        #[arg(long)]
        refresh: bool,
    },

    /// Write an example configuration file
    InitConfig { path: PathBuf },
}

fn load_config(cli: &Cli) -> Result<BotConfig> {
    let mut config = BotConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

/// Cancel `cancel` on Ctrl-C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        let mut logging_config = LoggingConfig::default();
        if let Some(level) = &cli.log_level {
            logging_config.level = level.clone();
        }
        let _guard = logging::init(&logging_config)?;
        create_example_config(path)?;
        info!(path = %path.display(), "Example configuration written");
        return Ok(());
    }

    let config = load_config(&cli)?;
    let _guard = logging::init(&config.logging)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let bot = Bot::connect(config, &cancel)?;

    match cli.command {
        Command::Run => {
            info!(wallet = %bot.wallet(), "Starting refill bot");
            bot.run().await?;
            let stats = bot.stats().await;
            info!(
                total_swaps = stats.total_swaps,
                successful_swaps = stats.successful_swaps,
                failed_swaps = stats.failed_swaps,
                "Session summary"
            );
        }
        Command::Dividends { wallet } => {
            let wallet = wallet
                .as_deref()
                .map(Pubkey::from_str)
                .transpose()
                .context("Invalid wallet address")?;
            let aggregates = bot.dividends(wallet).await?;
            info!(
                total = %aggregates.total,
                last_24h = %aggregates.last_24h,
                last_7d = %aggregates.last_7d,
                last_30d = %aggregates.last_30d,
                transfers = aggregates.transfer_count,
                last_received = ?aggregates.last_received,
                "Dividend summary"
            );
        }
        Command::TokenInfo { mint, refresh } => {
            let token = bot.token_info(&mint, refresh).await?;
            info!(
                address = %token.address,
                symbol = %token.symbol,
                name = %token.name,
                decimals = token.decimals,
                token_2022 = token.is_token_2022(),
                tags = ?token.tags,
                "Token info"
            );
            if let Some(fee) = &token.transfer_fee {
                info!(bps = fee.bps, max_fee = fee.max_fee, collector = %fee.collector, "Transfer fee");
            }
            if let Some(rate) = &token.interest_rate {
                info!(rate_bps = rate.current_rate_bps, apy = %rate.apy, last_update_slot = rate.last_update_slot, "Interest rate");
            }
            if let Some(delegate) = &token.permanent_delegate {
                info!(delegate = %delegate, "Permanent delegate");
            }
            if let Some(authority) = &token.mint_authority {
                info!(authority = %authority, "Mint authority");
            }
            if let Some(authority) = &token.freeze_authority {
                info!(authority = %authority, "Freeze authority");
            }
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
