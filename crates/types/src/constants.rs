//! Constants shared across the refill bot

// ============================================================================
// Chain Constants
// ============================================================================

/// Decimals of the native SOL balance
pub const SOL_DECIMALS: u8 = 9;

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Wrapped SOL mint
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Basis points denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

// ============================================================================
// Mint Layout
// ============================================================================

/// Size of the base SPL mint layout preceding any extension record
pub const BASE_MINT_LEN: usize = 82;

/// Size of the little-endian extension tag at the start of a record
pub const EXTENSION_TAG_LEN: usize = 2;

/// Minimum buffer past the base layout before a transfer fee record is inspected
pub const TRANSFER_FEE_MIN_LEN: usize = 16;

/// Full transfer fee record: tag, bps, maximum fee, collector
pub const TRANSFER_FEE_RECORD_LEN: usize = 44;

/// Full interest-bearing record: tag, rate, padding, last update slot
pub const INTEREST_BEARING_RECORD_LEN: usize = 24;

/// Full permanent delegate record: tag, delegate
pub const PERMANENT_DELEGATE_RECORD_LEN: usize = 34;

// ============================================================================
// Swap Constants
// ============================================================================

/// Compute unit limit requested for ordinary swaps
pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Compute unit limit requested when the output token is a token-2022 mint
pub const TOKEN_2022_COMPUTE_UNIT_LIMIT: u32 = 400_000;

/// Default priority fee attached to swap transactions
pub const DEFAULT_PRIORITY_FEE_LAMPORTS: u64 = 36_699;

/// Tag the token directory attaches to token-2022 mints
pub const TOKEN_2022_TAG: &str = "token-2022";

// ============================================================================
// Default Endpoints
// ============================================================================

pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

pub const DEFAULT_QUOTE_ENDPOINT: &str = "https://quote-api.jup.ag/v6/quote";

pub const DEFAULT_SWAP_ENDPOINT: &str = "https://quote-api.jup.ag/v6/swap";

pub const DEFAULT_TOKEN_API_ENDPOINT: &str = "https://tokens.jup.ag/token";

// ============================================================================
// Ledger Constants
// ============================================================================

/// Number of wallet address characters used in the ledger file name
pub const LEDGER_KEY_PREFIX_LEN: usize = 8;

/// Ledger scans log progress every this many signatures
pub const LEDGER_PROGRESS_INTERVAL: usize = 50;
