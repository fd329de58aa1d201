//! Shared types for the token-2022 refill bot
//!
//! This crate holds the pieces that carry no I/O: the error taxonomy, the
//! on-chain mint extension decoder, token metadata, decimal amount scaling
//! and the run-state records shared between the monitor and the orchestrator.

pub mod amount;
pub mod constants;
pub mod errors;
pub mod extensions;
pub mod state;
pub mod token;

// Re-export all public types
pub use amount::*;
pub use constants::*;
pub use errors::*;
pub use extensions::*;
pub use state::*;
pub use token::*;

/// Result type alias using the shared error type
pub type RefillResult<T> = std::result::Result<T, RefillError>;
