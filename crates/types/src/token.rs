//! Token metadata snapshots

use std::collections::BTreeSet;

use solana_program::pubkey::Pubkey;

use crate::constants::TOKEN_2022_TAG;
use crate::extensions::{DecodedMint, InterestRate, MintExtension, TransferFee};

/// Metadata for one token, merged from the token directory and the mint account
///
/// A snapshot is never mutated once cached; a refresh replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub tags: BTreeSet<String>,
    pub transfer_fee: Option<TransferFee>,
    pub interest_rate: Option<InterestRate>,
    pub permanent_delegate: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub mint_authority: Option<Pubkey>,
}

impl TokenMetadata {
    pub fn new(address: &str, symbol: &str, name: &str, decimals: u8) -> Self {
        Self {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            tags: BTreeSet::new(),
            transfer_fee: None,
            interest_rate: None,
            permanent_delegate: None,
            freeze_authority: None,
            mint_authority: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Merge on-chain data into the snapshot
    pub fn with_decoded_mint(mut self, decoded: DecodedMint) -> Self {
        self.mint_authority = decoded.authorities.mint_authority;
        self.freeze_authority = decoded.authorities.freeze_authority;
        for extension in decoded.extensions {
            match extension {
                MintExtension::TransferFee(fee) => self.transfer_fee = Some(fee),
                MintExtension::InterestBearing(rate) => self.interest_rate = Some(rate),
                MintExtension::PermanentDelegate(delegate) => {
                    self.permanent_delegate = Some(delegate)
                }
            }
        }
        self
    }

    /// Whether the token directory classifies the mint as token-2022
    pub fn is_token_2022(&self) -> bool {
        self.tags.contains(TOKEN_2022_TAG)
    }

    /// Transfer fee in bps, 0 when the mint charges none
    pub fn transfer_fee_bps(&self) -> u16 {
        self.transfer_fee.map(|fee| fee.bps).unwrap_or(0)
    }

    /// Extensions present on the mint
    pub fn extensions(&self) -> Vec<MintExtension> {
        let mut extensions = Vec::new();
        if let Some(fee) = self.transfer_fee {
            extensions.push(MintExtension::TransferFee(fee));
        }
        if let Some(rate) = self.interest_rate {
            extensions.push(MintExtension::InterestBearing(rate));
        }
        if let Some(delegate) = self.permanent_delegate {
            extensions.push(MintExtension::PermanentDelegate(delegate));
        }
        extensions
    }
}
