//! Token-2022 mint extension decoding
//!
//! Records follow the 82-byte base mint layout. Each record starts with a
//! little-endian `u16` tag followed by a fixed-size payload, so records of
//! known types can be walked one after another. Offsets inside a record are
//! counted from the start of its tag.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

use crate::constants::*;
use crate::errors::RefillError;
use crate::RefillResult;

// ============================================================================
// Extension Types
// ============================================================================

/// Extension tags understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionType {
    TransferFee,
    InterestBearing,
    PermanentDelegate,
}

impl ExtensionType {
    /// On-chain tag value
    pub fn tag(self) -> u16 {
        match self {
            Self::TransferFee => 1,
            Self::InterestBearing => 2,
            Self::PermanentDelegate => 3,
        }
    }

    /// Map an on-chain tag back to a known type
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Self::TransferFee),
            2 => Some(Self::InterestBearing),
            3 => Some(Self::PermanentDelegate),
            _ => None,
        }
    }

    /// Full record length including the tag
    pub fn record_len(self) -> usize {
        match self {
            Self::TransferFee => TRANSFER_FEE_RECORD_LEN,
            Self::InterestBearing => INTEREST_BEARING_RECORD_LEN,
            Self::PermanentDelegate => PERMANENT_DELEGATE_RECORD_LEN,
        }
    }
}

impl fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransferFee => "TransferFee",
            Self::InterestBearing => "InterestBearing",
            Self::PermanentDelegate => "PermanentDelegate",
        };
        f.write_str(name)
    }
}

/// Transfer fee charged by the mint on every transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFee {
    pub bps: u16,
    pub max_fee: u64,
    pub collector: Pubkey,
}

/// Interest accrual configuration of an interest-bearing mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestRate {
    pub current_rate_bps: i16,
    /// Simple bps to percent conversion, not compounded
    pub apy: Decimal,
    pub last_update_slot: u64,
}

impl InterestRate {
    pub fn new(current_rate_bps: i16, last_update_slot: u64) -> Self {
        Self {
            current_rate_bps,
            apy: Decimal::new(current_rate_bps as i64, 2),
            last_update_slot,
        }
    }
}

/// A decoded extension record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintExtension {
    TransferFee(TransferFee),
    InterestBearing(InterestRate),
    PermanentDelegate(Pubkey),
}

impl MintExtension {
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            Self::TransferFee(_) => ExtensionType::TransferFee,
            Self::InterestBearing(_) => ExtensionType::InterestBearing,
            Self::PermanentDelegate(_) => ExtensionType::PermanentDelegate,
        }
    }
}

/// Authorities read from the base mint layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MintAuthorities {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
}

/// Everything the decoder recovers from one mint account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMint {
    pub authorities: MintAuthorities,
    pub extensions: Vec<MintExtension>,
}

// ============================================================================
// Byte Helpers
// ============================================================================

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

fn non_default(pubkey: Pubkey) -> Option<Pubkey> {
    if pubkey == Pubkey::default() {
        None
    } else {
        Some(pubkey)
    }
}

/// Slice the record that starts right after the base layout, checking tag and length
fn first_record(data: &[u8], expected: ExtensionType, min_len: usize) -> RefillResult<&[u8]> {
    let context = expected.to_string();
    if data.len() < BASE_MINT_LEN + min_len {
        return Err(RefillError::buffer_too_short(&context, data.len(), BASE_MINT_LEN + min_len));
    }

    let record = &data[BASE_MINT_LEN..];
    let found = read_u16(record, 0);
    if found != expected.tag() {
        return Err(RefillError::NotThisExtension { expected, found });
    }

    let required = BASE_MINT_LEN + expected.record_len();
    if data.len() < required {
        return Err(RefillError::buffer_too_short(&context, data.len(), required));
    }
    Ok(&record[..expected.record_len()])
}

// ============================================================================
// Record Parsers
// ============================================================================

fn transfer_fee_record(record: &[u8]) -> TransferFee {
    TransferFee {
        bps: read_u16(record, 2),
        max_fee: read_u64(record, 4),
        collector: read_pubkey(record, 12),
    }
}

fn interest_bearing_record(record: &[u8]) -> InterestRate {
    InterestRate::new(read_u16(record, 2) as i16, read_u64(record, 16))
}

fn permanent_delegate_record(record: &[u8]) -> Pubkey {
    read_pubkey(record, 2)
}

/// Parse a transfer fee record sitting right after the base layout
pub fn parse_transfer_fee(data: &[u8]) -> RefillResult<TransferFee> {
    first_record(data, ExtensionType::TransferFee, TRANSFER_FEE_MIN_LEN).map(transfer_fee_record)
}

/// Parse an interest-bearing record sitting right after the base layout
pub fn parse_interest_bearing(data: &[u8]) -> RefillResult<InterestRate> {
    first_record(data, ExtensionType::InterestBearing, INTEREST_BEARING_RECORD_LEN)
        .map(interest_bearing_record)
}

/// Parse a permanent delegate record sitting right after the base layout
pub fn parse_permanent_delegate(data: &[u8]) -> RefillResult<Pubkey> {
    first_record(data, ExtensionType::PermanentDelegate, PERMANENT_DELEGATE_RECORD_LEN)
        .map(permanent_delegate_record)
}

/// Read mint and freeze authorities from the base layout
///
/// An all-zero key is reported as absent.
pub fn parse_authorities(data: &[u8]) -> RefillResult<MintAuthorities> {
    if data.len() < BASE_MINT_LEN {
        return Err(RefillError::buffer_too_short("base mint", data.len(), BASE_MINT_LEN));
    }
    Ok(MintAuthorities {
        mint_authority: non_default(read_pubkey(data, 0)),
        freeze_authority: non_default(read_pubkey(data, 36)),
    })
}

// ============================================================================
// Record Iteration
// ============================================================================

/// Iterator over consecutive extension records after the base layout
///
/// Records carry no length prefix, so the walk ends at the first unknown
/// tag or at a record that does not fit in the remaining buffer.
pub struct ExtensionRecords<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ExtensionRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: BASE_MINT_LEN,
        }
    }
}

impl<'a> Iterator for ExtensionRecords<'a> {
    type Item = MintExtension;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + EXTENSION_TAG_LEN > self.data.len() {
            return None;
        }

        let extension_type = ExtensionType::from_tag(read_u16(self.data, self.offset))?;
        let end = self.offset + extension_type.record_len();
        if end > self.data.len() {
            self.offset = self.data.len();
            return None;
        }

        let record = &self.data[self.offset..end];
        self.offset = end;
        Some(match extension_type {
            ExtensionType::TransferFee => MintExtension::TransferFee(transfer_fee_record(record)),
            ExtensionType::InterestBearing => {
                MintExtension::InterestBearing(interest_bearing_record(record))
            }
            ExtensionType::PermanentDelegate => {
                MintExtension::PermanentDelegate(permanent_delegate_record(record))
            }
        })
    }
}

/// Decode authorities and every recognizable extension record
pub fn decode_mint(data: &[u8]) -> RefillResult<DecodedMint> {
    let authorities = parse_authorities(data)?;
    Ok(DecodedMint {
        authorities,
        extensions: ExtensionRecords::new(data).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_with_authorities() -> Vec<u8> {
        let mut data = vec![0u8; BASE_MINT_LEN];
        data[0..32].copy_from_slice(&[7u8; 32]);
        data[36..68].copy_from_slice(&[9u8; 32]);
        data
    }

    fn transfer_fee_bytes(bps: u16, max_fee: u64, collector: [u8; 32]) -> Vec<u8> {
        let mut record = Vec::with_capacity(TRANSFER_FEE_RECORD_LEN);
        record.extend_from_slice(&1u16.to_le_bytes());
        record.extend_from_slice(&bps.to_le_bytes());
        record.extend_from_slice(&max_fee.to_le_bytes());
        record.extend_from_slice(&collector);
        record
    }

    fn interest_bytes(rate: i16, slot: u64) -> Vec<u8> {
        let mut record = vec![0u8; INTEREST_BEARING_RECORD_LEN];
        record[0..2].copy_from_slice(&2u16.to_le_bytes());
        record[2..4].copy_from_slice(&rate.to_le_bytes());
        record[16..24].copy_from_slice(&slot.to_le_bytes());
        record
    }

    fn delegate_bytes(delegate: [u8; 32]) -> Vec<u8> {
        let mut record = 3u16.to_le_bytes().to_vec();
        record.extend_from_slice(&delegate);
        record
    }

    fn collector_pattern() -> [u8; 32] {
        let mut pattern = [0u8; 32];
        for (i, byte) in pattern.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        pattern
    }

    #[test]
    fn test_transfer_fee_decodes_exactly() {
        let mut data = base_with_authorities();
        data.extend(transfer_fee_bytes(250, 1_000_000, collector_pattern()));

        let fee = parse_transfer_fee(&data).unwrap();
        assert_eq!(fee.bps, 250);
        assert_eq!(fee.max_fee, 1_000_000);
        assert_eq!(fee.collector, Pubkey::new_from_array(collector_pattern()));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut data = base_with_authorities();
        data.extend_from_slice(&[1, 0, 250, 0]);
        assert!(data.len() < BASE_MINT_LEN + TRANSFER_FEE_MIN_LEN);

        let err = parse_transfer_fee(&data).unwrap_err();
        assert!(matches!(err, RefillError::BufferTooShort { .. }));
    }

    #[test]
    fn test_truncated_transfer_fee_record_is_rejected() {
        let mut data = base_with_authorities();
        let record = transfer_fee_bytes(250, 1_000_000, collector_pattern());
        data.extend_from_slice(&record[..20]);

        let err = parse_transfer_fee(&data).unwrap_err();
        assert_eq!(
            err,
            RefillError::buffer_too_short("TransferFee", BASE_MINT_LEN + 20, BASE_MINT_LEN + 44)
        );
    }

    #[test]
    fn test_wrong_tag_is_not_this_extension() {
        let mut data = base_with_authorities();
        data.extend(interest_bytes(500, 42));

        let err = parse_transfer_fee(&data).unwrap_err();
        assert_eq!(
            err,
            RefillError::NotThisExtension {
                expected: ExtensionType::TransferFee,
                found: 2,
            }
        );
    }

    #[test]
    fn test_interest_bearing_apy() {
        let mut data = base_with_authorities();
        data.extend(interest_bytes(525, 123_456));

        let rate = parse_interest_bearing(&data).unwrap();
        assert_eq!(rate.current_rate_bps, 525);
        assert_eq!(rate.apy, Decimal::new(525, 2));
        assert_eq!(rate.last_update_slot, 123_456);
    }

    #[test]
    fn test_permanent_delegate() {
        let mut data = base_with_authorities();
        data.extend(delegate_bytes([5u8; 32]));

        let delegate = parse_permanent_delegate(&data).unwrap();
        assert_eq!(delegate, Pubkey::new_from_array([5u8; 32]));
    }

    #[test]
    fn test_authorities_ignore_extensions() {
        let mut data = base_with_authorities();
        data.extend(delegate_bytes([5u8; 32]));

        let authorities = parse_authorities(&data).unwrap();
        assert_eq!(authorities.mint_authority, Some(Pubkey::new_from_array([7u8; 32])));
        assert_eq!(authorities.freeze_authority, Some(Pubkey::new_from_array([9u8; 32])));

        let bare = vec![0u8; BASE_MINT_LEN];
        assert_eq!(parse_authorities(&bare).unwrap(), MintAuthorities::default());
    }

    #[test]
    fn test_decode_mint_walks_chained_records() {
        let mut data = base_with_authorities();
        data.extend(transfer_fee_bytes(100, 5_000, collector_pattern()));
        data.extend(delegate_bytes([5u8; 32]));
        data.extend(interest_bytes(-50, 9));

        let decoded = decode_mint(&data).unwrap();
        let types: Vec<_> = decoded.extensions.iter().map(|e| e.extension_type()).collect();
        assert_eq!(
            types,
            vec![
                ExtensionType::TransferFee,
                ExtensionType::PermanentDelegate,
                ExtensionType::InterestBearing,
            ]
        );
        assert_eq!(
            decoded.extensions[2],
            MintExtension::InterestBearing(InterestRate::new(-50, 9))
        );
    }

    #[test]
    fn test_decode_mint_stops_at_unknown_or_truncated_record() {
        let mut data = base_with_authorities();
        data.extend(delegate_bytes([5u8; 32]));
        data.extend_from_slice(&99u16.to_le_bytes());
        data.extend(delegate_bytes([6u8; 32]));
        assert_eq!(decode_mint(&data).unwrap().extensions.len(), 1);

        let mut truncated = base_with_authorities();
        truncated.extend_from_slice(&transfer_fee_bytes(100, 1, [0u8; 32])[..30]);
        assert!(decode_mint(&truncated).unwrap().extensions.is_empty());
    }
}
