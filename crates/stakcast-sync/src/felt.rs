//! Starknet field element helpers.
//!
//! Felts are carried as `U256`; every value the prediction hub emits fits in
//! 252 bits. Cairo serializes `u256` as two felts `(low, high)`, booleans and
//! small integers as a single felt, and short strings as big-endian ASCII
//! packed into one felt.

use alloy::primitives::{keccak256, U256};
use bigdecimal::BigDecimal;
use std::str::FromStr;

use stakcast_common::{SyncError, SyncResult};

pub type Felt = U256;

/// Parse a `0x`-prefixed hex felt as returned by the JSON-RPC node
pub fn parse_felt(value: &str) -> SyncResult<Felt> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() {
        return Err(SyncError::Decode(format!("empty felt {:?}", value)));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| SyncError::Decode(format!("invalid felt {:?}: {}", value, e)))
}

/// Lowercase `0x` hex without leading zeros (`0x0` for zero)
pub fn felt_to_hex(felt: Felt) -> String {
    format!("{:#x}", felt)
}

/// `starknet_keccak`: keccak-256 of the ASCII name masked to 250 bits
pub fn selector(name: &str) -> Felt {
    let hash = keccak256(name.as_bytes());
    let mask = (U256::from(1u8) << 250) - U256::from(1u8);
    U256::from_be_bytes(hash.0) & mask
}

/// Decode a Cairo short string (at most 31 ASCII bytes packed big-endian)
pub fn decode_short_string(felt: Felt) -> SyncResult<String> {
    let bytes = felt.to_be_bytes::<32>();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[start..].to_vec())
        .map_err(|e| SyncError::Decode(format!("invalid short string {}: {}", felt_to_hex(felt), e)))
}

/// Reassemble a Cairo `u256` from its `(low, high)` limbs
pub fn u256_from_parts(low: Felt, high: Felt) -> SyncResult<U256> {
    let limb = U256::from(1u8) << 128;
    if low >= limb || high >= limb {
        return Err(SyncError::Decode(format!(
            "u256 limb out of range (low {}, high {})",
            felt_to_hex(low),
            felt_to_hex(high)
        )));
    }
    Ok(low | (high << 128))
}

/// Split a `u256` into the `(low, high)` felts used as calldata
pub fn u256_to_calldata(value: U256) -> [Felt; 2] {
    let limb_mask = (U256::from(1u8) << 128) - U256::from(1u8);
    [value & limb_mask, value >> 128]
}

pub fn to_big_decimal(value: U256) -> SyncResult<BigDecimal> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| SyncError::Decode(format!("amount {} not representable: {}", value, e)))
}

/// Sequential reader over a Cairo-serialized felt array
pub struct FeltReader<'a> {
    felts: &'a [Felt],
    pos: usize,
}

impl<'a> FeltReader<'a> {
    pub fn new(felts: &'a [Felt]) -> Self {
        Self { felts, pos: 0 }
    }

    pub fn felt(&mut self, field: &str) -> SyncResult<Felt> {
        let value = self.felts.get(self.pos).copied().ok_or_else(|| {
            SyncError::Decode(format!(
                "missing {} at position {} (got {} felts)",
                field,
                self.pos,
                self.felts.len()
            ))
        })?;
        self.pos += 1;
        Ok(value)
    }

    pub fn u256(&mut self, field: &str) -> SyncResult<U256> {
        let low = self.felt(field)?;
        let high = self.felt(field)?;
        u256_from_parts(low, high)
    }

    pub fn u64(&mut self, field: &str) -> SyncResult<u64> {
        let value = self.felt(field)?;
        u64::try_from(value)
            .map_err(|_| SyncError::Decode(format!("{} does not fit in u64: {}", field, felt_to_hex(value))))
    }

    /// Unsigned value stored in a signed 64-bit column
    pub fn i64(&mut self, field: &str) -> SyncResult<i64> {
        let value = self.felt(field)?;
        i64::try_from(value)
            .map_err(|_| SyncError::Decode(format!("{} does not fit in i64: {}", field, felt_to_hex(value))))
    }

    pub fn u8(&mut self, field: &str) -> SyncResult<u8> {
        let value = self.felt(field)?;
        u8::try_from(value)
            .map_err(|_| SyncError::Decode(format!("{} does not fit in u8: {}", field, felt_to_hex(value))))
    }

    pub fn bool(&mut self, field: &str) -> SyncResult<bool> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SyncError::Decode(format!("{} is not a bool: {}", field, other))),
        }
    }

    pub fn short_string(&mut self, field: &str) -> SyncResult<String> {
        decode_short_string(self.felt(field)?)
    }

    /// `Option<T>` is an enum: variant 0 is `Some(value)`, variant 1 is `None`
    pub fn option_u8(&mut self, field: &str) -> SyncResult<Option<u8>> {
        match self.u8(field)? {
            0 => Ok(Some(self.u8(field)?)),
            1 => Ok(None),
            other => Err(SyncError::Decode(format!("{} has invalid Option variant {}", field, other))),
        }
    }

    pub fn remaining(&self) -> usize {
        self.felts.len().saturating_sub(self.pos)
    }
}
