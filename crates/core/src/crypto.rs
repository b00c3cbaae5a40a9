//! Addresses and signature errors shared by the WOTS and MSS modules.

use crate::hash::{Hash, H256, HASH_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// An address on the ledger: the root digest of an MSS tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub H256);

impl Address {
    /// The zero address (all zeros).
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// The address viewed as the MSS root digest it is.
    pub fn as_hash(&self) -> Hash {
        Hash(self.0)
    }

    /// Convert to a hex string (with 0x prefix).
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from a hex string (with or without 0x prefix).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Hash::from_hex(s)
            .map(Self::from)
            .map_err(|_| CryptoError::InvalidAddress)
    }
}

impl From<Hash> for Address {
    fn from(hash: Hash) -> Self {
        Self(hash.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_hash().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Hash::deserialize(deserializer).map(Self::from)
    }
}

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed signature: {0}")]
    MalformedSignature(&'static str),
    #[error("signing key exhausted after {0} signatures")]
    KeyExhausted(usize),
    #[error("invalid tree height {0} (expected 1..={max})", max = crate::mss::MAX_HEIGHT)]
    InvalidTreeHeight(u32),
    #[error("invalid address format")]
    InvalidAddress,
    #[error("malformed key record: {0}")]
    MalformedKey(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::from(hash(b"root"));
        let parsed = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_from_hex_no_prefix() {
        let addr = Address::from(hash(b"root"));
        let parsed = Address::from_hex(&hex::encode(addr.0)).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_from_hex_rejects_garbage() {
        assert_eq!(Address::from_hex("0xnothex"), Err(CryptoError::InvalidAddress));
        assert_eq!(Address::from_hex("0x1234"), Err(CryptoError::InvalidAddress));
    }

    #[test]
    fn test_address_json_is_hex() {
        let addr = Address::from(hash(b"root"));
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", hex::encode(addr.0)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
