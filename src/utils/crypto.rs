//! Identifiers and hashing.
//!
//! - Hashes (SHA256) for state and event fingerprints
//! - Account identifiers for owners, depositors and redeemers
//! - Position identifiers derived from owner and nonce
//!
//! Signatures are not verified here; callers arrive already authenticated.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::HASH_LENGTH;

/// Hex (de)serialization shared by the 32-byte identifier types
macro_rules! hex_bytes_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                if bytes.len() != HASH_LENGTH {
                    return Err(serde::de::Error::custom(format!(
                        "expected {} bytes, got {}",
                        HASH_LENGTH,
                        bytes.len()
                    )));
                }
                let mut arr = [0u8; HASH_LENGTH];
                arr.copy_from_slice(&bytes);
                Ok($ty(arr))
            }
        }
    };
}

fn decode_fixed(s: &str, name: &str) -> Result<[u8; HASH_LENGTH]> {
    let bytes = hex::decode(s).map_err(|e| Error::InvalidParameter {
        name: name.into(),
        reason: e.to_string(),
    })?;
    if bytes.len() != HASH_LENGTH {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("expected {} bytes, got {}", HASH_LENGTH, bytes.len()),
        });
    }
    let mut arr = [0u8; HASH_LENGTH];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn short_hex(bytes: &[u8; HASH_LENGTH]) -> String {
    let hex = hex::encode(bytes);
    format!("{}...{}", &hex[..8], &hex[hex.len() - 8..])
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte SHA256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LENGTH]);

hex_bytes_serde!(Hash);

impl Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Compute SHA256 hash of data
    pub fn sha256(data: &[u8]) -> Self {
        let result = Sha256::digest(data);
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed(s, "hash").map(Self)
    }

    /// All-zero hash
    pub fn zero() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Check if this is the zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", short_hex(&self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Domain-separated hash: `sha256(sha256(tag) || sha256(tag) || data)`
pub fn tagged_hash(tag: &str, data: &[u8]) -> Hash {
    let tag_hash = Hash::sha256(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash.as_bytes());
    hasher.update(tag_hash.as_bytes());
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; HASH_LENGTH];
    bytes.copy_from_slice(&result);
    Hash::new(bytes)
}

/// Binary merkle root over `leaves`; an odd node is paired with itself
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => return Hash::zero(),
        1 => return leaves[0],
        _ => {}
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut combined = [0u8; HASH_LENGTH * 2];
                combined[..HASH_LENGTH].copy_from_slice(pair[0].as_bytes());
                combined[HASH_LENGTH..].copy_from_slice(right.as_bytes());
                tagged_hash("cdp-engine/merkle", &combined)
            })
            .collect();
    }
    level[0]
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of an owner, depositor, redeemer or liquidator
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; HASH_LENGTH]);

hex_bytes_serde!(AccountId);

impl AccountId {
    /// Create from raw bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Deterministic account derived from a label
    pub fn from_label(label: &str) -> Self {
        Self(*tagged_hash("cdp-engine/account", label.as_bytes()).as_bytes())
    }

    /// Get the account as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed(s, "account_id").map(Self)
    }

    /// Short representation for display
    pub fn short(&self) -> String {
        short_hex(&self.0)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.short())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a position
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TroveId([u8; HASH_LENGTH]);

hex_bytes_serde!(TroveId);

impl TroveId {
    /// Create a new ID from bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate an ID from owner and nonce
    pub fn generate(owner: &AccountId, nonce: u64) -> Self {
        let mut data = Vec::with_capacity(HASH_LENGTH + 8);
        data.extend_from_slice(owner.as_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        Self(*tagged_hash("cdp-engine/trove", &data).as_bytes())
    }

    /// Get the ID as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed(s, "trove_id").map(Self)
    }

    /// Short representation for display
    pub fn short(&self) -> String {
        short_hex(&self.0)
    }
}

impl fmt::Debug for TroveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TroveId({})", self.short())
    }
}

impl fmt::Display for TroveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = Hash::sha256(b"hello");
        assert_eq!(
            hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(!hash.is_zero());
        assert!(Hash::default().is_zero());
    }

    #[test]
    fn test_trove_id_generation() {
        let owner = AccountId::from_label("alice");
        let id1 = TroveId::generate(&owner, 1);
        let id2 = TroveId::generate(&owner, 2);
        let id1_again = TroveId::generate(&owner, 1);

        assert_ne!(id1, id2);
        assert_eq!(id1, id1_again);
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = TroveId::generate(&AccountId::from_label("bob"), 42);
        assert_eq!(TroveId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(AccountId::from_hex("zz").is_err());
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_serde_as_hex() {
        let account = AccountId::from_label("carol");
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", account.to_hex()));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_merkle_root() {
        let a = Hash::sha256(b"a");
        let b = Hash::sha256(b"b");
        let c = Hash::sha256(b"c");

        assert!(merkle_root(&[]).is_zero());
        assert_eq!(merkle_root(&[a]), a);
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
        // Odd leaf is paired with itself
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }

    #[test]
    fn test_short_display() {
        let id = TroveId::generate(&AccountId::from_label("dave"), 0);
        assert_eq!(id.short().len(), 19);
        assert!(format!("{:?}", id).starts_with("TroveId("));
    }
}
