//! Content hash types and the dual-digest streaming hasher.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(decode_hex::<32>(s)?))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A legacy MD5 digest, kept because some destinations only expose MD5.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeakHash([u8; 16]);

impl WeakHash {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn compute(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(decode_hex::<16>(s)?))
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Debug for WeakHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakHash({})", self.to_hex())
    }
}

impl fmt::Display for WeakHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Which digest a destination exposes for its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// SHA-256.
    Strong,
    /// MD5.
    Weak,
}

/// A digest of either kind. Reconciliation compares items only by digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Digest {
    Strong(ContentHash),
    Weak(WeakHash),
}

impl Digest {
    pub fn kind(&self) -> HashKind {
        match self {
            Self::Strong(_) => HashKind::Strong,
            Self::Weak(_) => HashKind::Weak,
        }
    }

    /// Parse a hex digest, inferring the kind from its length.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        match s.len() {
            64 => Ok(Self::Strong(ContentHash::from_hex(s)?)),
            32 => Ok(Self::Weak(WeakHash::from_hex(s)?)),
            n => Err(crate::Error::InvalidHash(format!(
                "expected 32 or 64 hex chars, got {n}"
            ))),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strong(h) => write!(f, "sha256:{h}"),
            Self::Weak(h) => write!(f, "md5:{h}"),
        }
    }
}

/// Incremental hasher feeding every chunk to SHA-256 and MD5 at once.
///
/// Downloads are hashed as the bytes arrive so a file is never held in
/// memory; both digests come out of the same pass.
pub struct DualHasher {
    strong: Sha256,
    weak: Md5,
    bytes: u64,
}

impl DualHasher {
    pub fn new() -> Self {
        Self {
            strong: Sha256::new(),
            weak: Md5::new(),
            bytes: 0,
        }
    }

    /// Update both hashers with data.
    pub fn update(&mut self, data: &[u8]) {
        self.strong.update(data);
        self.weak.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes seen so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Finalize and return both digests.
    pub fn finalize(self) -> (ContentHash, WeakHash) {
        (
            ContentHash(self.strong.finalize().into()),
            WeakHash(self.weak.finalize().into()),
        )
    }
}

impl Default for DualHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex<const N: usize>(s: &str) -> crate::Result<[u8; N]> {
    if s.len() != N * 2 {
        return Err(crate::Error::InvalidHash(format!(
            "expected {} hex chars, got {}",
            N * 2,
            s.len()
        )));
    }
    let mut bytes = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex_str =
            std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        bytes[i] = u8::from_str_radix(hex_str, 16)
            .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let strong = ContentHash::compute(b"hello world");
        assert_eq!(
            strong.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        let weak = WeakHash::compute(b"hello world");
        assert_eq!(weak.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_dual_hasher_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = DualHasher::new();
        for chunk in data.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.bytes_hashed(), data.len() as u64);
        let (strong, weak) = hasher.finalize();
        assert_eq!(strong, ContentHash::compute(data));
        assert_eq!(weak, WeakHash::compute(data));
    }

    #[test]
    fn test_digest_from_hex_infers_kind() {
        let strong = ContentHash::compute(b"x");
        let weak = WeakHash::compute(b"x");
        assert_eq!(
            Digest::from_hex(&strong.to_hex()).unwrap(),
            Digest::Strong(strong)
        );
        assert_eq!(Digest::from_hex(&weak.to_hex()).unwrap(), Digest::Weak(weak));
        assert!(Digest::from_hex("abc").is_err());
        assert!(WeakHash::from_hex("zz000000000000000000000000000000").is_err());
    }
}
