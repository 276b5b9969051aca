//! Response mixing hash and hex encoding helpers.
//!
//! The mixing hash is NOT cryptographic. It is a wide XOR fold that touches
//! every input byte, giving a cheap tamper-evident summary of a response. Use
//! [`commitment`] when a consumer needs a real commitment.

/// Width of the mixing digest in bytes.
pub const FOLD_DIGEST_LEN: usize = 64;

/// Fold `data` into a 64-byte digest.
///
/// Each byte is XORed in three times: as-is, nibble-swapped 13 positions
/// later, and complemented 37 positions later.
#[must_use]
pub fn fold_digest(data: &[u8]) -> [u8; FOLD_DIGEST_LEN] {
    let mut out = [0u8; FOLD_DIGEST_LEN];
    for (i, &byte) in data.iter().enumerate() {
        out[i % FOLD_DIGEST_LEN] ^= byte;
        out[(i + 13) % FOLD_DIGEST_LEN] ^= byte.rotate_left(4);
        out[(i + 37) % FOLD_DIGEST_LEN] ^= !byte;
    }
    out
}

/// Mix two 64-bit values into the head and tail of a digest.
pub fn mix_edges(digest: &mut [u8; FOLD_DIGEST_LEN], head: u64, tail: u64) {
    for (i, (h, t)) in head
        .to_le_bytes()
        .into_iter()
        .zip(tail.to_le_bytes())
        .enumerate()
    {
        digest[i] ^= h;
        digest[FOLD_DIGEST_LEN - 1 - i] ^= t;
    }
}

/// BLAKE3 commitment over arbitrary bytes.
#[must_use]
pub fn commitment(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Lowercase hex encoding.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into exactly `N` bytes.
pub fn from_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    hex::decode(s).ok()?.try_into().ok()
}

/// Serde adapter serializing fixed-size byte arrays as hex strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            serde::de::Error::custom(format!("expected {N} bytes, got {}", bytes.len()))
        })
    }
}
