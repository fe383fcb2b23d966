//! Cryptographic hashing utilities for the ledger
//!
//! Provides the SHA-256 based hashing used for block hashes and transaction
//! IDs. Every node must use the same function for chains to be comparable.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a SHA-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Previous-hash value carried by the genesis block
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors raised while decoding hashes received from callers or peers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid hex digest: {0}")]
    InvalidHex(String),
    #[error("Invalid digest length: {0} bytes (expected {DIGEST_LEN})")]
    InvalidLength(usize),
}

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Decodes a hex-encoded digest, rejecting anything that is not exactly 32 bytes
pub fn decode_digest(hash: &str) -> Result<[u8; DIGEST_LEN], CodecError> {
    let bytes = hex::decode(hash).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    <[u8; DIGEST_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| CodecError::InvalidLength(bytes.len()))
}

/// Checks if a hash meets the difficulty target
/// The hash must have `difficulty` leading zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let required_zeros = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    if required_zeros > hash.len() {
        return false;
    }

    // Check full zero bytes
    if hash.iter().take(required_zeros).any(|byte| *byte != 0) {
        return false;
    }

    // Check remaining bits
    if remaining_bits > 0 {
        match hash.get(required_zeros) {
            Some(byte) => {
                let mask = 0xFFu8 << (8 - remaining_bits);
                byte & mask == 0
            }
            None => false,
        }
    } else {
        true
    }
}
