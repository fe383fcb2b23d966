//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - Digest decoding for hex-encoded hashes
//! - Proof-of-work difficulty checks

pub mod hash;

pub use hash::{
    decode_digest, meets_difficulty, sha256, sha256_hex, CodecError, DIGEST_LEN, ZERO_HASH,
};
