//! Canonical byte encoding for hashed data
//!
//! Block and transaction hashes are computed over these encodings, never over
//! serde output, so every node derives identical digests. Variable-length
//! fields are length-prefixed, which keeps the encoding injective.

use crate::core::amount::Amount;
use crate::core::transaction::Transaction;
use crate::crypto::{sha256, DIGEST_LEN};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};

const TX_DOMAIN: &[u8; 4] = b"DSTX";
const BLOCK_DOMAIN: &[u8; 4] = b"DSBK";

/// Size of the nonce suffix appended to a block prefix
pub const NONCE_LEN: usize = 8;

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u64(value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn put_timestamp(buf: &mut BytesMut, timestamp: &DateTime<Utc>) {
    buf.put_i64(timestamp.timestamp());
    buf.put_u32(timestamp.timestamp_subsec_nanos());
}

fn put_transaction_fields(
    buf: &mut BytesMut,
    sender: &str,
    receiver: &str,
    amount: Amount,
    timestamp: &DateTime<Utc>,
) {
    put_str(buf, sender);
    put_str(buf, receiver);
    buf.put_i64(amount.units());
    put_timestamp(buf, timestamp);
}

/// Encode the fields a transaction ID is derived from
pub fn encode_transaction_fields(
    sender: &str,
    receiver: &str,
    amount: Amount,
    timestamp: &DateTime<Utc>,
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64 + sender.len() + receiver.len());
    buf.put_slice(TX_DOMAIN);
    put_transaction_fields(&mut buf, sender, receiver, amount, timestamp);
    buf.to_vec()
}

/// Encode everything that precedes the nonce in a block's hashed form
///
/// Mining reuses this prefix for every nonce attempt.
pub fn encode_block_prefix(
    index: u64,
    timestamp: &DateTime<Utc>,
    transactions: &[Transaction],
    previous_hash: &str,
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(128 + transactions.len() * 128);
    buf.put_slice(BLOCK_DOMAIN);
    buf.put_u64(index);
    put_timestamp(&mut buf, timestamp);
    buf.put_u64(transactions.len() as u64);
    for tx in transactions {
        put_str(&mut buf, tx.id());
        put_transaction_fields(&mut buf, tx.sender(), tx.receiver(), tx.amount(), &tx.timestamp());
    }
    put_str(&mut buf, previous_hash);
    buf.to_vec()
}

/// Hash a block prefix together with a candidate nonce
///
/// `scratch` must hold the prefix followed by [`NONCE_LEN`] spare bytes.
pub fn hash_with_nonce(scratch: &mut [u8], nonce: u64) -> [u8; DIGEST_LEN] {
    let split = scratch.len() - NONCE_LEN;
    scratch[split..].copy_from_slice(&nonce.to_be_bytes());
    sha256(scratch)
}

/// Full canonical encoding of a block's hashed fields
pub fn encode_block(
    index: u64,
    timestamp: &DateTime<Utc>,
    transactions: &[Transaction],
    previous_hash: &str,
    nonce: u64,
) -> Vec<u8> {
    let mut bytes = encode_block_prefix(index, timestamp, transactions, previous_hash);
    bytes.extend_from_slice(&nonce.to_be_bytes());
    bytes
}
