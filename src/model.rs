//! Data model for ledger records and blocks, and the block hasher.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifier handed back to callers when a record is submitted.
pub type RecordId = Uuid;

/// Previous-digest sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_DIGEST: &str = "0";

/// One payload unit. The ledger never interprets `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Unix milliseconds at which the ledger accepted the record.
    pub received_at: i64,
    pub payload: serde_json::Value,
}

impl Record {
    /// Wrap a payload with a fresh id and the current time.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: now_millis(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain; 0 is genesis.
    pub index: u64,
    /// Unix milliseconds captured when the candidate was built.
    pub timestamp: i64,
    pub records: Vec<Record>,
    /// Hex digest of the chain tip this block was built on.
    pub previous_digest: String,
    pub nonce: u64,
    /// Hex SHA-256 over (timestamp, records, previous_digest, nonce).
    pub digest: String,
}

impl Block {
    /// Build an unsealed block: nonce 0, digest computed once.
    pub fn new(
        index: u64,
        timestamp: i64,
        records: Vec<Record>,
        previous_digest: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            records,
            previous_digest: previous_digest.into(),
            nonce: 0,
            digest: String::new(),
        };
        block.digest = block.compute_digest();
        block
    }

    /// Recompute the digest from the block's stored fields.
    pub fn compute_digest(&self) -> String {
        block_digest(
            self.timestamp,
            &canonical_records(&self.records),
            &self.previous_digest,
            self.nonce,
        )
    }

    /// True when the stored digest matches a fresh recomputation.
    pub fn has_valid_digest(&self) -> bool {
        self.compute_digest() == self.digest
    }
}

/// Canonical byte form of a record batch.
///
/// Struct fields serialize in declaration order and JSON object keys inside
/// payloads come out sorted, so equal batches always yield equal bytes.
///
/// Key sorting holds only while serde_json is built without its
/// `preserve_order` feature: `Value` objects are then `BTreeMap`s. A dependency
/// enabling that feature makes digests depend on payload key order.
pub fn canonical_records(records: &[Record]) -> Vec<u8> {
    // Records hold only string-keyed JSON values, uuids and integers.
    serde_json::to_vec(records).expect("record batch serializes to JSON")
}

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Compute a block digest from its hashed fields.
/// The record batch is length-prefixed so it cannot bleed into the previous digest.
pub fn block_digest(
    timestamp: i64,
    serialized_records: &[u8],
    previous_digest: &str,
    nonce: u64,
) -> String {
    hash_concat(&[
        &timestamp.to_le_bytes(),
        &(serialized_records.len() as u64).to_le_bytes(),
        serialized_records,
        previous_digest.as_bytes(),
        &nonce.to_le_bytes(),
    ])
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
