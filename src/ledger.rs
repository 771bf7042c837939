//! The chain of sealed blocks together with the pending-record queue.
//!
//! `Ledger` is single-owner and synchronous. Sealing is split into
//! [`Ledger::begin_seal`] and [`Ledger::append_sealed`] so a caller holding the
//! ledger behind a lock can mine between the two without holding the lock.

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::miner::{self, meets_difficulty, Difficulty};
use crate::model::{now_millis, Block, Record, RecordId, GENESIS_PREVIOUS_DIGEST};
use crate::pending::PendingQueue;

/// 2023-01-01T00:00:00Z in unix milliseconds.
pub const GENESIS_TIMESTAMP: i64 = 1_672_531_200_000;

/// The fixed first block. Not proof-of-work sealed: it stays at nonce 0.
pub fn genesis_block() -> Block {
    let placeholder = Record {
        id: Uuid::nil(),
        received_at: GENESIS_TIMESTAMP,
        payload: json!({
            "to": "genesis@example.com",
            "subject": "Genesis Block",
            "text": "Initial block in the chain",
        }),
    };
    Block::new(0, GENESIS_TIMESTAMP, vec![placeholder], GENESIS_PREVIOUS_DIGEST)
}

/// Unsealed block built from a drained batch.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: Block,
}

/// Result of a successful seal-and-append.
#[derive(Debug, Clone, Serialize)]
pub struct SealSummary {
    pub index: u64,
    pub digest: String,
    pub nonce: u64,
    pub records: Vec<Record>,
}

/// First inconsistency found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFault {
    /// Stored index does not match the block's position.
    IndexMismatch { index: u64, found: u64 },
    /// Stored digest differs from a recomputation over the block's fields.
    DigestMismatch { index: u64 },
    /// `previous_digest` does not equal the prior block's stored digest.
    BrokenLink { index: u64 },
    /// Digest misses the ledger's work target.
    InsufficientWork { index: u64 },
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub length: usize,
    pub fault: Option<ChainFault>,
}

/// Where a sealed record lives.
#[derive(Debug, Clone, Serialize)]
pub struct RecordLocation {
    pub block_index: u64,
    pub record: Record,
}

/// Read-only copy of the ledger for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub chain: Vec<Block>,
    pub pending: Vec<Record>,
    pub is_valid: bool,
    pub length: usize,
    pub difficulty: Difficulty,
}

#[derive(Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: PendingQueue,
    difficulty: Difficulty,
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            chain: vec![genesis_block()],
            pending: PendingQueue::new(),
            difficulty,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Never true: genesis is always present.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn tip(&self) -> &Block {
        // genesis is installed in `new` and blocks are never removed
        &self.chain[self.chain.len() - 1]
    }

    /// Wrap `payload` in a record and queue it.
    pub fn submit(&mut self, payload: serde_json::Value) -> RecordId {
        let record = Record::new(payload);
        let id = record.id;
        self.pending.enqueue(record);
        debug!(%id, pending = self.pending.len(), "record queued");
        id
    }

    /// Drain the queue into a candidate built on the current tip.
    /// `None` when nothing is pending.
    pub fn begin_seal(&mut self) -> Option<Candidate> {
        if self.pending.is_empty() {
            return None;
        }
        let records = self.pending.drain_all();
        let tip = self.tip();
        let block = Block::new(tip.index + 1, now_millis(), records, tip.digest.clone());
        Some(Candidate { block })
    }

    /// Return an abandoned candidate's records to the head of the queue.
    pub fn abort_seal(&mut self, candidate: Candidate) {
        warn!(
            records = candidate.block.records.len(),
            "seal abandoned, records returned to pending"
        );
        self.pending.requeue_front(candidate.block.records);
    }

    /// Append a block sealed from a candidate of this ledger.
    ///
    /// Refuses with `StaleTip` if the chain moved since the candidate was
    /// built; the block's records are then returned to the queue.
    pub fn append_sealed(&mut self, block: Block) -> Result<SealSummary> {
        let tip = self.tip();
        if block.previous_digest != tip.digest || block.index != tip.index + 1 {
            let err = LedgerError::StaleTip {
                expected: block.previous_digest.clone(),
                actual: tip.digest.clone(),
            };
            self.abort_seal(Candidate { block });
            return Err(err);
        }
        debug_assert!(meets_difficulty(&block.digest, self.difficulty));

        let summary = SealSummary {
            index: block.index,
            digest: block.digest.clone(),
            nonce: block.nonce,
            records: block.records.clone(),
        };
        info!(
            index = summary.index,
            digest = %summary.digest,
            records = summary.records.len(),
            "block appended"
        );
        self.chain.push(block);
        Ok(summary)
    }

    /// Drain, mine and append in one call. No-op on an empty queue.
    pub fn seal_pending(&mut self) -> Result<Option<SealSummary>> {
        let Some(candidate) = self.begin_seal() else {
            debug!("nothing pending, skipping seal");
            return Ok(None);
        };
        match miner::seal(candidate.block.clone(), self.difficulty) {
            Ok(sealed) => self.append_sealed(sealed.block).map(Some),
            Err(err) => {
                self.abort_seal(candidate);
                Err(err)
            }
        }
    }

    /// Walk the whole chain and report the first inconsistency.
    pub fn validate(&self) -> ChainReport {
        let fault = self.first_fault();
        ChainReport {
            valid: fault.is_none(),
            length: self.chain.len(),
            fault,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.first_fault().is_none()
    }

    fn first_fault(&self) -> Option<ChainFault> {
        for (position, block) in self.chain.iter().enumerate() {
            let index = position as u64;
            if block.index != index {
                return Some(ChainFault::IndexMismatch {
                    index,
                    found: block.index,
                });
            }
            if !block.has_valid_digest() {
                return Some(ChainFault::DigestMismatch { index });
            }
            if position == 0 {
                continue;
            }
            if block.previous_digest != self.chain[position - 1].digest {
                return Some(ChainFault::BrokenLink { index });
            }
            if !meets_difficulty(&block.digest, self.difficulty) {
                return Some(ChainFault::InsufficientWork { index });
            }
        }
        None
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    /// Linear scan over sealed blocks.
    pub fn find_record(&self, id: &RecordId) -> Option<RecordLocation> {
        self.chain.iter().find_map(|block| {
            block
                .records
                .iter()
                .find(|r| &r.id == id)
                .map(|record| RecordLocation {
                    block_index: block.index,
                    record: record.clone(),
                })
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            chain: self.chain.clone(),
            pending: self.pending.records().cloned().collect(),
            is_valid: self.is_valid(),
            length: self.chain.len(),
            difficulty: self.difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(zeros: u8) -> Ledger {
        Ledger::new(Difficulty::new(zeros).unwrap())
    }

    /// Ledger with two records sealed into block 1; returns the S1 record id.
    fn sealed_pair(l: &mut Ledger) -> RecordId {
        let s1 = l.submit(json!({"to": "a@x.com", "subject": "S1"}));
        l.submit(json!({"to": "b@x.com", "subject": "S2"}));
        l.seal_pending().unwrap().unwrap();
        s1
    }

    #[test]
    fn fresh_ledger_is_genesis_only_and_valid() {
        let l = ledger(2);
        assert_eq!(l.len(), 1);
        assert!(l.is_valid());
        assert_eq!(l.tip().previous_digest, GENESIS_PREVIOUS_DIGEST);
        assert_eq!(l.tip().nonce, 0);
    }

    #[test]
    fn genesis_is_identical_across_ledgers() {
        assert_eq!(ledger(1).tip().digest, ledger(3).tip().digest);
    }

    #[test]
    fn seal_two_records_at_difficulty_two() {
        let mut l = ledger(2);
        l.submit(json!({"to": "a@x.com", "subject": "S1"}));
        l.submit(json!({"to": "b@x.com", "subject": "S2"}));

        let summary = l.seal_pending().unwrap().unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(summary.index, 1);
        assert!(summary.digest.starts_with("00"));
        assert_eq!(summary.records.len(), 2);
        assert!(l.pending().is_empty());
        assert_eq!(l.chain()[1].previous_digest, l.chain()[0].digest);
        assert!(l.is_valid());
    }

    #[test]
    fn empty_queue_seal_is_a_noop() {
        let mut l = ledger(2);
        assert!(l.seal_pending().unwrap().is_none());
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn find_record_locates_sealed_record() {
        let mut l = ledger(2);
        let s1 = sealed_pair(&mut l);
        let found = l.find_record(&s1).unwrap();
        assert_eq!(found.block_index, 1);
        assert_eq!(found.record.payload["subject"], "S1");
        assert!(l.find_record(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn pending_records_are_not_found_as_sealed() {
        let mut l = ledger(1);
        let id = l.submit(json!({"subject": "later"}));
        assert!(l.find_record(&id).is_none());
        assert!(l.pending().get(&id).is_some());
    }

    #[test]
    fn block_at_out_of_range_is_none() {
        let mut l = ledger(2);
        sealed_pair(&mut l);
        assert!(l.block_at(1).is_some());
        assert!(l.block_at(99).is_none());
        assert!(l.block_at(u64::MAX).is_none());
    }

    #[test]
    fn overwritten_genesis_digest_invalidates_chain() {
        let mut l = ledger(2);
        sealed_pair(&mut l);
        l.chain[0].digest = "not-a-digest".into();
        assert!(!l.is_valid());
        assert_eq!(
            l.validate().fault,
            Some(ChainFault::DigestMismatch { index: 0 })
        );
    }

    #[test]
    fn overwritten_digest_on_genesis_only_chain_is_detected() {
        let mut l = ledger(2);
        l.chain[0].digest = "0000".into();
        assert!(!l.is_valid());
    }

    #[test]
    fn mutated_digest_fails_at_or_before_its_index() {
        let mut l = ledger(1);
        for n in 0..3 {
            l.submit(json!({"n": n}));
            l.seal_pending().unwrap();
        }
        l.chain[2].digest = "1".repeat(64);
        match l.validate().fault {
            Some(ChainFault::DigestMismatch { index }) => assert!(index <= 2),
            other => panic!("unexpected fault {other:?}"),
        }
    }

    #[test]
    fn relinked_previous_digest_is_detected() {
        let mut l = ledger(1);
        for n in 0..2 {
            l.submit(json!({"n": n}));
            l.seal_pending().unwrap();
        }
        l.chain[2].previous_digest = "f".repeat(64);
        let report = l.validate();
        assert!(!report.valid);
        assert_eq!(report.fault, Some(ChainFault::DigestMismatch { index: 2 }));

        // Re-hash after re-linking so only the broken link remains.
        l.chain[2].digest = l.chain[2].compute_digest();
        assert_eq!(
            l.validate().fault,
            Some(ChainFault::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn tampered_record_payload_is_detected() {
        let mut l = ledger(2);
        sealed_pair(&mut l);
        l.chain[1].records[0].payload["subject"] = json!("forged");
        assert!(!l.is_valid());
    }

    #[test]
    fn block_below_work_target_is_detected() {
        let mut l = ledger(2);
        sealed_pair(&mut l);

        // Re-hash block 1 at the first nonce whose digest misses the target.
        let difficulty = l.difficulty();
        let mut block = l.chain[1].clone();
        block.nonce = 0;
        block.digest = block.compute_digest();
        while meets_difficulty(&block.digest, difficulty) {
            block.nonce += 1;
            block.digest = block.compute_digest();
        }
        l.chain[1] = block;

        assert!(!l.is_valid());
        assert_eq!(
            l.validate().fault,
            Some(ChainFault::InsufficientWork { index: 1 })
        );
    }

    #[test]
    fn out_of_sequence_index_is_detected() {
        let mut l = ledger(2);
        sealed_pair(&mut l);
        l.chain[1].index = 7;
        assert_eq!(
            l.validate().fault,
            Some(ChainFault::IndexMismatch { index: 1, found: 7 })
        );
    }

    #[test]
    fn validation_is_idempotent() {
        let mut l = ledger(2);
        sealed_pair(&mut l);
        let before = l.chain().to_vec();
        assert_eq!(l.validate(), l.validate());
        assert_eq!(l.chain(), before.as_slice());
    }

    #[test]
    fn records_queued_after_drain_land_in_next_batch() {
        let mut l = ledger(1);
        let first = l.submit(json!({"subject": "first"}));
        let candidate = l.begin_seal().unwrap();
        let second = l.submit(json!({"subject": "second"}));

        let sealed = miner::seal(candidate.block, l.difficulty()).unwrap();
        let summary = l.append_sealed(sealed.block).unwrap();
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.records[0].id, first);
        assert_eq!(l.pending().len(), 1);
        assert!(l.pending().get(&second).is_some());
    }

    #[test]
    fn stale_candidate_is_refused_and_requeued() {
        let mut l = ledger(1);
        l.submit(json!({"subject": "a"}));
        let stale = l.begin_seal().unwrap();
        l.submit(json!({"subject": "b"}));
        l.seal_pending().unwrap().unwrap();

        let sealed = miner::seal(stale.block, l.difficulty()).unwrap();
        let err = l.append_sealed(sealed.block).unwrap_err();
        assert!(matches!(err, LedgerError::StaleTip { .. }));
        assert_eq!(l.len(), 2);
        assert_eq!(l.pending().len(), 1);
        assert!(l.is_valid());
    }

    #[test]
    fn snapshot_reflects_chain_and_queue() {
        let mut l = ledger(1);
        sealed_pair(&mut l);
        l.submit(json!({"subject": "queued"}));
        let snap = l.snapshot();
        assert_eq!(snap.length, 2);
        assert_eq!(snap.chain.len(), 2);
        assert_eq!(snap.pending.len(), 1);
        assert!(snap.is_valid);
    }
}
