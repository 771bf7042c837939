//! Proof-of-work sealing.
//!
//! A block is sealed once its hex digest starts with `difficulty` zero
//! characters. The search is a plain linear nonce scan; each extra required
//! zero multiplies the expected number of attempts by 16.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::model::{block_digest, canonical_records, Block};

/// Attempts between two progress callbacks.
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Required number of leading zero hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Difficulty(u8);

impl Difficulty {
    /// Smallest difficulty whose expected search cost reaches the u64 nonce space.
    pub const LIMIT: u8 = 16;

    pub fn new(zeros: u8) -> Result<Self> {
        if zeros >= Self::LIMIT {
            return Err(LedgerError::InvalidConfiguration(format!(
                "difficulty {zeros} would exhaust the nonce space (must be below {})",
                Self::LIMIT
            )));
        }
        Ok(Self(zeros))
    }

    pub fn zeros(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot handed to a progress observer during the search.
#[derive(Debug, Clone)]
pub struct MiningProgress<'a> {
    pub attempts: u64,
    pub nonce: u64,
    pub digest: &'a str,
}

/// A block that satisfies its work target, plus search statistics.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub block: Block,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Does `digest` satisfy the work target?
pub fn meets_difficulty(digest: &str, difficulty: Difficulty) -> bool {
    let zeros = difficulty.zeros();
    digest.len() >= zeros && digest.bytes().take(zeros).all(|b| b == b'0')
}

/// Seal `block` at `difficulty`.
pub fn seal(block: Block, difficulty: Difficulty) -> Result<Sealed> {
    seal_with_progress(block, difficulty, |_| {})
}

/// Seal `block`, reporting to `observer` every [`PROGRESS_INTERVAL`] attempts.
///
/// The record batch is serialized once up front; only the nonce changes between
/// attempts. Running out of nonces is a configuration error and the partially
/// searched block is dropped.
pub fn seal_with_progress<F>(
    mut block: Block,
    difficulty: Difficulty,
    mut observer: F,
) -> Result<Sealed>
where
    F: FnMut(&MiningProgress<'_>),
{
    let started = Instant::now();
    let records = canonical_records(&block.records);
    let mut attempts = 0u64;

    let timestamp = block.timestamp;
    let previous = block.previous_digest.clone();
    let digest_at = |nonce: u64| block_digest(timestamp, &records, &previous, nonce);
    block.digest = digest_at(block.nonce);
    while !meets_difficulty(&block.digest, difficulty) {
        block.nonce = block.nonce.checked_add(1).ok_or_else(|| {
            LedgerError::InvalidConfiguration(format!(
                "nonce space exhausted at difficulty {difficulty}"
            ))
        })?;
        block.digest = digest_at(block.nonce);
        attempts += 1;

        if attempts % PROGRESS_INTERVAL == 0 {
            observer(&MiningProgress {
                attempts,
                nonce: block.nonce,
                digest: &block.digest,
            });
        }
    }

    Ok(Sealed {
        block,
        attempts,
        elapsed: started.elapsed(),
    })
}
