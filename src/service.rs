//! Shared, thread-safe access to the ledger.
//!
//! Chain and pending queue sit behind one `RwLock`. Seals are serialized by a
//! separate gate so only one nonce search runs at a time, and the search runs
//! with the ledger lock released: submissions keep flowing while a batch is
//! mined and land in the next batch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::{LedgerError, Result};
use crate::ledger::{ChainReport, Ledger, RecordLocation, SealSummary, Snapshot};
use crate::miner::{self, Difficulty};
use crate::model::{Block, Record, RecordId};

#[derive(Debug)]
struct Inner {
    ledger: RwLock<Ledger>,
    seal_gate: Mutex<()>,
}

/// Cloneable handle to a single in-process ledger.
#[derive(Debug, Clone)]
pub struct LedgerService {
    inner: Arc<Inner>,
}

impl LedgerService {
    pub fn new(difficulty: Difficulty) -> Self {
        Self::from_ledger(Ledger::new(difficulty))
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: RwLock::new(ledger),
                seal_gate: Mutex::new(()),
            }),
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.inner.ledger.read().difficulty()
    }

    /// Queue one record payload.
    pub fn submit(&self, payload: serde_json::Value) -> RecordId {
        self.inner.ledger.write().submit(payload)
    }

    /// Seal whatever is pending and append it. Blocks the calling thread for
    /// the duration of the nonce search; a concurrent caller waits for the
    /// running seal, then seals what arrived meanwhile or returns `None`.
    pub fn seal_now(&self) -> Result<Option<SealSummary>> {
        let _gate = self.inner.seal_gate.lock();

        let (candidate, difficulty) = {
            let mut ledger = self.inner.ledger.write();
            match ledger.begin_seal() {
                Some(candidate) => (candidate, ledger.difficulty()),
                None => {
                    debug!("nothing pending, skipping seal");
                    return Ok(None);
                }
            }
        };

        let index = candidate.block.index;
        info!(index, records = candidate.block.records.len(), %difficulty, "mining block");
        let mined = miner::seal_with_progress(candidate.block.clone(), difficulty, |p| {
            debug!(index, attempts = p.attempts, nonce = p.nonce, digest = %p.digest, "mining");
        });

        match mined {
            Ok(sealed) => {
                info!(
                    index,
                    attempts = sealed.attempts,
                    elapsed_ms = sealed.elapsed.as_millis() as u64,
                    digest = %sealed.block.digest,
                    "block mined"
                );
                self.inner.ledger.write().append_sealed(sealed.block).map(Some)
            }
            Err(err) => {
                self.inner.ledger.write().abort_seal(candidate);
                Err(err)
            }
        }
    }

    /// [`seal_now`](Self::seal_now) on the blocking pool, for async callers.
    pub async fn seal_now_blocking(&self) -> Result<Option<SealSummary>> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.seal_now())
            .await
            .map_err(|e| LedgerError::Internal(format!("mining task failed: {e}")))?
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.ledger.read().snapshot()
    }

    pub fn block_at(&self, index: u64) -> Option<Block> {
        self.inner.ledger.read().block_at(index).cloned()
    }

    pub fn find_record(&self, id: &RecordId) -> Option<RecordLocation> {
        self.inner.ledger.read().find_record(id)
    }

    /// A record still waiting in the queue.
    pub fn pending_record(&self, id: &RecordId) -> Option<Record> {
        self.inner.ledger.read().pending().get(id).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.ledger.read().pending().len()
    }

    /// Number of sealed blocks, genesis included.
    pub fn chain_len(&self) -> usize {
        self.inner.ledger.read().len()
    }

    pub fn validate(&self) -> ChainReport {
        self.inner.ledger.read().validate()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.ledger.read().is_valid()
    }
}

/// Periodically seal anything left pending.
pub fn spawn_auto_sealer(service: LedgerService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if service.pending_len() == 0 {
                continue;
            }
            info!(pending = service.pending_len(), "auto-sealing pending records");
            match service.seal_now_blocking().await {
                Ok(Some(summary)) => {
                    debug!(index = summary.index, "auto-seal appended block")
                }
                Ok(None) => {}
                Err(err) => error!(%err, "auto-seal failed"),
            }
        }
    })
}
