//! Batched write executor.
//!
//! Packs an ordered list of write units into batches of at most
//! `min(configured, store ceiling)` operations and commits them one by one.
//! A unit is never split across batches unless it alone exceeds the batch
//! size. Each batch is atomic; the run is not. The executor stops at the first
//! failed batch and reports exactly how far it got. Re-running finishes the
//! job: committed units drop out of the next plan.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::run::CancelToken;
use crate::store::{DocumentStore, WriteBatch, WriteOp};

/// Operations that must land in the same commit.
pub type WriteUnit = Vec<WriteOp>;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct BatchExecutorConfig {
    /// Requested operations per batch
    pub batch_size: usize,
    /// Pause between commits
    pub pause: Duration,
}

impl Default for BatchExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::store::DEFAULT_BATCH_CEILING,
            pause: Duration::ZERO,
        }
    }
}

impl BatchExecutorConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// The batch that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Zero-based index among the batches issued by this run.
    pub batch_index: usize,
    /// Offset of the batch's first operation within the full plan.
    pub first_op: usize,
    pub ops_in_batch: usize,
    pub error: String,
}

/// Progress of one apply phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub total_ops: usize,
    pub batch_size: usize,
    pub committed_ops: usize,
    pub committed_batches: usize,
    pub failure: Option<BatchFailure>,
    /// Stopped between batches by a cancellation request.
    pub cancelled: bool,
}

impl ApplyOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    pub fn remaining_ops(&self) -> usize {
        self.total_ops.saturating_sub(self.committed_ops)
    }
}

/// Greedily pack units into batches of at most `batch_size` operations.
///
/// A unit larger than `batch_size` is chunked in order on its own.
pub fn pack(units: &[WriteUnit], batch_size: usize) -> Vec<Vec<WriteOp>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<WriteOp> = Vec::new();

    for unit in units.iter().filter(|u| !u.is_empty()) {
        if unit.len() > batch_size {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            batches.extend(unit.chunks(batch_size).map(<[WriteOp]>::to_vec));
            continue;
        }
        if current.len() + unit.len() > batch_size {
            batches.push(std::mem::take(&mut current));
        }
        current.extend(unit.iter().cloned());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct BatchExecutor<'a, S: ?Sized> {
    store: &'a S,
    config: BatchExecutorConfig,
}

impl<'a, S> BatchExecutor<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: &'a S, config: BatchExecutorConfig) -> Self {
        Self { store, config }
    }

    /// Effective batch size: the configured size capped by the store ceiling.
    pub fn batch_size(&self) -> usize {
        self.config
            .batch_size
            .min(self.store.max_batch_size())
            .max(1)
    }

    /// Commit `units` in packed batches, stopping at the first failure or
    /// cancellation.
    pub async fn apply(&self, units: &[WriteUnit], cancel: &CancelToken) -> ApplyOutcome {
        let batch_size = self.batch_size();
        let batches = pack(units, batch_size);
        let mut outcome = ApplyOutcome {
            total_ops: batches.iter().map(Vec::len).sum(),
            batch_size,
            ..ApplyOutcome::default()
        };

        let mut first_op = 0;
        for (batch_index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    committed_ops = outcome.committed_ops,
                    remaining_ops = outcome.remaining_ops(),
                    "cancelled between batches"
                );
                outcome.cancelled = true;
                break;
            }

            if batch_index > 0 && !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }

            let ops_in_batch = batch.len();
            match self.store.commit(WriteBatch::new(batch)).await {
                Ok(()) => {
                    outcome.committed_ops += ops_in_batch;
                    outcome.committed_batches += 1;
                    debug!(
                        batch = batch_index,
                        ops = ops_in_batch,
                        committed_ops = outcome.committed_ops,
                        "batch committed"
                    );
                }
                Err(e) => {
                    error!(
                        batch = batch_index,
                        first_op,
                        ops = ops_in_batch,
                        error = %e,
                        "batch commit failed; stopping"
                    );
                    outcome.failure = Some(BatchFailure {
                        batch_index,
                        first_op,
                        ops_in_batch,
                        error: e.to_string(),
                    });
                    break;
                }
            }
            first_op += ops_in_batch;
        }

        outcome
    }
}
