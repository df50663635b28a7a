//! Reconciliation run orchestration.
//!
//! ```text
//! Start → ReadSnapshots → ComputeLedger → ComputeCorrections → ApplyBatches → Report → Done
//!              │                                   │                │
//!              └──────────► Failed ◄───────────────┘ (cancelled)    └──► Report → Failed (partial)
//! ```
//!
//! Reads happen-before computation happens-before writes. Nothing is written
//! until every snapshot has been read and the full plan is known.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stockwarden_core::RunId;
use stockwarden_products::StockHealth;
use stockwarden_sales::ExpiryPolicy;

use crate::config::ReconcileConfig;
use crate::executor::{BatchExecutor, BatchExecutorConfig};
use crate::plan::ReconcilePlan;
use crate::report::{ReconcileReport, ReportSink, RunStatus};
use crate::snapshot::{self, Snapshot};
use crate::store::{DocumentStore, StoreError};

/// Run error. Returned only when nothing has been written.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to read snapshot of {collection}: {source}")]
    SnapshotRead {
        collection: String,
        #[source]
        source: StoreError,
    },
    #[error("run cancelled before any write was issued")]
    Cancelled,
}

/// Cooperative cancellation flag shared with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    ReadSnapshots,
    ComputeLedger,
    ComputeCorrections,
    ApplyBatches,
    Report,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Start => "start",
            RunPhase::ReadSnapshots => "read_snapshots",
            RunPhase::ComputeLedger => "compute_ledger",
            RunPhase::ComputeCorrections => "compute_corrections",
            RunPhase::ApplyBatches => "apply_batches",
            RunPhase::Report => "report",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

/// Result of a run that reached the report phase.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub final_phase: RunPhase,
    pub report: ReconcileReport,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.report.status
    }
}

/// One reconciliation invocation.
pub struct ReconcileRun<S, R> {
    store: S,
    sink: R,
    config: ReconcileConfig,
    cancel: CancelToken,
    run_id: RunId,
    phase: RunPhase,
}

impl<S, R> ReconcileRun<S, R>
where
    S: DocumentStore,
    R: ReportSink,
{
    pub fn new(store: S, sink: R, config: ReconcileConfig) -> Self {
        Self {
            store,
            sink,
            config,
            cancel: CancelToken::new(),
            run_id: RunId::new(),
            phase: RunPhase::Start,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(run_id = %self.run_id, from = self.phase.as_str(), to = phase.as_str(), "run phase");
        self.phase = phase;
    }

    /// Execute the run with `now` as the classification clock.
    pub async fn execute(&mut self, now: DateTime<Utc>) -> Result<RunOutcome, ReconcileError> {
        info!(
            run_id = %self.run_id,
            name = %self.config.name,
            dry_run = self.config.dry_run,
            batch_size = self.config.batch_size,
            products = %self.config.collections.products,
            "reconciliation started"
        );

        self.enter(RunPhase::ReadSnapshots);
        let snapshot = match Snapshot::read(&self.store, &self.config.collections).await {
            Ok(s) => s,
            Err(e) => {
                self.enter(RunPhase::Failed);
                return Err(e);
            }
        };

        self.enter(RunPhase::ComputeLedger);
        let policy = ExpiryPolicy::new(self.config.pending_ttl_chrono());
        let plan = ReconcilePlan::build(&snapshot, &self.config.collections, &policy, now, self.run_id);

        self.enter(RunPhase::ComputeCorrections);
        let units = plan.units();
        let planned_ops: usize = units.iter().map(Vec::len).sum();
        info!(
            corrections = plan.discrepancies.corrections.len(),
            deletions = plan.duplicates.duplicate_count(),
            journal_entries = plan.journal_entry_count(),
            journal_pruned = plan.stale_journal.len(),
            planned_ops,
            "plan computed"
        );

        if self.config.dry_run {
            let report = ReconcileReport::new(&snapshot, &plan, planned_ops, RunStatus::DryRun);
            return Ok(self.finish(report, RunPhase::Done));
        }

        if self.cancel.is_cancelled() {
            warn!(run_id = %self.run_id, "cancelled before apply phase; nothing written");
            self.enter(RunPhase::Failed);
            return Err(ReconcileError::Cancelled);
        }

        self.enter(RunPhase::ApplyBatches);
        let executor = BatchExecutor::new(
            &self.store,
            BatchExecutorConfig::default()
                .with_batch_size(self.config.batch_size)
                .with_pause(self.config.batch_pause),
        );
        let outcome = executor.apply(&units, &self.cancel).await;

        let (status, final_phase) = if outcome.failure.is_some() {
            (RunStatus::PartiallyApplied, RunPhase::Failed)
        } else if outcome.cancelled {
            (RunStatus::Interrupted, RunPhase::Done)
        } else {
            (RunStatus::Completed, RunPhase::Done)
        };

        let mut report = ReconcileReport::new(&snapshot, &plan, planned_ops, status).with_apply(outcome);
        let mut ignored = Vec::new();
        match snapshot::read_products(&self.store, &self.config.collections.products, &mut ignored).await {
            Ok(products) => report = report.with_stock_after(StockHealth::audit(products.values())),
            Err(e) => warn!(error = %e, "post-apply stock audit skipped"),
        }

        Ok(self.finish(report, final_phase))
    }

    fn finish(&mut self, report: ReconcileReport, final_phase: RunPhase) -> RunOutcome {
        self.enter(RunPhase::Report);
        self.sink.emit(&report);
        self.enter(final_phase);
        RunOutcome { final_phase, report }
    }
}
