//! Run reports and reporting sinks.
//!
//! A report is pure observation: it never feeds back into planning. Sinks
//! receive the finished report once per run.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use stockwarden_core::{OrderId, RunId};
use stockwarden_deliveries::{DeliveryCensus, DuplicateGroup};
use stockwarden_inventory::{CorrectionRecord, DataAnomaly};
use stockwarden_products::StockHealth;
use stockwarden_sales::ReleaseReason;

use crate::executor::ApplyOutcome;
use crate::plan::ReconcilePlan;
use crate::snapshot::{MalformedRecord, Snapshot};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned operation was committed (or there was nothing to do).
    Completed,
    /// A batch failed; earlier batches stand.
    PartiallyApplied,
    /// Stopped between batches by a cancellation request.
    Interrupted,
    /// Planned and reported without writing.
    DryRun,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::PartiallyApplied => "partially_applied",
            RunStatus::Interrupted => "interrupted",
            RunStatus::DryRun => "dry_run",
        }
    }
}

/// A pending order released by this run for exceeding the expiry threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiredOrderTrace {
    pub order_id: OrderId,
    pub age_minutes: i64,
    pub units: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub orders_scanned: usize,
    pub legitimate_holds: usize,
    pub expired_pending: usize,
    pub must_release: usize,
    pub unknown_status: usize,
    pub already_released: usize,
    pub products_scanned: usize,
    pub products_corrected: usize,
    pub units_requested: u64,
    pub units_released: u64,
    pub deliveries_scanned: usize,
    pub orders_with_duplicates: usize,
    pub duplicates_removed: usize,
    pub journal_entries: usize,
    pub journal_pruned: usize,
    pub anomalies: usize,
    pub malformed_records: usize,
    pub planned_ops: usize,
}

/// Everything observed and planned by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub counts: ReportCounts,
    pub corrections: Vec<CorrectionRecord>,
    pub expired_orders: Vec<ExpiredOrderTrace>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub anomalies: Vec<DataAnomaly>,
    pub malformed: Vec<MalformedRecord>,
    pub stock_before: StockHealth,
    /// Audit re-read after the apply phase. Absent for dry runs.
    pub stock_after: Option<StockHealth>,
    pub deliveries: DeliveryCensus,
    pub apply: Option<ApplyOutcome>,
}

impl ReconcileReport {
    pub fn new(snapshot: &Snapshot, plan: &ReconcilePlan, planned_ops: usize, status: RunStatus) -> Self {
        let ledger_counts = plan.ledger.counts();
        let expired_orders = plan
            .ledger
            .released_orders()
            .iter()
            .filter(|o| o.reason == ReleaseReason::ExpiredPending)
            .map(|o| ExpiredOrderTrace {
                order_id: o.order_id.clone(),
                age_minutes: o.age_minutes,
                units: o.lines.iter().map(|l| l.quantity).sum(),
            })
            .collect();

        let counts = ReportCounts {
            orders_scanned: plan.classified.len(),
            legitimate_holds: ledger_counts.legitimate_hold,
            expired_pending: ledger_counts.expired_pending,
            must_release: ledger_counts.must_release,
            unknown_status: ledger_counts.unknown,
            already_released: ledger_counts.already_released,
            products_scanned: snapshot.products.len(),
            products_corrected: plan.discrepancies.corrections.len(),
            units_requested: plan.ledger.requested_units(),
            units_released: plan.discrepancies.units_released(),
            deliveries_scanned: snapshot.deliveries.total(),
            orders_with_duplicates: plan.duplicates.affected_orders(),
            duplicates_removed: plan.duplicates.duplicate_count(),
            journal_entries: plan.journal_entry_count(),
            journal_pruned: plan.stale_journal.len(),
            anomalies: plan.discrepancies.anomalies.len(),
            malformed_records: snapshot.malformed.len(),
            planned_ops,
        };

        Self {
            run_id: plan.run_id,
            generated_at: plan.now,
            status,
            counts,
            corrections: plan.discrepancies.corrections.clone(),
            expired_orders,
            duplicate_groups: plan.duplicates.groups.clone(),
            anomalies: plan.discrepancies.anomalies.clone(),
            malformed: snapshot.malformed.clone(),
            stock_before: StockHealth::audit(snapshot.products.values()),
            stock_after: None,
            deliveries: DeliveryCensus::count(&snapshot.deliveries),
            apply: None,
        }
    }

    pub fn with_apply(mut self, outcome: ApplyOutcome) -> Self {
        self.apply = Some(outcome);
        self
    }

    pub fn with_stock_after(mut self, health: StockHealth) -> Self {
        self.stock_after = Some(health);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Receives the finished report of every run.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &ReconcileReport);
}

impl<S> ReportSink for Arc<S>
where
    S: ReportSink + ?Sized,
{
    fn emit(&self, report: &ReconcileReport) {
        (**self).emit(report)
    }
}

/// Default sink: one structured log line per summary and per traced entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn emit(&self, report: &ReconcileReport) {
        let c = &report.counts;
        info!(
            run_id = %report.run_id,
            status = report.status.as_str(),
            orders_scanned = c.orders_scanned,
            expired_pending = c.expired_pending,
            must_release = c.must_release,
            already_released = c.already_released,
            products_corrected = c.products_corrected,
            units_released = c.units_released,
            duplicates_removed = c.duplicates_removed,
            journal_entries = c.journal_entries,
            journal_pruned = c.journal_pruned,
            anomalies = c.anomalies,
            malformed = c.malformed_records,
            "reconciliation report"
        );

        for r in &report.corrections {
            info!(
                product_id = %r.product_id,
                name = %r.name,
                requested = r.requested,
                release = r.release,
                reserved_before = r.reserved_before,
                reserved_after = r.reserved_after,
                orders = r.orders.len(),
                "reservation correction"
            );
        }
        for o in &report.expired_orders {
            info!(order_id = %o.order_id, age_minutes = o.age_minutes, units = o.units, "expired pending order");
        }
        for g in &report.duplicate_groups {
            info!(
                order_id = %g.order_id,
                survivor = %g.survivor,
                removed = g.removed.len(),
                "duplicate deliveries"
            );
        }
        for a in &report.anomalies {
            warn!(product_id = %a.product_id(), anomaly = %a, "data anomaly");
        }
        for m in &report.malformed {
            warn!(collection = %m.collection, id = %m.id, reason = %m.reason, "malformed record");
        }

        let before = &report.stock_before;
        info!(
            products = before.total_products,
            stock = before.total_stock,
            reserved = before.total_reserved,
            available = before.total_available,
            with_errors = before.products_with_errors,
            "stock health before"
        );
        if let Some(after) = &report.stock_after {
            info!(
                products = after.total_products,
                stock = after.total_stock,
                reserved = after.total_reserved,
                available = after.total_available,
                with_errors = after.products_with_errors,
                "stock health after"
            );
        }
        info!(
            total = report.deliveries.total,
            orders = report.deliveries.orders_with_deliveries,
            orphans = report.deliveries.orphans,
            "delivery census"
        );

        if let Some(apply) = &report.apply {
            match &apply.failure {
                None => info!(
                    committed_ops = apply.committed_ops,
                    committed_batches = apply.committed_batches,
                    "apply phase finished"
                ),
                Some(f) => error!(
                    committed_ops = apply.committed_ops,
                    committed_batches = apply.committed_batches,
                    failed_batch = f.batch_index,
                    first_op = f.first_op,
                    remaining_ops = apply.remaining_ops(),
                    error = %f.error,
                    "apply phase stopped; re-run to finish"
                ),
            }
        }
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReportSink {
    inner: Mutex<Vec<ReconcileReport>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ReconcileReport> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<ReconcileReport> {
        self.inner.lock().ok()?.last().cloned()
    }
}

impl ReportSink for InMemoryReportSink {
    fn emit(&self, report: &ReconcileReport) {
        if let Ok(mut v) = self.inner.lock() {
            v.push(report.clone());
        }
    }
}

/// Writes the report as pretty JSON to a file (overwritten per run).
#[derive(Debug, Clone)]
pub struct JsonFileReportSink {
    path: PathBuf,
}

impl JsonFileReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonFileReportSink {
    fn emit(&self, report: &ReconcileReport) {
        let written = File::create(&self.path)
            .map_err(serde_json::Error::io)
            .and_then(|f| serde_json::to_writer_pretty(BufWriter::new(f), report));
        match written {
            Ok(()) => info!(path = %self.path.display(), "report written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to write report"),
        }
    }
}

/// Forwards every report to each inner sink in order.
#[derive(Default)]
pub struct FanoutReportSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for FanoutReportSink {
    fn emit(&self, report: &ReconcileReport) {
        for sink in &self.sinks {
            sink.emit(report);
        }
    }
}
