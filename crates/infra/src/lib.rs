//! Infrastructure layer: document store adapters, snapshot readers, the
//! batched write executor, run orchestration, reporting, and configuration.

pub mod config;
pub mod executor;
pub mod journal;
pub mod plan;
pub mod report;
pub mod run;
pub mod snapshot;
pub mod store;

pub use config::{Collections, ConfigError, ReconcileConfig};
pub use executor::{ApplyOutcome, BatchExecutor, BatchExecutorConfig, BatchFailure, WriteUnit};
pub use plan::ReconcilePlan;
pub use report::{
    FanoutReportSink, InMemoryReportSink, JsonFileReportSink, ReconcileReport, ReportSink,
    RunStatus, TracingReportSink,
};
pub use run::{CancelToken, ReconcileError, ReconcileRun, RunOutcome, RunPhase};
pub use snapshot::Snapshot;
pub use store::{
    Document, DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, StoreError, WriteBatch,
    WriteOp,
};
