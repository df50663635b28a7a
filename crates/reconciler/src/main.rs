use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use stockwarden_infra::{
    CancelToken, FanoutReportSink, JsonFileReportSink, PostgresDocumentStore, ReconcileConfig,
    ReconcileRun, RunStatus, TracingReportSink,
};

/// First positional argument, if any, names the product collection to repair.
fn product_collection_override(args: impl IntoIterator<Item = String>) -> Option<String> {
    args.into_iter()
        .skip(1)
        .map(|a| a.trim().to_string())
        .find(|a| !a.is_empty())
}

async fn reconcile() -> anyhow::Result<RunStatus> {
    let mut config = ReconcileConfig::from_env().context("invalid configuration")?;
    if let Some(products) = product_collection_override(std::env::args()) {
        config = config.with_product_collection(products);
        config.validate().context("invalid configuration")?;
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = PostgresDocumentStore::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let mut sink = FanoutReportSink::new().with(Arc::new(TracingReportSink));
    if let Some(path) = &config.report_path {
        sink = sink.with(Arc::new(JsonFileReportSink::new(path.clone())));
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping before the next write");
            on_signal.cancel();
        }
    });

    let mut run = ReconcileRun::new(store, sink, config).with_cancel_token(cancel);
    let outcome = run.execute(Utc::now()).await?;
    Ok(outcome.status())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    stockwarden_observability::init();

    match reconcile().await {
        Ok(status) => {
            tracing::info!(status = status.as_str(), "reconciliation finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}
