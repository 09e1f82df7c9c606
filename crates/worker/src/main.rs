use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use entitle_infra::AppConfig;
use entitle_infra::jobs::JobStore;
use entitle_infra::notifications::TracingNotificationGateway;
use entitle_infra::runtime::InMemoryRuntime;

/// Runs the job executor until stdin is closed.
///
/// Usage: `entitle-worker [config.toml]`. Settings can also come from
/// `ENTITLE__*` environment variables.
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    entitle_observability::init(&config.observability);

    let runtime = InMemoryRuntime::new(&config, Arc::new(TracingNotificationGateway))
        .context("invalid licensing configuration")?;
    let handle = runtime
        .executor()
        .spawn(config.executor_config())
        .context("failed to spawn job workers")?;

    tracing::info!(
        workers = config.executor.workers,
        warning_ratio = config.licensing.warning_ratio,
        variance_threshold = config.budget.variance_threshold,
        "entitle worker started; close stdin to stop"
    );

    // Block until EOF; input is ignored.
    if let Err(e) = std::io::copy(&mut std::io::stdin().lock(), &mut std::io::sink()) {
        tracing::warn!(error = %e, "stdin read failed; shutting down");
    }

    let stats = handle.shutdown();
    let queue = runtime.jobs.stats().context("failed to read queue stats")?;
    tracing::info!(
        processed = stats.jobs_processed,
        succeeded = stats.jobs_succeeded,
        discarded = stats.jobs_discarded,
        failed = stats.jobs_failed,
        dead_lettered = stats.jobs_dead_lettered,
        pending = queue.pending,
        "entitle worker stopped"
    );

    Ok(())
}
