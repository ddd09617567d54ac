use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slicer_binder::binder::{Binder, NextOutcome};
use slicer_binder::config::BinderConfig;
use slicer_binder::merge::ToolMerger;
use slicer_binder::transfer::LocalTransfer;

/// Exit status after losing a claim race: try again later.
const EXIT_TEMPFAIL: u8 = 75;

/// Pause after a collision before exiting, in seconds.
const COLLISION_BACKOFF_SECS: std::ops::RangeInclusive<u64> = 10..=40;

/// Polls until one raw file is reconciled, then exits.
///
/// The binder is single-shot: any outcome other than "nothing ready" ends
/// the process, and a supervisor (cron, systemd, a batch queue) starts the
/// next run.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slicer_binder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = BinderConfig::from_env();
    tracing::info!(
        staging = %config.staging_dir.display(),
        scratch = %config.scratch_dir.display(),
        poll_secs = config.poll_interval.as_secs(),
        "Loaded binder configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = slicer_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    slicer_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let binder = Binder::new(
        pool.clone(),
        config.clone(),
        Arc::new(LocalTransfer::new(&config.staging_dir)),
        Arc::new(ToolMerger {
            timeout: config.merge_timeout,
        }),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let code = run(&binder, config.poll_interval, &cancel).await;
    pool.close().await;
    code
}

async fn run(binder: &Binder, poll_interval: Duration, cancel: &CancellationToken) -> ExitCode {
    loop {
        // A reconciliation in flight is not interrupted; cancellation is
        // only observed while idle.
        match binder.next().await {
            Ok(NextOutcome::NothingReady) => {
                tracing::debug!(poll_secs = poll_interval.as_secs(), "Nothing ready");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Binder stopping");
                        return ExitCode::SUCCESS;
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Ok(NextOutcome::Bound {
                raw_file_id,
                status,
            }) => {
                tracing::info!(raw_file_id, status, "Binding finished");
                return ExitCode::SUCCESS;
            }
            Ok(NextOutcome::Collision) => {
                let secs = rand::rng().random_range(COLLISION_BACKOFF_SECS);
                tracing::info!(backoff_secs = secs, "Collision, backing off before exit");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                }
                return ExitCode::from(EXIT_TEMPFAIL);
            }
            Err(e) => {
                tracing::error!(error = %e, "Binder failed");
                return ExitCode::FAILURE;
            }
        }
    }
}

/// Cancel `token` on SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C)"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
    token.cancel();
}
