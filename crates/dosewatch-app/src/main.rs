mod api;
mod dispatch;

use std::sync::Arc;

use salvo::conn::TcpListener;
use salvo::{Listener, Router};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use dosewatch_core::clock::{Clock, SystemClock};
use dosewatch_core::config::load_config;
use dosewatch_core::store::{JobStore, NotificationDispatcher, ReminderStore, UserDirectory};
use dosewatch_db::db::connection::create_pool;
use dosewatch_db::store::{PgJobStore, PgReminderStore, PgUserDirectory};
use dosewatch_service::notify::Notifier;
use dosewatch_service::queue::JobQueue;
use dosewatch_service::queue::worker::{JobHandler, QueueWorker, WorkerConfig};
use dosewatch_service::scheduler::ReminderScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting dosewatch reminder engine");

    let config = load_config()?;

    tracing::info!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    run_migrations(&config.database.url).await?;

    let pool = create_pool(
        &config.database.url,
        u32::from(config.database.max_connections),
    )
    .await?;

    tracing::info!("Database connection pool created.");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reminders: Arc<dyn ReminderStore> = Arc::new(PgReminderStore::new(pool.clone()));
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool));
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(dispatch::LogDispatcher);

    let notifier = Notifier::new(dispatcher, &config.notification.display_timezone)?;
    let queue = JobQueue::new(
        Arc::clone(&jobs),
        Arc::clone(&clock),
        config.scheduler.max_attempts,
    );
    let scheduler = Arc::new(ReminderScheduler::new(
        reminders,
        users,
        notifier,
        queue,
        Arc::clone(&clock),
        &config.scheduler,
    ));

    let primed = scheduler.initialize().await?;
    tracing::info!(primed, "initial scheduling pass complete");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let handler: Arc<dyn JobHandler> = Arc::clone(&scheduler) as Arc<dyn JobHandler>;
    let worker = Arc::new(QueueWorker::new(
        jobs,
        handler,
        Arc::clone(&clock),
        WorkerConfig {
            poll_interval: config.scheduler.poll_interval(),
            batch_size: config.scheduler.batch_size,
            retry_base: config.scheduler.retry_base(),
        },
    ));
    let worker_task = tokio::spawn(worker.run(shutdown_rx.clone()));

    // Full re-prime daily; a tighter safety scan catches anything a
    // restart or a missed hook left unscheduled.
    let refresh_task = tokio::spawn(reprime_loop(
        Arc::clone(&scheduler),
        config.scheduler.refresh_interval(),
        shutdown_rx.clone(),
    ));
    let scan_task = tokio::spawn(reprime_loop(
        Arc::clone(&scheduler),
        config.scheduler.safety_scan_interval(),
        shutdown_rx,
    ));

    let bind_addr = config.server.bind_addr();
    let acceptor = TcpListener::new(bind_addr.clone()).bind().await;
    let router = Router::new().push(api::healthcheck::routes());

    tracing::info!("Healthcheck listening on {bind_addr}");

    let server_task = tokio::spawn(async move {
        salvo::Server::new(acceptor).serve(router).await;
    });

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("all workers already stopped");
    }
    if let Err(err) = worker_task.await {
        tracing::error!(%err, "queue worker task failed");
    }
    refresh_task.abort();
    scan_task.abort();
    server_task.abort();

    Ok(())
}

/// Applies the embedded migrations on a blocking connection before the
/// async pool comes up.
async fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    use diesel::Connection;
    use diesel_migrations::MigrationHarness;

    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = diesel::PgConnection::establish(&url)?;
        conn.run_pending_migrations(dosewatch_db::MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("running migrations: {err}"))?;
        Ok(())
    })
    .await??;

    tracing::info!("Database migrations applied");
    Ok(())
}

async fn reprime_loop(
    scheduler: Arc<ReminderScheduler>,
    every: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately and the startup pass already ran.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scheduler.initialize().await {
                    Ok(primed) => tracing::debug!(primed, "periodic re-prime complete"),
                    Err(err) => tracing::error!(%err, "periodic re-prime failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to install SIGTERM handler");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
