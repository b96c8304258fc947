use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::FutureExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use posts_notifier::browser::ChromeSession;
use posts_notifier::config::LoggingConfig;
use posts_notifier::plugins::{EmailNotifier, ImageUploader, Mailer, ObjectStoreUploader};
use posts_notifier::relay::Services;
use posts_notifier::scanner::FeedTargets;
use posts_notifier::store::EXPORT_FILE_NAME;
use posts_notifier::web::{self, AppState};
use posts_notifier::{AppConfig, Coordinator, Monitor, ScanOptions, StateStore, run_cycle};

#[derive(Parser)]
#[command(name = "posts-notifier", version, about = "Emails digests of new marketplace listings and group posts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling service and the control page
    Run,
    /// Open the monitored pages, scan them once and exit
    Once,
    /// Print the stored settings and seen-set sizes
    Status,
    /// Write the seen-sets to a JSON file
    Export {
        #[arg(default_value = EXPORT_FILE_NAME)]
        out: PathBuf,
    },
    /// Replace the seen-sets from a JSON file
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    let store = StateStore::open(&config.storage.state_path).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, store).await,
        Command::Once => once(config, store).await,
        Command::Status => {
            let status = store.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Export { out } => {
            let json = store.export_seen().await?;
            tokio::fs::write(&out, json).await?;
            info!("Exported seen data to {}", out.display());
            Ok(())
        }
        Command::Import { file } => {
            let json = tokio::fs::read_to_string(&file).await?;
            let summary = store.import_seen(&json).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("posts_notifier=debug".parse()?);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn build_coordinator(config: &AppConfig, store: &StateStore) -> Result<(Arc<ChromeSession>, Coordinator<ChromeSession>)> {
    let session = Arc::new(ChromeSession::launch(&config.scraper)?);
    for page in &config.monitor.pages {
        match session.open(&page.url).await {
            Ok(_) => info!("Opened {} page {}", page.kind, page.url),
            Err(e) => tracing::warn!("Could not open {}: {}", page.url, e),
        }
    }

    let notifier = EmailNotifier::new(&config.notifications.smtp)?;
    match notifier.test_connection().await {
        Ok(true) => info!("SMTP server {} reachable", config.notifications.smtp.host),
        Ok(false) => tracing::warn!("SMTP server {} rejected the test connection", config.notifications.smtp.host),
        Err(e) => tracing::warn!("SMTP connection test failed: {}", e),
    }
    let mailer: Arc<dyn Mailer> = Arc::new(notifier);
    let uploader: Option<Arc<dyn ImageUploader>> = if config.upload.enabled {
        Some(Arc::new(ObjectStoreUploader::new(&config.upload, config.scraper.request_timeout)?))
    } else {
        None
    };

    let options = ScanOptions {
        targets: FeedTargets::new(&config.monitor.target_groups)?,
        timing: config.monitor.feed.clone(),
        capture_images: config.upload.enabled,
        marketplace_intro: config.monitor.marketplace_intro.clone(),
        resume_on_startup: config.monitor.resume_on_startup,
    };
    let monitor = Monitor::from_config(&config.monitor)?;
    let coordinator = Coordinator::new(
        Arc::clone(&session),
        monitor,
        store.clone(),
        Services { mailer, uploader },
        options,
    );
    Ok((session, coordinator))
}

async fn run(config: AppConfig, store: StateStore) -> Result<()> {
    info!("Starting Posts Notifier...");

    let metrics = if config.metrics.enabled {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let (_session, coordinator) = build_coordinator(&config, &store).await?;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down...");
    }
    .boxed()
    .shared();

    let state = AppState {
        store,
        metrics,
        metrics_endpoint: config.metrics.endpoint.clone(),
    };
    let server_config = config.server.clone();
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move { web::serve(&server_config, state, server_shutdown).await });

    coordinator.run(shutdown).await?;
    server.await??;
    Ok(())
}

async fn once(config: AppConfig, store: StateStore) -> Result<()> {
    let monitor = Monitor::from_config(&config.monitor)?;
    let (session, coordinator) = build_coordinator(&config, &store).await?;
    let ctx = coordinator.scan_context();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let relay_task = tokio::spawn(coordinator.run(async {
        let _ = stop_rx.await;
    }));

    let reports = run_cycle(session.as_ref(), &monitor, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let _ = stop_tx.send(());
    relay_task.await??;
    Ok(())
}
