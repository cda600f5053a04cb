//! # Work Queue Service
//!
//! Binary entry point for the demo consumer.
//!
//! This executable:
//! - Parses command line arguments
//! - Initializes structured logging
//! - Loads layered settings and freezes the consumer configuration
//! - Seeds an in-memory queue and consumes it until Ctrl-C

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use work_queue_core::{
    InMemoryTransport, JsonSerializer, QueueConsumer, QueueProducer, TracedTransport,
    TypedHandler, WorkerNotification,
};
use work_queue_service::demo::{error_catalog, resize, seed_jobs, ResizeImage};
use work_queue_service::settings::{load_settings, CONFIG_FILE_ENV};

#[derive(Parser, Debug)]
#[command(name = "work-queue-service", version, about = "Demo work-queue consumer")]
struct Args {
    /// Settings file, applied over the default locations
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Override the number of seeded demo jobs
    #[arg(long)]
    seed: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "work_queue_service=info,work_queue_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting work queue service");

    let settings = match load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to load settings; aborting");
            std::process::exit(e.exit_code());
        }
    };

    let configuration = match settings.consumer_configuration(&error_catalog()) {
        Ok(configuration) => configuration,
        Err(e) => {
            error!(error = %e, "Consumer configuration is invalid; aborting");
            std::process::exit(e.exit_code());
        }
    };

    // -------------------------------------------------------------------------
    // Seed the queue
    // -------------------------------------------------------------------------
    let transport = Arc::new(TracedTransport::new(InMemoryTransport::default()));
    let producer = QueueProducer::new(transport.clone(), JsonSerializer);

    let seed = args.seed.unwrap_or(settings.demo.seed_messages);
    let outputs = producer.send_batch(seed_jobs(seed)).await;
    let failed = outputs.iter().filter(|o| o.has_error()).count();
    if failed > 0 {
        warn!(failed, total = outputs.len(), "Some demo jobs could not be enqueued");
    }
    info!(sent = outputs.len() - failed, "Seeded demo jobs");

    // -------------------------------------------------------------------------
    // Consume until interrupted
    // -------------------------------------------------------------------------
    let demo = settings.demo.clone();
    let handler = TypedHandler::new(
        JsonSerializer,
        move |job: ResizeImage, notification: WorkerNotification| {
            let demo = demo.clone();
            async move { resize(job, notification, &demo).await }
        },
    );

    let consumer = QueueConsumer::new(configuration, transport.clone(), handler);
    consumer.start().context("failed to start consumer")?;
    info!("Consumer running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    let outcome = consumer.stop().await.context("failed to stop consumer")?;
    let store = transport.inner();
    info!(
        outcome = ?outcome,
        remaining = store.message_count(),
        error_queue = store.error_queue_len(),
        "Work queue service stopped"
    );
    consumer.dispose();

    Ok(())
}
