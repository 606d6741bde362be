//! Incident service binary.
//!
//! Wires the lifecycle engine to its reactive components. Handler order is
//! fixed: reports first, tracker sync second, notifications last, so chat
//! messages can reference report links created in the same dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chatops::{ChatSink, NotificationDispatcher, ReminderConfig, ReminderScanner, WebhookChannel};
use incident::{Dispatcher, IncidentStore, LifecycleEngine, LifecycleHandler};
use reports::{BackendReadiness, ReportBackend, ReportOrchestrator, TrackerReportBackend, WikiBackend};
use tracker_sync::{InboundProcessor, SyncBridge, TrackerApi, TrackerClient, WorkflowGraph};

use incident_server::{build_router, AppState, Config, WebhookQueue, WebhookWorker};

#[derive(Debug, Parser)]
#[command(name = "incident-server", about = "Incident lifecycle service")]
struct Args {
    /// Override the listen port from the environment
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("incident_server=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = Config::default();
    if let Some(port) = args.port {
        config.port = port;
    }
    let features = config.features;

    info!(
        wiki_reports = features.wiki_reports,
        tracker_reports = features.tracker_reports,
        tracker_sync = features.tracker_sync,
        "Starting incident service"
    );

    let store = IncidentStore::new();
    let chat: Arc<dyn ChatSink> = Arc::new(WebhookChannel::from_env());

    let tracker_api: Option<Arc<dyn TrackerApi>> =
        match (&config.tracker_base_url, &config.tracker_token) {
            (Some(base), Some(token)) => {
                Some(Arc::new(TrackerClient::new(base.clone(), token.clone())))
            }
            _ => {
                if features.tracker_sync || features.tracker_reports {
                    warn!("Tracker features enabled but TRACKER_BASE_URL/TRACKER_TOKEN not set");
                }
                None
            }
        };

    let mut backends: Vec<Arc<dyn ReportBackend>> = Vec::new();
    if features.wiki_reports {
        match (&config.wiki_base_url, &config.wiki_token) {
            (Some(base), Some(token)) => {
                backends.push(Arc::new(WikiBackend::new(
                    base.clone(),
                    token.clone(),
                    config.wiki_space.clone(),
                )));
            }
            _ => warn!("Wiki reports enabled but WIKI_BASE_URL/WIKI_TOKEN not set"),
        }
    }
    if features.tracker_reports {
        if let Some(api) = &tracker_api {
            backends.push(Arc::new(TrackerReportBackend::new(
                Arc::clone(api),
                store.clone(),
                config.tracker_project.clone(),
            )));
        }
    }

    let readiness = Arc::new(BackendReadiness::new(backends.clone()));
    let notifications = Arc::new(NotificationDispatcher::new(
        Arc::clone(&chat),
        store.clone(),
        features,
    ));

    let mut dispatcher = Dispatcher::new().with_handler(Arc::new(ReportOrchestrator::new(
        store.clone(),
        features,
        backends,
        Arc::clone(&chat),
    )));
    if let Some(api) = &tracker_api {
        dispatcher = dispatcher.with_handler(Arc::new(SyncBridge::new(
            Arc::clone(api),
            store.clone(),
            WorkflowGraph::standard(),
            features,
            config.tracker_project.clone(),
        )));
    }
    dispatcher =
        dispatcher.with_handler(Arc::clone(&notifications) as Arc<dyn LifecycleHandler>);

    let engine = Arc::new(LifecycleEngine::new(
        store.clone(),
        features,
        readiness,
        dispatcher,
    ));

    let (queue, rx) = WebhookQueue::new(config.queue_capacity);
    let worker = WebhookWorker::new(
        InboundProcessor::new(Arc::clone(&engine)),
        Arc::clone(&notifications),
    );
    tokio::spawn(worker.run(rx));

    let scanner = Arc::new(ReminderScanner::new(
        store,
        chat,
        features,
        ReminderConfig::default(),
    ));
    tokio::spawn(scanner.run(Duration::from_secs(config.reminder_interval_secs)));

    let app = build_router(AppState {
        engine,
        queue,
        webhook_secret: config.webhook_secret.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install shutdown handler");
    } else {
        info!("Shutdown signal received");
    }
}
