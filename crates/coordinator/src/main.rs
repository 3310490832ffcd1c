mod auth;
mod collaborators;
mod config;
mod error;
mod evaluator_client;
#[cfg(test)]
mod harness_test;
mod registry;
mod router;
mod state_machine;
mod tracker;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quiz_bus::QuizBus;
use quiz_cache::QuizCache;
use secrecy::SecretString;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Args;
use evaluator_client::EvaluatorClient;
use registry::ConnectionRegistry;
use state_machine::SessionMachine;
use tracker::Tracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::load().context("loading coordinator configuration")?;

    // Startup is the one place a connection failure is fatal: the spec
    // requires the process to abort if it cannot reach the cache or bus.
    let cache = QuizCache::connect(&args.redis_url)
        .await
        .context("connecting to cache")?;
    let cache: Arc<dyn collaborators::Cache> = Arc::new(cache);
    let bus = QuizBus::connect(&args.amqp_url, &args.amqp_exchange)
        .await
        .context("connecting to bus")?;
    let bus = Arc::new(bus);
    let evaluator: Arc<dyn collaborators::Evaluator> =
        Arc::new(EvaluatorClient::new(args.evaluator_url.clone()));

    let tracker = Arc::new(Tracker::new(cache.clone(), evaluator));
    tracker
        .restore()
        .await
        .context("restoring sessions from cache")?;

    let registry = ConnectionRegistry::new();
    let machine = SessionMachine::new(registry, tracker, bus.clone());

    spawn_bus_consumers(machine.clone(), bus);

    let state = router::AppState {
        machine: machine.clone(),
        jwt_secret: SecretString::new(args.jwt_secret.clone().into_boxed_str()),
    };
    let app = router::build(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&args.bind_addr)
        .await
        .with_context(|| format!("binding {}", args.bind_addr))?;
    info!(addr = %args.bind_addr, "realtime coordinator listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(args.shutdown_grace_secs))
        .await
        .context("http server error")?;

    machine.shutdown().await;

    Ok(())
}

/// Runs the two durable top-level consumers (`session.start`, `session.end`)
/// for the lifetime of the process. Each is its own task, matching the
/// spec's "every long-lived activity runs as an independent task".
fn spawn_bus_consumers(machine: SessionMachine, bus: Arc<QuizBus>) {
    let start_machine = machine.clone();
    let start_bus = bus.clone();
    tokio::spawn(async move {
        start_bus
            .run_session_start(move |event| {
                let machine = start_machine.clone();
                async move { machine.on_session_start(event.session_id, event.quiz).await }
            })
            .await;
    });

    let end_machine = machine;
    tokio::spawn(async move {
        bus.run_session_end(move |event| {
            let machine = end_machine.clone();
            async move { machine.on_session_end(&event.session_id).await }
        })
        .await;
    });
}

/// Waits for `ctrl_c` (and `SIGTERM` on unix), then returns so axum begins
/// its graceful-shutdown drain. A watchdog spawned once the signal fires
/// forces the process to exit if connections haven't drained within
/// `grace_secs`, giving the drain a hard upper bound as the spec requires.
async fn shutdown_signal(grace_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(grace_secs, "shutdown signal received, draining");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(grace_secs)).await;
        warn!("graceful shutdown grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
