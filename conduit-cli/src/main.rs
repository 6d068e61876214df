//! Process entry point: config, logging, storage, and the two listener
//! loops (spec.md §6.6). Exit codes: 0 clean shutdown, 1 startup failure,
//! 2 bind failure.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use conduit_cli::CliArgs;
use conduit_core::{Notifier, SessionRegistry, ToolExecutor, TurnOrchestrator};
use conduit_hooks::HookManager;
use conduit_providers::{MockProvider, ProviderRegistry};
use conduit_rpc::{run_health_server, run_ws_server, RpcNotifier, RpcState, SubscriberRegistry};
use conduit_store::{ConnectionConfig, Store};

const STARTUP_FAILURE: u8 = 1;
const BIND_FAILURE: u8 = 2;

/// The only provider this binary ships with: concrete LLM HTTP clients are
/// out of scope, so the coordinator boots with the in-memory double wired
/// up as a real, reachable provider rather than a test fixture.
const BUNDLED_PROVIDER: &str = "mock";

#[tokio::main]
async fn main() -> ExitCode {
    let config = CliArgs::parse().resolve();
    conduit_cli::logging::init(&config.log_level);

    if let Some(parent) = config.db_path.parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(error = %err, path = %parent.display(), "failed to create database directory");
            return ExitCode::from(STARTUP_FAILURE);
        }
    }

    let db_path = config.db_path.to_string_lossy().into_owned();
    let store = match Store::open_file(&db_path, &ConnectionConfig::default()).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, db = %db_path, "failed to open session database");
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let providers = Arc::new(ProviderRegistry::new());
    providers.register(Arc::new(MockProvider::new(BUNDLED_PROVIDER)));

    let tools = Arc::new({
        let mut executor = ToolExecutor::new(Arc::new(HookManager::new()), store.blobs.clone());
        executor.register(Arc::new(conduit_core::EchoTool));
        executor
    });

    let subscribers = Arc::new(SubscriberRegistry::new());
    let notifier: Arc<dyn Notifier> = Arc::new(RpcNotifier::new(subscribers.clone()));
    let orchestrator = Arc::new(TurnOrchestrator::new(store.clone(), providers.clone(), tools, notifier));
    let sessions = Arc::new(SessionRegistry::new(store.clone()));
    let state = Arc::new(RpcState::new(sessions, orchestrator, providers, subscribers, BUNDLED_PROVIDER));

    let ws_handle = tokio::spawn(run_ws_server(state.clone(), config.ws_port));
    let health_handle = tokio::spawn(run_health_server(config.health_port));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            ExitCode::SUCCESS
        }
        result = ws_handle => {
            log_listener_exit("websocket", result);
            ExitCode::from(BIND_FAILURE)
        }
        result = health_handle => {
            log_listener_exit("health", result);
            ExitCode::from(BIND_FAILURE)
        }
    }
}

fn log_listener_exit(name: &str, result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::error!(%name, "listener loop exited unexpectedly"),
        Ok(Err(err)) => tracing::error!(%name, error = %err, "listener failed to bind"),
        Err(err) => tracing::error!(%name, error = %err, "listener task panicked"),
    }
}
