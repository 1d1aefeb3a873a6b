use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use replistate::config::StateMachineConfig;
use replistate::dump::InMemoryValueStorage;
use replistate::log::InMemoryLog;
use replistate::methods::{LocalStateMethods, StateMethods};
use replistate::registry::Registry;
use replistate::rpc::{self, AppState};
use replistate::{LogId, ParticipantId, Result};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let bind_addr = env::var("REPLISTATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8529".to_string());
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| replistate::Error::Other(anyhow::anyhow!("invalid bind address {bind_addr}: {e}")))?;

    let config = StateMachineConfig::new(addr);
    let self_id = ParticipantId::new();

    info!(%addr, flush_batch_size = config.flush_batch_size, "replistated starting");

    let registry = Arc::new(Registry::new());
    let log = Arc::new(InMemoryLog::new());
    let storage = Arc::new(InMemoryValueStorage::new());

    let methods: Arc<dyn StateMethods> = Arc::new(LocalStateMethods::new(
        Arc::clone(&registry),
        log.clone(),
        storage.clone(),
        config.flush_batch_size,
        self_id,
    ));

    if let Ok(seed) = env::var("REPLISTATE_SEED_LOG_ID") {
        let log_id: LogId = seed
            .parse()
            .map_err(|e| replistate::Error::Other(anyhow::anyhow!("invalid seed log id: {e}")))?;
        methods.create_state(log_id).await?;
        info!(%log_id, "seeded initial log instance as leader");
    }

    let app = rpc::router(AppState { methods });
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| replistate::Error::Other(anyhow::anyhow!("failed to bind {addr}: {e}")))?;

    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| replistate::Error::Other(anyhow::anyhow!("server error: {e}")))?;

    Ok(())
}
