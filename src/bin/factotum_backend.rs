use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use factotum::chat::ChatService;
use factotum::config::FactotumConfig;
use factotum::database::AssistantDatabase;
use factotum::gateway::{CapabilityGateway, HttpGateway, LocalGateway};
use factotum::media::MediaService;
use factotum::reasoning::ReasoningService;
use factotum::search::SearchService;
use factotum::server::{serve, ServerState};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,factotum=debug")),
        )
        .init();

    let config = FactotumConfig::load();

    let bind_addr = config
        .backend_bind
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid backend_bind '{}' (expected host:port)", config.backend_bind))?;

    let db = Arc::new(
        AssistantDatabase::new(&config.database_path)
            .with_context(|| format!("Failed to open database at {}", config.database_path))?,
    );
    let seeded = db
        .seed_default_models()
        .context("Failed to seed model catalog")?;
    if seeded > 0 {
        tracing::info!("Seeded {} default models into the catalog", seeded);
    }

    let gateway: Arc<dyn CapabilityGateway> = if config.llm_api_url.trim().is_empty() {
        tracing::info!("No LLM API URL configured; using the offline placeholder gateway");
        Arc::new(LocalGateway::new(db.clone()))
    } else {
        tracing::info!("Using LLM API at {}", config.llm_api_url);
        Arc::new(HttpGateway::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.request_timeout_secs,
            db.clone(),
        ))
    };

    let state = Arc::new(ServerState {
        chat: ChatService::new(db.clone(), gateway.clone()),
        media: MediaService::new(db.clone(), gateway.clone()),
        search: SearchService::new(db.clone(), gateway.clone()),
        reasoning: ReasoningService::new(gateway),
        db,
    });

    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(serve(state, bind_addr))
}
