use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use careflow_core::{
    ActivityEngine, CoreConfig, MemoryDirectory, MemoryStore, TypeRegistry,
    clinical::register_clinical_types,
};

/// Main entry point for the careflow application
///
/// Builds the activity engine with the clinical data types registered and serves the REST API.
///
/// # Environment Variables
/// - `CAREFLOW_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CAREFLOW_CONFIG`: Path to the engine's YAML configuration (default: built-in values)
/// - `CAREFLOW_API_KEY`: API key required in `x-api-key` on activity routes (default: open)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, binding or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("careflow=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = match std::env::var("CAREFLOW_CONFIG") {
        Ok(path) => {
            tracing::info!("++ Loading configuration from {}", path);
            CoreConfig::load(Path::new(&path))?
        }
        Err(_) => CoreConfig::default(),
    };
    let rest_addr = std::env::var("CAREFLOW_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("CAREFLOW_API_KEY")
        .ok()
        .filter(|key| !key.is_empty());
    if api_key.is_none() {
        tracing::warn!("CAREFLOW_API_KEY is not set, activity routes are open");
    }

    let mut registry = TypeRegistry::new();
    register_clinical_types(&mut registry, &cfg)?;
    tracing::info!("++ Registered {} activity data types", registry.len());

    let engine = ActivityEngine::new(
        Arc::new(cfg),
        Arc::new(registry),
        Arc::new(MemoryDirectory::new()),
        Box::new(MemoryStore::new()),
    );
    let app = router(AppState::new(engine, api_key));

    tracing::info!("++ Starting careflow REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
