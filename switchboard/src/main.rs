use axum::http::{header, HeaderValue, Method};
use ractor::Actor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use switchboard::actors::task_store::{TaskStoreActor, TaskStoreArguments};
use switchboard::api;
use switchboard::app_state::AppState;
use switchboard::config::{Config, GeneratorStrategy};
use switchboard::generator::{ConversationGenerator, OracleGenerator, ScriptedGenerator};
use switchboard::hub::BroadcastHub;
use switchboard::processor::TaskProcessor;

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load .env values early so oracle/pacing settings are available.
    // Search the current directory and ancestors so running from
    // `switchboard/` still picks up a repo-root `.env`.
    load_env_file();

    let config = Config::from_env()?;
    tracing::info!("Starting Switchboard task engine");

    let store_args = if config.database_path == ":memory:" {
        TaskStoreArguments::InMemory
    } else {
        TaskStoreArguments::File(config.database_path.clone())
    };
    let (store, _handle) = Actor::spawn(None, TaskStoreActor, store_args)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start task store: {e}"))?;
    tracing::info!("TaskStoreActor started");

    let generator = match config.generator_strategy {
        GeneratorStrategy::Scripted => {
            tracing::info!("Using scripted conversation generator");
            ConversationGenerator::Scripted(ScriptedGenerator::new())
        }
        GeneratorStrategy::Oracle => {
            tracing::info!(oracle_url = %config.oracle_url, "Using oracle conversation generator");
            ConversationGenerator::Oracle(OracleGenerator::new(
                config.oracle_url.clone(),
                config.oracle_task_id.clone(),
                config.oracle_timeout,
            )?)
        }
    };

    let hub = BroadcastHub::new();
    let processor = TaskProcessor::new(store.clone(), hub.clone(), generator, config.pacing());
    let app_state = Arc::new(AppState::new(store, processor));

    // Configure CORS to allow known UI origins
    let allowed_origins = config
        .cors_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    let api_state = api::ApiState { app_state, hub };
    let app = api::router().with_state(api_state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting HTTP server on http://{addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
