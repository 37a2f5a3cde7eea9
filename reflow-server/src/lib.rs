// Copyright 2025 Reflow Contributors (https://github.com/reflow-dev/reflow)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

pub mod api;
pub mod auth;
pub mod config;
pub mod conversation_registry;
pub mod producer;
pub mod publisher;
pub mod resumer;

use anyhow::Result;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{
    create_conversation, get_conversation, get_session, health_check, health_check_detailed,
    list_conversations, resume_stream, start_stream, AppState,
};
use auth::{auth_middleware, ApiKeyAuth, Authenticator, BearerTokenAuth, MultiAuth, NoAuth};
use config::ServerConfig;
use conversation_registry::ConversationRegistry;
use producer::{EchoProducer, FragmentProducer};
use publisher::{ActiveStreams, StreamPublisher};
use reflow_storage::{ChunkStore, MemoryChunkLog};
use resumer::StreamResumer;

/// Wire up the shared application state from a configuration.
pub fn build_state(config: &ServerConfig, producer: Arc<dyn FragmentProducer>) -> AppState {
    let chunk_store: Arc<dyn ChunkStore> = Arc::new(MemoryChunkLog::with_config(
        config.retention.chunk_log_config(),
    ));
    let streams = Arc::new(ActiveStreams::new());
    let publisher = Arc::new(StreamPublisher::new(chunk_store.clone(), streams.clone()));
    let resumer = Arc::new(StreamResumer::new(
        chunk_store.clone(),
        streams.clone(),
        config.retention.read_timeout(),
    ));

    AppState {
        chunk_store,
        streams,
        conversations: Arc::new(ConversationRegistry::new()),
        producer,
        publisher,
        resumer,
    }
}

/// Pick the authentication strategy for a configuration.
pub fn build_authenticator(config: &ServerConfig) -> Result<Arc<dyn Authenticator>> {
    if !config.auth.enabled {
        tracing::warn!(
            "Authentication is disabled; all requests run as tenant 1. \
            Enable it in the [auth] config section for anything beyond local development."
        );
        return Ok(Arc::new(NoAuth::new(1)));
    }

    let mut strategies: Vec<Arc<dyn Authenticator>> = vec![];

    if let Some(jwt_secret) = config.auth.jwt_secret.clone() {
        tracing::info!("JWT authentication enabled");
        strategies.push(Arc::new(BearerTokenAuth::new(jwt_secret)));
    }

    if !config.auth.api_keys.is_empty() {
        tracing::info!(
            "API key authentication enabled ({} keys)",
            config.auth.api_keys.len()
        );
        strategies.push(Arc::new(ApiKeyAuth::new(config.auth.api_keys.clone())));
    }

    if strategies.is_empty() {
        anyhow::bail!("Authentication enabled but no strategies configured");
    }

    Ok(Arc::new(MultiAuth::new(strategies)))
}

/// Build the application router.
pub fn router(
    state: AppState,
    authenticator: Arc<dyn Authenticator>,
    enable_cors: bool,
) -> Router {
    let authed_routes = Router::new()
        .route(
            "/api/v1/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/v1/conversations/:conversation_id",
            get(get_conversation),
        )
        .route(
            "/api/v1/conversations/:conversation_id/stream",
            post(start_stream).delete(api::clear_stream),
        )
        .route(
            "/api/v1/conversations/:conversation_id/resume",
            get(resume_stream),
        )
        .route("/api/v1/sessions/:session_id", get(get_session))
        .route("/api/v1/health", get(health_check_detailed))
        .layer(axum_middleware::from_fn(auth_middleware))
        .layer(Extension(authenticator));

    Router::new()
        .route("/health", get(health_check))
        .merge(authed_routes)
        .with_state(state)
        .layer(if enable_cors {
            CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any)
        } else {
            CorsLayer::new()
        })
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflow_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Reflow server");
    tracing::info!("Configuration: {:#?}", config);

    config.validate()?;

    let producer: Arc<dyn FragmentProducer> = Arc::new(EchoProducer::default());
    let state = build_state(&config, producer);
    let authenticator = build_authenticator(&config)?;

    if !config.server.cors_origins.is_empty() {
        tracing::info!("CORS origins configured: {:?}", config.server.cors_origins);
    }

    let app = router(state, authenticator, config.server.enable_cors);

    let addr = config.socket_addr()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
