mod config;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, info, warn};

use kinship_api::auth::{AppState, AppStateInner};
use kinship_db::Database;
use kinship_gateway::connection;
use kinship_gateway::{Gateway, GatewayConfig};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinship=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let mut gateway_config = GatewayConfig::new(config.jwt_secret.clone());
    gateway_config.offline_debounce = config.presence_debounce;
    let gateway = Gateway::with_database(gateway_config, db.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let app = Router::new()
        .merge(kinship_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(request_span));

    let addr = config.addr()?;
    info!("Kinship server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Request span without the query string: `/gateway` may carry the access
/// token there.
fn request_span(req: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        version = ?req.version(),
    )
}

/// Authenticate before upgrading: the token comes from the `Authorization`
/// header, or the `authorization` query parameter for browser sockets.
async fn ws_upgrade(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| params.get("authorization").cloned());

    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match gateway.authenticate(&token).await {
        Ok(user) => ws
            .on_upgrade(move |socket| connection::handle_connection(socket, gateway, user))
            .into_response(),
        Err(e) => {
            warn!("gateway upgrade refused: {}", e);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}
