pub mod auth;
pub mod chats;
pub mod friends;
pub mod middleware;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes: public auth endpoints plus the bearer-protected friend and
/// chat endpoints.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/friends", get(friends::list_friends))
        .route("/friends/{user_id}", post(friends::add_friend))
        .route("/chat/group", post(chats::create_group))
        .route("/chat/group/{chat_id}", get(chats::get_group_chat))
        .route("/chat/{user_id}", get(chats::get_direct_chat))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
