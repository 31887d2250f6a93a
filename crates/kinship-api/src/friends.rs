use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use kinship_types::api::{Claims, FriendsResponse};

use crate::auth::AppState;
use crate::blocking;

/// Link the caller and `user_id` as friends. Linking twice is a no-op.
pub async fn add_friend(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    if user_id == claims.sub {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let me = claims.sub;
    let linked = blocking(move || {
        if db.get_user_by_id(user_id)?.is_none() {
            return Ok(None);
        }
        db.add_friendship(me, user_id).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if linked {
        info!("{} ({}) is now friends with {}", claims.username, claims.sub, user_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let friends = blocking(move || db.friends_of(claims.sub)).await?;
    Ok(Json(FriendsResponse { friends }))
}
