use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use kinship_types::api::{ChatPageResponse, ChatResponse, Claims, CreateGroupRequest};
use kinship_types::models::{Chat, Pagination};

use crate::auth::AppState;
use crate::blocking;

const MAX_PAGE: u32 = 10;
const MAX_LIMIT: u32 = 50;
const MAX_GROUP_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    5
}

impl PageQuery {
    fn validate(&self) -> Result<(), StatusCode> {
        if (1..=MAX_PAGE).contains(&self.page) && (1..=MAX_LIMIT).contains(&self.limit) {
            Ok(())
        } else {
            Err(StatusCode::BAD_REQUEST)
        }
    }

    fn respond(&self, chat: Chat, total: u64) -> Json<ChatPageResponse> {
        Json(ChatPageResponse {
            chat,
            pagination: Pagination::new(self.page, self.limit, total),
        })
    }
}

/// The caller's direct chat with `user_id`, newest page first.
pub async fn get_direct_chat(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    query.validate()?;

    let db = state.db.clone();
    let (page, limit) = (query.page, query.limit);
    let (chat, total) = blocking(move || db.direct_chat_page(claims.sub, user_id, page, limit))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(query.respond(chat, total))
}

pub async fn get_group_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    query.validate()?;

    let db = state.db.clone();
    let (page, limit) = (query.page, query.limit);
    let (chat, total) = blocking(move || db.group_chat_page(chat_id, claims.sub, page, limit))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(query.respond(chat, total))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_string();
    if !(3..=50).contains(&name.chars().count()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !(2..=MAX_GROUP_SIZE).contains(&req.participants.len()) {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Creator first, then the requested members in order, without repeats.
    let mut members = vec![claims.sub];
    for id in req.participants {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    if members.len() < 2 || members.len() > MAX_GROUP_SIZE {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let creator = claims.sub;
    let group_name = name.clone();
    let chat = blocking(move || {
        if db.count_existing_users(&members)? != members.len() {
            return Ok(None);
        }
        db.create_group(&group_name, creator, &members).map(Some)
    })
    .await?
    .ok_or(StatusCode::BAD_REQUEST)?;

    info!(
        "{} ({}) created group '{}' ({}) with {} members",
        claims.username,
        claims.sub,
        name,
        chat.id,
        chat.participants.len()
    );
    Ok((StatusCode::CREATED, Json(ChatResponse { chat })))
}
