use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use kinship_api::auth::AppStateInner;
use kinship_api::router;
use kinship_db::Database;

struct Harness {
    db: Arc<Database>,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            jwt_secret: "api-test-secret".into(),
            token_ttl_days: 1,
        });
        Self { db, app: router(state) }
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let res = self.app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register a user and return (id, token).
    async fn register(&self, username: &str) -> (Uuid, String) {
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({"username": username, "password": "correct horse"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["userId"].as_str().unwrap().parse().unwrap();
        (id, body["token"].as_str().unwrap().to_string())
    }
}

#[tokio::test]
async fn register_login_and_duplicate_username() {
    let h = Harness::new();
    let (id, _) = h.register("amal").await;

    let (status, _) = h
        .call("POST", "/auth/register", None, Some(json!({"username": "amal", "password": "whatever1"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
        .call("POST", "/auth/login", None, Some(json!({"username": "amal", "password": "correct horse"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], json!(id));
    assert_eq!(body["username"], "amal");

    let (status, _) = h
        .call("POST", "/auth/login", None, Some(json!({"username": "amal", "password": "wrong horse"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_bearer_token() {
    let h = Harness::new();
    let (status, _) = h.call("GET", "/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.call("GET", "/friends", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn friend_linking_is_symmetric_and_idempotent() {
    let h = Harness::new();
    let (amal, amal_token) = h.register("amal").await;
    let (basil, basil_token) = h.register("basil").await;

    let uri = format!("/friends/{}", basil);
    assert_eq!(h.call("POST", &uri, Some(&amal_token), None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(h.call("POST", &uri, Some(&amal_token), None).await.0, StatusCode::NO_CONTENT);

    let (_, body) = h.call("GET", "/friends", Some(&basil_token), None).await;
    assert_eq!(body["friends"], json!([amal]));

    let own = format!("/friends/{}", amal);
    assert_eq!(h.call("POST", &own, Some(&amal_token), None).await.0, StatusCode::BAD_REQUEST);

    let ghost = format!("/friends/{}", Uuid::new_v4());
    assert_eq!(h.call("POST", &ghost, Some(&amal_token), None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_chat_pages_count_back_from_the_newest_message() {
    let h = Harness::new();
    let (amal, token) = h.register("amal").await;
    let (basil, _) = h.register("basil").await;
    for i in 1..=7 {
        h.db.append_direct_message(amal, basil, &format!("m{}", i)).unwrap();
    }

    let (status, body) = h.call("GET", &format!("/chat/{}", basil), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = body["chat"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["m3", "m4", "m5", "m6", "m7"]);
    assert_eq!(body["pagination"], json!({"page": 1, "limit": 5, "total": 7, "totalPages": 2}));

    let (_, body) = h
        .call("GET", &format!("/chat/{}?page=2", basil), Some(&token), None)
        .await;
    assert_eq!(body["chat"]["messages"].as_array().unwrap().len(), 2);

    for bad in ["page=0", "page=11", "limit=0", "limit=51", "page=abc"] {
        let (status, _) = h
            .call("GET", &format!("/chat/{}?{}", basil, bad), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
    }

    let (stranger, _) = h.register("stranger").await;
    let (status, _) = h.call("GET", &format!("/chat/{}", stranger), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn group_creation_validates_members() {
    let h = Harness::new();
    let (amal, token) = h.register("amal").await;
    let (basil, _) = h.register("basil").await;
    let (cyra, cyra_token) = h.register("cyra").await;

    let (status, body) = h
        .call(
            "POST",
            "/chat/group",
            Some(&token),
            Some(json!({"name": "book club", "participants": [basil, cyra, basil]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["chat"]["participants"], json!([amal, basil, cyra]));
    assert_eq!(body["chat"]["groupName"], "book club");
    assert!(body["chat"]["roomId"].is_string());

    let chat_id = body["chat"]["id"].as_str().unwrap().to_string();
    let (status, body) = h
        .call("GET", &format!("/chat/group/{}", chat_id), Some(&cyra_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);

    let (_, outsider_token) = h.register("outsider").await;
    let (status, _) = h
        .call("GET", &format!("/chat/group/{}", chat_id), Some(&outsider_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let cases = [
        json!({"name": "ab", "participants": [basil, cyra]}),
        json!({"name": "solo", "participants": [basil]}),
        json!({"name": "just me", "participants": [amal, amal]}),
        json!({"name": "ghosts", "participants": [basil, Uuid::new_v4()]}),
    ];
    for case in cases {
        let (status, _) = h.call("POST", "/chat/group", Some(&token), Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", case);
    }
}
