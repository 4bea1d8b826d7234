//! Shared helpers for the API integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use foodgram::config::Config;
use foodgram::database::{init_db, AppState};
use foodgram::route::create_app;
use foodgram::{seed, store};

/// Ids of the default tags, in seeding order
pub const BREAKFAST: u64 = 1;
pub const LUNCH: u64 = 2;
pub const DINNER: u64 = 3;

/// Creates a test application with a temporary database and the default tags
pub fn setup_test_app() -> (Router, AppState, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();

    let db = init_db(db_path).expect("Failed to initialize test database");
    seed::load_default_tags(&db).expect("Failed to seed tags");

    let state = AppState::new(db, Config::default());
    (create_app(state.clone()), state, temp_db)
}

/// Adds an ingredient directly through the store and returns its id
pub fn add_ingredient(state: &AppState, name: &str, unit: &str) -> u64 {
    store::create_ingredient(&state.db, name, unit)
        .expect("Failed to create ingredient")
        .id
}

/// Helper function to parse response body as JSON
pub async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

pub async fn response_text(body: Body) -> String {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

/// Sends a request, optionally authenticated and with a JSON body
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Token {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

/// Registers `username` and returns (user id, token)
pub async fn register(app: &Router, username: &str) -> (u64, String) {
    let payload = json!({
        "email": format!("{username}@example.com"),
        "username": username,
        "first_name": "Test",
        "last_name": username,
    });

    let response = send(app, "POST", "/api/users", None, Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    (
        body["id"].as_u64().unwrap(),
        body["auth_token"].as_str().unwrap().to_string(),
    )
}

/// A valid recipe payload using the given tags and (ingredient id, amount) pairs
pub fn recipe_payload(name: &str, tags: &[u64], ingredients: &[(u64, i64)]) -> Value {
    json!({
        "name": name,
        "image": "data:image/png;base64,iVBORw0KGgo=",
        "text": "Mix everything and cook.",
        "cooking_time": 15,
        "tags": tags,
        "ingredients": ingredients
            .iter()
            .map(|(id, amount)| json!({ "id": id, "amount": amount }))
            .collect::<Vec<_>>(),
    })
}

/// Creates a recipe as `token` and returns its id
pub async fn create_recipe(
    app: &Router,
    token: &str,
    name: &str,
    tags: &[u64],
    ingredients: &[(u64, i64)],
) -> u64 {
    let payload = recipe_payload(name, tags, ingredients);
    let response = send(app, "POST", "/api/recipes", Some(token), Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    body["id"].as_u64().unwrap()
}
