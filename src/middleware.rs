use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::database::AppState;
use crate::model::Caller;
use crate::store::resolve_token;

/// Middleware resolving the caller identity from the `Authorization` header
///
/// The header is expected as `Authorization: Token <key>`. Requests without
/// the header continue as [`Caller::Anonymous`]; a malformed header or an
/// unknown key is rejected with 401. The resolved [`Caller`] is stored in the
/// request extensions for handlers to extract.
pub async fn caller_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let unauthorized_response = |message: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Unauthorized",
                "code": "unauthorized",
                "message": message,
            })),
        )
            .into_response()
    };

    let caller = match request.headers().get(AUTHORIZATION) {
        None => Caller::Anonymous,
        Some(header_value) => {
            let key = header_value
                .to_str()
                .ok()
                .and_then(|value| value.strip_prefix("Token "))
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| unauthorized_response("Invalid authorization header"))?;

            match resolve_token(&state.db, key) {
                Ok(Some(user_id)) => Caller::User(user_id),
                Ok(None) => {
                    warn!("request with unknown API token");
                    return Err(unauthorized_response("Invalid token"));
                }
                Err(e) => return Err(e.into_response()),
            }
        }
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
