use axum::{
    extract::{FromRequest, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use zeroize::ZeroizeOnDrop;

use crate::{
    render,
    store::StoreError,
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

/// Body of `POST /v1/secret`. Signed integers so that negative input is
/// rejected as invalid rather than as unparsable.
#[derive(Debug, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub secret: String,
    pub expire_after_views: i64,
    /// Minutes until the secret dies; 0 or absent means no time limit.
    #[serde(default)]
    pub expire_after: i64,
}

/// Accepts `CreateRequest` as JSON or as an urlencoded form.
pub struct CreateBody(pub CreateRequest);

impl<S> FromRequest<S> for CreateBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        let parsed = if is_form {
            Form::<CreateRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Json::<CreateRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        };

        parsed.map(Self).map_err(|reason| {
            debug!(%reason, "rejected create body");
            invalid_input()
        })
    }
}

pub async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    CreateBody(body): CreateBody,
) -> Response {
    if body.secret.len() > state.max_secret_bytes {
        debug!(len = body.secret.len(), "secret exceeds size limit");
        return invalid_input();
    }
    let (Ok(view_budget), Ok(ttl_minutes)) = (
        u32::try_from(body.expire_after_views),
        u32::try_from(body.expire_after),
    ) else {
        return invalid_input();
    };

    match state.store.create(&body.secret, view_budget, ttl_minutes) {
        Ok(secret) => {
            info!(view_budget, ttl_minutes, "secret.create");
            render::secret(&headers, &secret)
        }
        Err(e) => store_error(e),
    }
}

// ── Get ───────────────────────────────────────────────────────────────────────

pub async fn get_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(hash): Path<String>,
) -> Response {
    match state.store.consume_one(&hash) {
        Ok(secret) => {
            info!(remaining_views = secret.remaining_views, "secret.read");
            render::secret(&headers, &secret)
        }
        Err(e) => store_error(e),
    }
}

// ── API docs ──────────────────────────────────────────────────────────────────

pub async fn openapi() -> impl IntoResponse {
    let secret_schema = json!({
        "type": "object",
        "properties": {
            "hash": {"type": "string"},
            "secretText": {"type": "string"},
            "createdAt": {"type": "string", "format": "date-time"},
            "expiresAt": {"type": "string", "format": "date-time", "nullable": true},
            "remainingViews": {"type": "integer"}
        }
    });
    let secret_content = json!({
        "application/json": {"schema": {"$ref": "#/components/schemas/Secret"}},
        "application/xml": {"schema": {"$ref": "#/components/schemas/Secret"}}
    });
    let create_schema = json!({
        "type": "object",
        "required": ["secret", "expireAfterViews"],
        "properties": {
            "secret": {"type": "string", "description": "Text to store"},
            "expireAfterViews": {"type": "integer", "minimum": 1, "description": "Number of views allowed"},
            "expireAfter": {"type": "integer", "minimum": 0, "description": "Minutes until expiry; 0 means never"}
        }
    });

    Json(json!({
        "openapi": "3.0.0",
        "info": {
            "title": "vanish",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Store secrets that disappear after a number of views or minutes."
        },
        "paths": {
            "/v1/secret": {
                "post": {
                    "summary": "Add a new secret",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {"schema": create_schema},
                            "application/x-www-form-urlencoded": {"schema": create_schema}
                        }
                    },
                    "responses": {
                        "200": {"description": "Secret stored", "content": secret_content},
                        "405": {"description": "Invalid input"}
                    }
                }
            },
            "/v1/secret/{hash}": {
                "get": {
                    "summary": "Read a secret by hash, spending one view",
                    "parameters": [{
                        "name": "hash",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    }],
                    "responses": {
                        "200": {"description": "Secret found", "content": secret_content},
                        "404": {"description": "Secret not found"}
                    }
                }
            }
        },
        "components": {"schemas": {"Secret": secret_schema}}
    }))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn invalid_input() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"message": "Invalid input"})),
    )
        .into_response()
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::InvalidArgument(reason) => {
            debug!(reason, "rejected secret");
            invalid_input()
        }
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Secret not found"})),
        )
            .into_response(),
        StoreError::Storage(_) => {
            tracing::error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "internal server error"})),
            )
                .into_response()
        }
    }
}
