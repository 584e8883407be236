use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::api_error::ApiError;
use crate::http::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "rent-label-api is running" }))
}

/// Sends the browser to the identity provider's consent page.
pub async fn login(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&state.auth.authorize_url())
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Redirect target after login: trades the code for tokens and stores them.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(error) = &params.error {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "Identity provider returned an error to the callback"
        );
    }

    let token = state.auth.complete_login(params.code.as_deref()).await?;

    Ok(Json(json!({
        "access_token": token.access_token,
        "expires_in": token.expires_in,
    })))
}
