use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::api_error::ApiError;
use crate::http::AppState;

const DEFAULT_READ_RANGE: &str = "A1:G10";

#[derive(Debug, Deserialize)]
pub struct WriteRowRequest {
    access_token: String,
    row: Vec<Value>,
}

/// Cells are written as text; nulls become empty cells.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Writes a caller-supplied row below the used range with the caller's own token.
pub async fn write_excel(
    State(state): State<AppState>,
    Json(request): Json<WriteRowRequest>,
) -> Result<Json<Value>, ApiError> {
    let row: Vec<String> = request.row.into_iter().map(cell_text).collect();

    let outcome = state
        .appender
        .append_values_with_token(&request.access_token, row.clone())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "row": row,
        "range": outcome.range,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReadRangeParams {
    access_token: Option<String>,
    address: Option<String>,
}

/// Returns a worksheet range as reported by the workbook API.
pub async fn excel_info(
    State(state): State<AppState>,
    Query(params): Query<ReadRangeParams>,
) -> Result<Json<Value>, ApiError> {
    let address = params.address.as_deref().unwrap_or(DEFAULT_READ_RANGE);
    let value = state
        .appender
        .read_range(params.access_token.as_deref(), address)
        .await?;
    Ok(Json(value))
}
