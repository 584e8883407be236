use std::io::Write;
use std::path::Path;

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use crate::http::api_error::ApiError;
use crate::http::AppState;

/// QR payload used by the label test upload, which has no device sticker.
const TEST_QR: &str = "TEST_QR";

/// Multipart fields of a label upload. The image is staged in a temp file
/// that is deleted when this value is dropped.
#[derive(Default)]
struct LabelUpload {
    qr_text: Option<String>,
    image: Option<NamedTempFile>,
}

fn bad_multipart(e: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart payload: {e}"))
}

fn stage_image(
    upload_dir: &Path,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<NamedTempFile, ApiError> {
    let suffix = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix("label_")
        .suffix(&suffix)
        .tempfile_in(upload_dir)
        .map_err(|e| ApiError::Internal(format!("Failed to stage upload: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ApiError::Internal(format!("Failed to stage upload: {e}")))?;

    Ok(file)
}

async fn read_upload(upload_dir: &Path, mut multipart: Multipart) -> Result<LabelUpload, ApiError> {
    let mut upload = LabelUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("qr_text") => {
                upload.qr_text = Some(field.text().await.map_err(bad_multipart)?);
            }
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest("Uploaded image is empty".to_string()));
                }
                upload.image = Some(stage_image(upload_dir, file_name.as_deref(), &bytes)?);
            }
            other => tracing::debug!(field = ?other, "Ignoring unexpected multipart field"),
        }
    }

    Ok(upload)
}

/// Extracts a shipment from the QR text and label photo, then appends it to the workbook.
pub async fn process_ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let upload = read_upload(&state.upload_dir, multipart).await?;
    let qr_text = upload
        .qr_text
        .ok_or_else(|| ApiError::BadRequest("qr_text field is required".to_string()))?;
    let image = upload
        .image
        .ok_or_else(|| ApiError::BadRequest("image file is required".to_string()))?;

    let record = state.extractor.extract(&qr_text, image.path()).await;
    drop(image);

    let outcome = state.appender.append_or_fail(&record).await?;

    Ok(Json(json!({
        "status": "success",
        "data": record,
        "range": outcome.range,
    })))
}

/// Runs OCR on a label photo alone; the workbook upload is best-effort.
pub async fn upload_test_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let upload = read_upload(&state.upload_dir, multipart).await?;
    let image = upload
        .image
        .ok_or_else(|| ApiError::BadRequest("image file is required".to_string()))?;

    let record = state.extractor.extract(TEST_QR, image.path()).await;
    drop(image);

    let outcome = state.appender.append_or_log(&record).await;

    Ok(Json(json!({
        "status": "success",
        "data": record,
        "range": outcome.map(|o| o.range),
    })))
}
