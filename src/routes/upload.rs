//! Image upload endpoint.

use crate::auth::middleware::{AppState, SessionAddress};
use crate::error::AppError;
use crate::models::UploadResponse;
use crate::storage::blob::{self, ImageType};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;

const INVALID_TYPE: &str = "Invalid type (use jpeg, png, webp, gif)";

fn too_large(max_bytes: usize) -> AppError {
    AppError::BadRequest(format!(
        "File too large (max {}MB)",
        max_bytes / (1024 * 1024)
    ))
}

fn read_error(e: MultipartError, max_bytes: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        AppError::BadRequest(format!("Invalid multipart: {}", e))
    }
}

/// POST /api/upload — Store a question image
///
/// Accepts a multipart form with a "file" field holding a jpeg, png, webp or
/// gif image. Returns the public URL of the stored image.
pub async fn upload_image(
    State(state): State<AppState>,
    SessionAddress(uploader): SessionAddress,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_bytes = state.config.max_upload_bytes;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error(e, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| read_error(e, max_bytes))?;
        file = Some((content_type, data.to_vec()));
    }

    let (content_type, content) = match file {
        Some((content_type, content)) if !content.is_empty() => (content_type, content),
        _ => return Err(AppError::BadRequest("No file".to_string())),
    };

    if content.len() > max_bytes {
        return Err(too_large(max_bytes));
    }

    // The declared type must be allowed and agree with the bytes
    let image_type = content_type
        .as_deref()
        .and_then(ImageType::from_mime)
        .filter(|t| t.matches(&content))
        .ok_or_else(|| AppError::BadRequest(INVALID_TYPE.to_string()))?;

    let name = blob::object_name(&uploader.to_string(), image_type, Utc::now());
    blob::write_blob(&state.config.image_storage_path, &name, &content).await?;

    tracing::info!(action = "image_uploaded", uploader = %uploader, name = %name, size = content.len(), "Image stored");

    Ok(Json(UploadResponse {
        url: state.config.image_url(&name),
    }))
}
