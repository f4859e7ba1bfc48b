use axum::{extract::Multipart, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::CONFIG;
use crate::error::{ApiError, ApiResult};

/// Multipart field carrying the file
const FIELD_NAME: &str = "image";
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const ALLOWED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Public URL prefix the upload directory is served under
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// `<unix millis>_<16 hex chars>.<ext>`
fn generate_filename(ext: &str) -> String {
    format!(
        "{}_{:016x}.{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u64>(),
        ext
    )
}

/// Checks the declared type, the size and the file signature.
/// Returns the file extension to store under.
pub fn validate_image(declared_mime: Option<&str>, bytes: &[u8]) -> ApiResult<&'static str> {
    let declared = declared_mime
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| ALLOWED_MIME_TYPES.contains(&m.as_str()))
        .ok_or_else(|| {
            ApiError::bad_request("Unsupported file type. Allowed: PNG, JPEG, GIF, WebP.")
        })?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("Empty file"));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::bad_request("File too large. Maximum size is 5MB."));
    }

    match detect_image_mime(bytes) {
        Some(actual) if actual == declared => Ok(extension_for(actual)),
        _ => Err(ApiError::bad_request(
            "File content does not match its declared image type.",
        )),
    }
}

/// Writes an already validated image into `dir` and returns its public URL.
pub async fn store_image(dir: &Path, ext: &str, bytes: &[u8]) -> ApiResult<String> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        ApiError::Internal(format!("failed to create upload directory: {}", e))
    })?;

    let filename = generate_filename(ext);
    tokio::fs::write(dir.join(&filename), bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to write upload: {}", e)))?;

    tracing::info!("Image uploaded: {} ({} bytes)", filename, bytes.len());
    Ok(format!("{}/{}", PUBLIC_PREFIX, filename))
}

/// POST /api/uploads - multipart field `image`
pub async fn upload_image(mut multipart: Multipart) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Multipart error: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }

        let declared = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read upload bytes: {}", e);
            ApiError::bad_request("Failed to read file data")
        })?;

        let ext = validate_image(declared.as_deref(), &bytes)?;
        let url = store_image(&PathBuf::from(&CONFIG.upload_dir), ext, &bytes).await?;

        return Ok((StatusCode::CREATED, Json(UploadResponse { url })));
    }

    Err(ApiError::bad_request("No file provided"))
}
