//! Attachment storage on local disk.
//!
//! Uploads land in the configured directory under a random uuid name; the
//! returned filename is what clients put into `archivo_nombre` fields.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::core::shared::error::{CoreError, CoreResult};
use crate::core::shared::state::AppState;

/// Stored name: random uuid plus the original extension, if any.
fn storage_name(original: &str) -> String {
    match original.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 16 => {
            format!("{}.{}", Uuid::new_v4(), ext.to_lowercase())
        }
        _ => Uuid::new_v4().to_string(),
    }
}

/// Client-supplied names must be plain filenames, never paths.
fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(CoreError::validation("invalid file name"));
    }
    Ok(())
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    _actor: AuthUser,
    mut multipart: Multipart,
) -> CoreResult<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or("adjunto").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| CoreError::validation(format!("could not read upload: {e}")))?;
        if data.is_empty() {
            return Err(CoreError::validation("empty file"));
        }

        let filename = storage_name(&original);
        let dir = PathBuf::from(&state.config.uploads_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Internal(format!("could not create uploads dir: {e}")))?;
        tokio::fs::write(dir.join(&filename), &data)
            .await
            .map_err(|e| CoreError::Internal(format!("could not store upload: {e}")))?;

        info!("stored upload {original} as {filename} ({} bytes)", data.len());
        return Ok(Json(json!({ "filename": filename })));
    }
    Err(CoreError::validation("multipart field 'file' is required"))
}

async fn download_file(
    State(state): State<Arc<AppState>>,
    _actor: AuthUser,
    Path(name): Path<String>,
) -> CoreResult<(StatusCode, HeaderMap, Vec<u8>)> {
    validate_name(&name)?;
    let path = PathBuf::from(&state.config.uploads_dir).join(&name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::not_found("file not found"))
        }
        Err(e) => return Err(CoreError::Internal(format!("could not read file: {e}"))),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, headers, bytes))
}

pub fn configure_files_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/files", post(upload_file))
        .route("/api/files/:name", get(download_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_name_keeps_the_extension() {
        let name = storage_name("report.PDF");
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.len(), 36 + 4);
    }

    #[test]
    fn storage_name_without_extension_is_a_bare_uuid() {
        let name = storage_name("README");
        assert_eq!(name.len(), 36);
        assert!(!name.contains('.'));
    }

    #[test]
    fn path_traversal_names_are_rejected() {
        for bad in ["../etc/passwd", "a/b.txt", "a\\b.txt", "..", ""] {
            assert!(validate_name(bad).is_err(), "{bad}");
        }
        assert!(validate_name("5f7d.pdf").is_ok());
    }
}
