//! Multipart upload handling for photos and icons.
//!
//! Files land under `<upload_dir>/<kind>/<uuid>.<ext>` and are referenced
//! from entities by their `/uploads/<kind>/<file>` path. Serving the files
//! is left to whatever sits in front of the API.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::Multipart;
use uuid::Uuid;

use crate::error::ApiError;

/// Text fields and stored file paths collected from one multipart body.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<String>,
}

/// Drain a multipart body: text parts become fields, file parts are written
/// to disk under `kind` and recorded as `/uploads/<kind>/...` paths.
pub async fn collect(
    multipart: &mut Multipart,
    upload_dir: &Path,
    kind: &str,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Upload inválido: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let extension = Path::new(&file_name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin")
                .to_lowercase();
            let stored_name = format!("{}.{}", Uuid::new_v4(), extension);

            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Upload inválido: {e}")))?;

            let dir = upload_dir.join(kind);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            tokio::fs::write(dir.join(&stored_name), &bytes)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;

            form.files.push(format!("/uploads/{kind}/{stored_name}"));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("Upload inválido: {e}")))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Remove a stored upload by its `/uploads/...` path. Missing files are
/// ignored: cleanup must never fail a request.
pub async fn delete_upload(upload_dir: &Path, stored_path: &str) {
    if let Some(relative) = stored_path.strip_prefix("/uploads/") {
        let _ = tokio::fs::remove_file(upload_dir.join(relative)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_delete_upload_ignores_missing_and_foreign_paths() {
        let dir = std::env::temp_dir().join("guia_test_uploads");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("businesses")).expect("mkdir");

        let stored = dir.join("businesses/photo.jpg");
        fs::write(&stored, b"jpeg").expect("write");

        delete_upload(&dir, "/uploads/businesses/photo.jpg").await;
        assert!(!stored.exists());

        // Nonexistent file and a path outside /uploads are both no-ops
        delete_upload(&dir, "/uploads/businesses/missing.jpg").await;
        delete_upload(&dir, "/etc/passwd").await;

        let _ = fs::remove_dir_all(&dir);
    }
}
