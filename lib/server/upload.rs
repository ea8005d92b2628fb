//! Build-archive ingestion.
//!
//! Accepts a multipart upload carrying the server build as a zip archive,
//! plus optional recipe configuration. The archive is buffered to a temporary
//! file, pre-scanned against decompression-bomb bounds without touching the
//! staging directory, and only then extracted. Every outcome lands in the
//! event log.

use std::{
    fs::File,
    io,
    path::{Component, Path, PathBuf},
};

use axum::{
    extract::{Multipart, State},
    Json,
};
use tokio::io::AsyncWriteExt;

use crate::{
    server::{
        state::{ApiError, ApiState},
        types::UploadResponse,
    },
    utils,
    validate::{self, ArchiveGauge, MAX_UPLOAD_SIZE},
    LudocoreError, LudocoreResult,
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// The parts carried by one upload form.
#[derive(Debug, Default)]
struct UploadForm {
    archive: Option<(String, tempfile::NamedTempFile, u64)>,
    preset: Option<String>,
    recipe_text: Option<String>,
    default_port: Option<String>,
}

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `POST /api/v1/upload`.
pub async fn upload_handler(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            record_upload(&state, "", 0, false, &e.to_string()).await;
            return Err(e.into());
        }
    };

    let Some((filename, archive, size)) = form.archive else {
        let message = "no file uploaded: missing server_build field".to_string();
        record_upload(&state, "", 0, false, &message).await;
        return Err(LudocoreError::Validation(message).into());
    };

    tracing::info!("received build archive {} ({} bytes)", filename, size);

    if !filename.to_lowercase().ends_with(".zip") {
        let message = "file must be a ZIP archive".to_string();
        record_upload(&state, &filename, size, false, &message).await;
        return Err(LudocoreError::Validation(message).into());
    }

    if let Some(port_str) = &form.default_port {
        if let Ok(Some(port)) = validate::validate_port(port_str) {
            state.set_game_base_port(port);
        }
    }

    // Recipe changes ride along with the upload and are applied before
    // extraction, each invalidating the cached image.
    if let Some(recipe_text) = &form.recipe_text {
        state.recipes.set_active_text(recipe_text).await?;
        if let Some(events) = &state.events {
            ApiState::log_event_result(
                "recipe change",
                events
                    .record_recipe_change(&filename, "custom", "uploaded with server build")
                    .await,
            );
        }
        state.docker.remove_image(&state.image_tag).await?;
    } else if let Some(preset) = &form.preset {
        validate::validate_preset_name(preset)?;
        state.recipes.set_active_from_preset(preset).await?;
        if let Some(events) = &state.events {
            ApiState::log_event_result(
                "recipe change",
                events
                    .record_recipe_change(
                        preset,
                        &format!("preset:{}", preset),
                        "set with server build upload",
                    )
                    .await,
            );
        }
        state.docker.remove_image(&state.image_tag).await?;
    }

    // Pre-scan and extraction are blocking zip work.
    let staging = utils::staging_dir_path();
    let archive_path = archive.path().to_path_buf();
    let extraction = tokio::task::spawn_blocking(move || {
        extract_archive_to_staging(&archive_path, &staging)
    })
    .await
    .map_err(LudocoreError::custom)?;

    if let Err(e) = extraction {
        record_upload(&state, &filename, size, false, &e.to_string()).await;
        return Err(e.into());
    }

    let recipe = state.recipes.get_active().await?;
    if let Err(e) = state.docker.build_image(&state.image_tag, &recipe).await {
        let message = format!("failed to rebuild image: {}", e);
        record_upload(&state, &filename, size, false, &message).await;
        return Err(e.into());
    }

    record_upload(
        &state,
        &filename,
        size,
        true,
        "upload and image rebuild successful",
    )
    .await;

    Ok(Json(UploadResponse {
        message: "release uploaded successfully".to_string(),
        file: filename,
        size,
    }))
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Drains the multipart form, buffering the archive to a temporary file and
/// enforcing the size bound as bytes arrive.
async fn read_form(mut multipart: Multipart) -> LudocoreResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| LudocoreError::Validation(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "server_build" => {
                let filename = field.file_name().unwrap_or("upload.zip").to_string();
                let temp = tempfile::NamedTempFile::new()?;
                let mut writer = tokio::fs::File::create(temp.path()).await?;
                let mut size: u64 = 0;

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| LudocoreError::Validation(format!("upload aborted: {}", e)))?
                {
                    size += chunk.len() as u64;
                    if size > MAX_UPLOAD_SIZE {
                        return Err(LudocoreError::Validation(format!(
                            "file size exceeds maximum {} bytes",
                            MAX_UPLOAD_SIZE
                        )));
                    }
                    writer.write_all(&chunk).await?;
                }
                writer.flush().await?;

                form.archive = Some((filename, temp, size));
            }
            "preset" => {
                form.preset = Some(read_text_field(field).await?).filter(|s| !s.is_empty());
            }
            "dockerfile" => {
                let content = read_text_field(field).await?;
                validate::validate_recipe(&content)?;
                form.recipe_text = Some(content);
            }
            "default_port" => {
                form.default_port =
                    Some(read_text_field(field).await?).filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> LudocoreResult<String> {
    let bytes = field
        .bytes()
        .await
        .map_err(|e| LudocoreError::Validation(format!("invalid form field: {}", e)))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| LudocoreError::Validation("form field is not valid UTF-8".to_string()))
}

/// Pre-scans the archive against the compound bounds, then clears the staging
/// directory (preserving the marker file) and extracts. The pre-scan runs to
/// completion before anything is touched, so a rejected archive leaves the
/// staging directory unchanged.
fn extract_archive_to_staging(archive_path: &Path, staging: &Path) -> LudocoreResult<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| LudocoreError::Validation(format!("failed to open zip archive: {}", e)))?;

    let mut gauge = ArchiveGauge::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| LudocoreError::Validation(format!("corrupt zip entry: {}", e)))?;

        gauge.check_entry(entry.size(), entry.compressed_size())?;
        safe_entry_path(&entry, staging)?;
    }

    clear_staging(staging)?;

    if let Err(e) = extract_entries(&mut archive, staging) {
        // A half-written build must not become the next image's contents.
        let _ = clear_staging(staging);
        return Err(e);
    }

    Ok(())
}

fn extract_entries(archive: &mut zip::ZipArchive<File>, staging: &Path) -> LudocoreResult<()> {
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| LudocoreError::Validation(format!("corrupt zip entry: {}", e)))?;
        let dest = safe_entry_path(&entry, staging)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Resolves an entry's destination under the staging directory, refusing
/// absolute paths and anything whose cleaned path escapes it, and sanitizing
/// the leaf filename.
fn safe_entry_path(entry: &zip::read::ZipFile<'_>, staging: &Path) -> LudocoreResult<PathBuf> {
    let enclosed = entry.enclosed_name().ok_or_else(|| {
        LudocoreError::Validation(format!("invalid file path in archive: {}", entry.name()))
    })?;

    if enclosed
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir))
    {
        return Err(LudocoreError::Validation(format!(
            "invalid file path in archive: {}",
            entry.name()
        )));
    }

    let mut dest = staging.to_path_buf();
    if let Some(parent) = enclosed.parent() {
        dest.push(parent);
    }
    if let Some(leaf) = enclosed.file_name().and_then(|n| n.to_str()) {
        let sanitized = validate::sanitize_filename(leaf);
        if sanitized.is_empty() {
            return Err(LudocoreError::Validation(format!(
                "invalid file name in archive: {}",
                entry.name()
            )));
        }
        dest.push(sanitized);
    }

    Ok(dest)
}

/// Empties the staging directory while keeping it (and its marker file)
/// present.
fn clear_staging(staging: &Path) -> LudocoreResult<()> {
    std::fs::create_dir_all(staging)?;

    for dir_entry in std::fs::read_dir(staging)? {
        let dir_entry = dir_entry?;
        if dir_entry.file_name() == utils::STAGING_MARKER_FILENAME {
            continue;
        }
        let path = dir_entry.path();
        if dir_entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }

    let marker = staging.join(utils::STAGING_MARKER_FILENAME);
    if !marker.exists() {
        std::fs::write(&marker, b"")?;
    }
    Ok(())
}

async fn record_upload(state: &ApiState, filename: &str, size: u64, success: bool, notes: &str) {
    if let Some(events) = &state.events {
        ApiState::log_event_result(
            "upload",
            events
                .record_upload(filename, size as i64, success, notes)
                .await,
        );
    }
}

/// Ensures the staging directory and its marker file exist. Called at daemon
/// startup so the build context is always present.
pub async fn ensure_staging_dir() -> LudocoreResult<()> {
    let staging = utils::staging_dir_path();
    tokio::fs::create_dir_all(&staging).await?;

    let marker = staging.join(utils::STAGING_MARKER_FILENAME);
    if !tokio::fs::try_exists(&marker).await? {
        tokio::fs::write(&marker, b"").await?;
    }
    Ok(())
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(File::create(temp.path()).unwrap());
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        temp
    }

    #[test]
    fn test_extract_simple_archive() {
        let staging = tempdir().unwrap();
        std::fs::write(staging.path().join(utils::STAGING_MARKER_FILENAME), b"").unwrap();

        let archive = write_zip(&[
            ("server.x86_64", b"binary bits"),
            ("data/config.json", b"{}"),
        ]);
        extract_archive_to_staging(archive.path(), staging.path()).unwrap();

        assert_eq!(
            std::fs::read(staging.path().join("server.x86_64")).unwrap(),
            b"binary bits"
        );
        assert!(staging.path().join("data/config.json").exists());
        assert!(staging.path().join(utils::STAGING_MARKER_FILENAME).exists());
    }

    #[test]
    fn test_extract_clears_previous_build() {
        let staging = tempdir().unwrap();
        std::fs::write(staging.path().join("stale.bin"), b"old").unwrap();
        std::fs::write(staging.path().join(utils::STAGING_MARKER_FILENAME), b"").unwrap();

        let archive = write_zip(&[("fresh.bin", b"new")]);
        extract_archive_to_staging(archive.path(), staging.path()).unwrap();

        assert!(!staging.path().join("stale.bin").exists());
        assert!(staging.path().join("fresh.bin").exists());
        assert!(staging.path().join(utils::STAGING_MARKER_FILENAME).exists());
    }

    #[test]
    fn test_extract_rejects_path_traversal_without_touching_staging() {
        let staging = tempdir().unwrap();
        std::fs::write(staging.path().join("current.bin"), b"live").unwrap();

        let archive = write_zip(&[("../escape.bin", b"nope")]);
        let err = extract_archive_to_staging(archive.path(), staging.path()).unwrap_err();
        assert!(matches!(err, LudocoreError::Validation(_)));

        // The rejection happened during pre-scan: staging is untouched.
        assert!(staging.path().join("current.bin").exists());
        assert!(!staging.path().join("escape.bin").exists());
    }

    #[test]
    fn test_extract_rejects_too_many_entries() {
        let staging = tempdir().unwrap();
        let temp = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(File::create(temp.path()).unwrap());
        for i in 0..=validate::MAX_ARCHIVE_ENTRIES {
            writer
                .start_file(format!("f{}", i), SimpleFileOptions::default())
                .unwrap();
        }
        writer.finish().unwrap();

        let err = extract_archive_to_staging(temp.path(), staging.path()).unwrap_err();
        assert!(matches!(err, LudocoreError::Validation(_)));
    }

    #[test]
    fn test_clear_staging_preserves_marker() {
        let staging = tempdir().unwrap();
        std::fs::write(staging.path().join(utils::STAGING_MARKER_FILENAME), b"").unwrap();
        std::fs::write(staging.path().join("junk.txt"), b"x").unwrap();
        std::fs::create_dir(staging.path().join("junkdir")).unwrap();

        clear_staging(staging.path()).unwrap();

        assert!(staging.path().join(utils::STAGING_MARKER_FILENAME).exists());
        assert!(!staging.path().join("junk.txt").exists());
        assert!(!staging.path().join("junkdir").exists());
    }
}
