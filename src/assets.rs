//! Getting images into the pipeline: files on disk, folders, and uploads.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::{
    errors::{Result, StoryError},
    models::ImageAsset,
};

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "avif"];
pub const SUPPORTED_MIME_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/avif"];

/// MIME type implied by a file name: png, webp and avif are recognised,
/// everything else is treated as JPEG.
pub fn mime_from_extension(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        _ => "image/jpeg",
    }
}

pub fn is_supported_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn normalize_mime(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => essence,
    }
}

/// MIME type of an uploaded file. A declared type wins; without one the
/// bytes are sniffed, then the file name is consulted, then JPEG is assumed.
pub fn resolve_upload_mime(declared: Option<&str>, file_name: Option<&str>, data: &[u8]) -> Result<String> {
    let declared = declared
        .map(normalize_mime)
        .filter(|mime| !mime.is_empty() && mime != "application/octet-stream");

    let mime = match declared {
        Some(mime) => mime,
        None => match infer::get(data) {
            Some(kind) => normalize_mime(kind.mime_type()),
            None => file_name
                .map(|name| mime_from_extension(Path::new(name)).to_string())
                .unwrap_or_else(|| "image/jpeg".to_string()),
        },
    };

    if SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
        Ok(mime)
    } else {
        Err(StoryError::validation(format!(
            "unsupported image type `{mime}` for {} (expected png, jpeg, webp or avif)",
            file_name.unwrap_or("upload")
        )))
    }
}

/// Read one image from disk, typing it by extension.
pub async fn read_image(path: &Path) -> Result<ImageAsset> {
    if !is_supported_extension(path) {
        return Err(StoryError::validation(format!(
            "unsupported image file {} (expected .png, .jpg, .jpeg, .webp or .avif)",
            path.display()
        )));
    }

    let data = fs::read(path).await?;
    debug!(target: "assets", path = %path.display(), bytes = data.len(), "image loaded");

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ImageAsset::new(name, data, mime_from_extension(path)))
}

/// Read images in the given order.
pub async fn read_images(paths: &[PathBuf]) -> Result<Vec<ImageAsset>> {
    let mut assets = Vec::with_capacity(paths.len());
    for path in paths {
        assets.push(read_image(path).await?);
    }
    Ok(assets)
}

/// Supported image files directly inside `dir`, sorted by file name.
pub async fn scan_folder(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_supported_extension(&path) {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Caller-side bound on how many images one run may take.
pub fn check_image_count(count: usize, min: usize, max: usize) -> Result<()> {
    if count < min {
        return Err(StoryError::validation(format!(
            "please provide at least {min} images (got {count})"
        )));
    }
    if count > max {
        return Err(StoryError::validation(format!(
            "at most {max} images are supported (got {count})"
        )));
    }
    Ok(())
}
