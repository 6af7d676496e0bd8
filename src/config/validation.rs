use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use super::absolute;
use crate::error::PreflightError;

/// The import directory must exist and be a directory.
pub fn check_import_dir(dir: &Path) -> Result<PathBuf, PreflightError> {
    debug!("Checking import directory {}", dir.display());
    if !dir.is_dir() {
        return Err(PreflightError::ImportDirMissing(dir.to_path_buf()));
    }
    Ok(absolute(dir))
}

/// The replacement bootloader config must be a regular file.
pub fn check_boot_config(file: &Path) -> Result<PathBuf, PreflightError> {
    debug!("Checking bootloader config {}", file.display());
    if !file.is_file() {
        return Err(PreflightError::BootConfigMissing(file.to_path_buf()));
    }
    Ok(absolute(file))
}

/// The download base must be an http(s) URL that can carry path segments.
pub fn check_base_url(raw: &str) -> Result<Url, PreflightError> {
    let invalid = |reason: String| PreflightError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base".to_string()));
    }
    Ok(url)
}
