use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::config::ReleaseSpec;
use crate::error::AcquireError;

/// `{base}/{version}/{filename}`
pub fn release_url(release: &ReleaseSpec) -> Result<Url, AcquireError> {
    let mut url = release.base_url.clone();
    url.path_segments_mut()
        .map_err(|_| AcquireError::InvalidUrl(release.base_url.to_string()))?
        .pop_if_empty()
        .push(&release.version)
        .push(&release.filename());
    Ok(url)
}

/// Fetch a release image into `dest_dir`, or reuse a file of the same name
/// that is already there.
///
/// The body is streamed into a temporary file next to the destination and
/// renamed into place once complete, so an interrupted download is never
/// mistaken for a finished one.
pub fn download_iso(release: &ReleaseSpec, dest_dir: &Path) -> Result<PathBuf, AcquireError> {
    let iso_path = dest_dir.join(release.filename());
    if iso_path.exists() {
        info!("Using existing ISO file: {}", iso_path.display());
        return Ok(iso_path);
    }

    let url = release_url(release)?;
    info!("Downloading from: {}", url);

    let io_error = |source: io::Error| AcquireError::Io {
        path: iso_path.clone(),
        source,
    };

    let response = ureq::get(url.as_str())
        .call()
        .map_err(|e| AcquireError::Request {
            url: url.to_string(),
            source: Box::new(e),
        })?;
    let mut body = response.into_body();
    let length = body.content_length();
    debug!("Content length: {:?}", length);

    let progress = match length {
        Some(len) => ProgressBar::new(len).with_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        ),
        None => ProgressBar::new_spinner(),
    };

    let mut partial = tempfile::Builder::new()
        .prefix(".autoiso-")
        .suffix(".part")
        .tempfile_in(dest_dir)
        .map_err(io_error)?;
    let mut reader = progress.wrap_read(body.as_reader());
    let copied = io::copy(&mut reader, partial.as_file_mut()).map_err(|e| {
        progress.abandon();
        AcquireError::Request {
            url: url.to_string(),
            source: Box::new(ureq::Error::Io(e)),
        }
    })?;
    progress.finish_and_clear();

    partial.as_file().sync_all().map_err(io_error)?;
    partial
        .persist(&iso_path)
        .map_err(|e| io_error(e.error))?;

    info!("Downloaded {} bytes to {}", copied, iso_path.display());
    Ok(iso_path)
}

/// Local source images must exist before anything else happens.
pub fn check_local_iso(path: &Path) -> Result<PathBuf, AcquireError> {
    if !fs::metadata(path).map(|m| m.is_file()).unwrap_or(false) {
        return Err(AcquireError::SourceMissing(path.to_path_buf()));
    }
    info!("Using source ISO file: '{}'", path.display());
    Ok(path.to_path_buf())
}
