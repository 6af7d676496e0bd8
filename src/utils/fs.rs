use std::fs::Metadata;
use std::io;
use std::path::Path;
use tracing::debug;

/// Permission bits recorded for a file added to the image.
#[cfg(unix)]
pub fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Without POSIX permissions, files become 0644, or 0444 when read-only.
#[cfg(not(unix))]
pub fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o100444
    } else {
        0o100644
    }
}

/// Create the parent directory of `path` if it doesn't exist
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!("Creating directory: {}", parent.display());
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
