use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::mapper::{IsoPath, MappedNames};
use crate::config::absolute;
use crate::error::{Error, ImageError, Result};
use crate::iso::{ImageAuthor, ImageGuard};
use crate::utils::fs::file_mode;

/// ISO9660 path of the GRUB menu in Ubuntu installer images.
pub const BOOT_CONFIG_ISO9660: &str = "/BOOT/GRUB/GRUB.CFG;1";
pub const BOOT_CONFIG_JOLIET: &str = "/boot/grub/grub.cfg";
pub const BOOT_CONFIG_ROCK_RIDGE: &str = "grub.cfg";

pub fn boot_config_names() -> MappedNames {
    MappedNames::new(BOOT_CONFIG_ISO9660, BOOT_CONFIG_JOLIET, BOOT_CONFIG_ROCK_RIDGE)
}

/// Counts of what a build put into the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
    pub boot_config_replaced: bool,
}

/// Materializes an import directory and a bootloader config into an open
/// image, then writes it out.
pub struct ImageBuilder {
    output_path: PathBuf,
    import_dir: Option<PathBuf>,
    boot_config: Option<PathBuf>,
}

impl ImageBuilder {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            import_dir: None,
            boot_config: None,
        }
    }

    pub fn set_import_dir(&mut self, dir: impl Into<PathBuf>) {
        self.import_dir = Some(dir.into());
    }

    pub fn set_boot_config(&mut self, file: impl Into<PathBuf>) {
        self.boot_config = Some(file.into());
    }

    /// Apply every change to `image`, write it to the output path and close
    /// it. The image is closed on failure too.
    pub fn build<I: ImageAuthor>(&self, image: I) -> Result<BuildSummary> {
        let mut image = ImageGuard::new(image);
        let mut summary = BuildSummary::default();

        if let Some(dir) = &self.import_dir {
            import_tree(&mut *image, dir, &mut summary).map_err(Error::ImageMutation)?;
        }

        if let Some(file) = &self.boot_config {
            replace_boot_config(&mut *image, file).map_err(Error::ImageMutation)?;
            summary.boot_config_replaced = true;
        }

        image
            .write(&self.output_path)
            .map_err(Error::Serialization)?;
        image.close().map_err(Error::Serialization)?;

        debug!("Build summary: {:?}", summary);
        Ok(summary)
    }
}

/// Adds `import_dir` and everything below it, parents before children.
///
/// The directory's own name becomes the top-level directory in the image.
pub fn import_tree<I: ImageAuthor + ?Sized>(
    image: &mut I,
    import_dir: &Path,
    summary: &mut BuildSummary,
) -> std::result::Result<(), ImageError> {
    let root = absolute(import_dir);
    let root_path = root
        .file_name()
        .and_then(|name| name.to_str())
        .map(IsoPath::new)
        .ok_or_else(|| {
            ImageError::invalid_name(
                &root.to_string_lossy(),
                "the import directory needs a UTF-8 name",
            )
        })?;
    info!("Importing {} as /{}", root.display(), root_path);

    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            ImageError::SourceRead {
                path,
                source: e.into(),
            }
        })?;
        let path = logical_path(&root_path, &root, entry.path())?;

        if entry.file_type().is_dir() {
            image.add_directory(&path.names())?;
            summary.directories += 1;
            continue;
        }

        let metadata = fs::metadata(entry.path()).map_err(|e| ImageError::SourceRead {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
        if !metadata.is_file() {
            warn!("Skipping {}: not a regular file", entry.path().display());
            summary.skipped += 1;
            continue;
        }

        image.add_file(entry.path(), &path.names().versioned(), file_mode(&metadata))?;
        summary.files += 1;
    }
    Ok(())
}

/// Swaps the image's GRUB menu for `boot_config`. The image must already
/// have one.
pub fn replace_boot_config<I: ImageAuthor + ?Sized>(
    image: &mut I,
    boot_config: &Path,
) -> std::result::Result<(), ImageError> {
    info!("Replacing {} with {}", BOOT_CONFIG_JOLIET, boot_config.display());
    image.remove_file(BOOT_CONFIG_ISO9660)?;

    let metadata = fs::metadata(boot_config).map_err(|e| ImageError::SourceRead {
        path: boot_config.to_path_buf(),
        source: e,
    })?;
    image.add_file(boot_config, &boot_config_names(), file_mode(&metadata))
}

fn logical_path(
    root_path: &IsoPath,
    root: &Path,
    path: &Path,
) -> std::result::Result<IsoPath, ImageError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ImageError::invalid_name(&path.to_string_lossy(), "outside the import directory"))?;

    let mut logical = root_path.clone();
    for component in relative.components() {
        let name = component.as_os_str().to_str().ok_or_else(|| {
            ImageError::invalid_name(&path.to_string_lossy(), "file names must be valid UTF-8")
        })?;
        logical = logical.join(name);
    }
    Ok(logical)
}
