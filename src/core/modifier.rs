use std::path::PathBuf;
use tracing::info;

use super::builder::{BuildSummary, ImageBuilder};
use crate::config::{BuildConfig, SourceSelection};
use crate::error::{Error, ImageError, Result};
use crate::iso::{ImageBackend, Xorriso};
use crate::utils::{self, fs::ensure_parent_dir};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to customize; the source image was only acquired.
    Unchanged { source: PathBuf },
    /// A customized image was written (or planned, in a dry run).
    Written {
        source: PathBuf,
        output: PathBuf,
        summary: BuildSummary,
    },
}

/// Drives one customization run: acquire the source image, open it, apply
/// the import tree and bootloader config, write the result.
pub struct IsoModifier<B: ImageBackend> {
    backend: B,
}

impl IsoModifier<Xorriso> {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(Xorriso::new(&config.xorriso).dry_run(config.dry_run))
    }
}

impl<B: ImageBackend> IsoModifier<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn modify_iso(&self, config: &BuildConfig) -> Result<Outcome> {
        let source = acquire_source(config)?;

        if !config.has_customizations() {
            info!("No customizations provided. Exiting without making changes.");
            return Ok(Outcome::Unchanged { source });
        }

        info!("Generating custom ISO...");
        let image = self
            .backend
            .open(&source)
            .map_err(|e| Error::SourceAcquisition(Box::new(e)))?;

        let mut builder = ImageBuilder::new(&config.output);
        if let Some(dir) = &config.import_dir {
            builder.set_import_dir(dir);
        }
        if let Some(file) = &config.boot_config {
            builder.set_boot_config(file);
        }

        if !config.dry_run {
            ensure_parent_dir(&config.output).map_err(|e| {
                Error::Serialization(ImageError::Serialize {
                    path: config.output.clone(),
                    reason: e.to_string(),
                })
            })?;
        }

        let summary = builder.build(image)?;
        info!(
            "Done. Added {} directories and {} files{}",
            summary.directories,
            summary.files,
            if summary.boot_config_replaced {
                ", replaced the GRUB menu"
            } else {
                ""
            }
        );

        Ok(Outcome::Written {
            source,
            output: config.output.clone(),
            summary,
        })
    }
}

/// Local images must exist; release images are downloaded unless already
/// present in the download directory.
pub fn acquire_source(config: &BuildConfig) -> Result<PathBuf> {
    let path = match &config.source {
        SourceSelection::Local(path) => utils::check_local_iso(path)?,
        SourceSelection::Release(release) => utils::download_iso(release, &config.download_dir)?,
    };
    Ok(path)
}
