use path_clean::PathClean;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

pub mod validation;

use crate::cli::Cli;
use crate::error::PreflightError;

/// Where the source image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    /// An ISO file already on disk.
    Local(PathBuf),
    /// An Ubuntu release to download.
    Release(ReleaseSpec),
}

/// Identifies one published Ubuntu installer image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    pub base_url: Url,
    pub version: String,
    pub installer_type: String,
    pub arch: String,
}

impl ReleaseSpec {
    /// `ubuntu-{version}-{type}-{arch}.iso`
    pub fn filename(&self) -> String {
        format!(
            "ubuntu-{}-{}-{}.iso",
            self.version, self.installer_type, self.arch
        )
    }
}

/// Validated settings for one customization run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub source: SourceSelection,
    pub import_dir: Option<PathBuf>,
    pub boot_config: Option<PathBuf>,
    pub output: PathBuf,
    pub download_dir: PathBuf,
    pub xorriso: PathBuf,
    pub dry_run: bool,
}

impl BuildConfig {
    /// Resolve command line arguments, running every preflight check.
    ///
    /// Nothing is downloaded or opened here; a failure means the run must stop
    /// before touching any image.
    pub fn from_cli(cli: &Cli) -> Result<Self, PreflightError> {
        let import_dir = match &cli.import_dir {
            Some(dir) => Some(validation::check_import_dir(dir)?),
            None => None,
        };
        let boot_config = match &cli.grub_file {
            Some(file) => Some(validation::check_boot_config(file)?),
            None => None,
        };

        let source = match (&cli.source_iso, &cli.version) {
            (Some(path), _) => SourceSelection::Local(absolute(path)),
            (None, Some(version)) => SourceSelection::Release(ReleaseSpec {
                base_url: validation::check_base_url(&cli.iso_url)?,
                version: version.clone(),
                installer_type: cli.installer_type.clone(),
                arch: cli.installer_arch.clone(),
            }),
            (None, None) => return Err(PreflightError::NoSource),
        };

        let config = Self {
            source,
            import_dir,
            boot_config,
            output: cli.out_file.clone(),
            download_dir: PathBuf::from("."),
            xorriso: cli.xorriso.clone(),
            dry_run: cli.dry_run,
        };
        debug!("Resolved build configuration: {:?}", config);
        Ok(config)
    }

    /// True when the run would change anything in the image.
    pub fn has_customizations(&self) -> bool {
        self.import_dir.is_some() || self.boot_config.is_some()
    }
}

/// Absolute, lexically cleaned form of `path`.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.clean();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path).clean(),
        Err(_) => path.clean(),
    }
}
