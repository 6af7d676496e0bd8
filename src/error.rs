use std::path::PathBuf;
use thiserror::Error;

/// Invalid command line input, detected before any image is touched.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Either a source ISO or a release version must be provided")]
    NoSource,

    #[error("The provided import directory, '{0}', does not exist.")]
    ImportDirMissing(PathBuf),

    #[error("The provided grub file, '{0}', does not exist.")]
    BootConfigMissing(PathBuf),

    #[error("Invalid ISO base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Failure to obtain the source image, locally or over the network.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("The provided ISO file, '{0}', does not exist.")]
    SourceMissing(PathBuf),

    #[error("Cannot build a download URL from '{0}'")]
    InvalidUrl(String),

    #[error("Download of {url} failed")]
    Request {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Failed to store download at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by an image authoring backend.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to open image {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed image: {0}")]
    Malformed(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Parent directory of '{0}' is not present in the image")]
    MissingParent(String),

    #[error("'{0}' is already present in the image")]
    Collision(String),

    #[error("'{0}' was not found in the image")]
    NotFound(String),

    #[error("Failed to read source file {path}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write image to {path}: {reason}")]
    Serialize { path: PathBuf, reason: String },

    #[error("Image handle is already closed")]
    Closed,
}

impl ImageError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        ImageError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top level error of a customization run. Every variant is terminal.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error("Unable to acquire the source ISO")]
    SourceAcquisition(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Image modification failed")]
    ImageMutation(#[source] ImageError),

    #[error("Writing the output image failed")]
    Serialization(#[source] ImageError),
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        Error::SourceAcquisition(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
