//! Image authoring.
//!
//! The builder talks to images only through [`ImageBackend`] and
//! [`ImageAuthor`]. The crate ships one backend, [`xorriso::Xorriso`], which
//! keeps the image model in memory ([`tree::ImageTree`]) and hands the final
//! write to the `xorriso` program.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use tracing::warn;

pub mod catalog;
pub mod tree;
pub mod xorriso;

#[cfg(test)]
pub(crate) mod fixture;

pub use catalog::Catalog;
pub use tree::{ImageTree, Mutation};
pub use xorriso::{Xorriso, XorrisoImage};

use crate::core::mapper::MappedNames;
use crate::error::ImageError;

/// Opens source images for modification.
pub trait ImageBackend {
    type Image: ImageAuthor;

    fn open(&self, source: &Path) -> Result<Self::Image, ImageError>;
}

/// An open, mutable image.
#[cfg_attr(test, mockall::automock)]
pub trait ImageAuthor {
    /// Register a directory under all three names.
    fn add_directory(&mut self, names: &MappedNames) -> Result<(), ImageError>;

    /// Register a file read from `source` under all three names, with the
    /// given POSIX mode recorded in its Rock Ridge attributes.
    fn add_file(&mut self, source: &Path, names: &MappedNames, mode: u32) -> Result<(), ImageError>;

    /// Remove the file with the given ISO9660 path.
    fn remove_file(&mut self, iso_path: &str) -> Result<(), ImageError>;

    /// Serialize the complete image to `output`.
    fn write(&mut self, output: &Path) -> Result<(), ImageError>;

    /// Release the image. Every later call fails.
    fn close(&mut self) -> Result<(), ImageError>;
}

/// Closes the wrapped image when dropped, unless [`ImageGuard::close`] already
/// did.
pub struct ImageGuard<I: ImageAuthor> {
    image: I,
    closed: bool,
}

impl<I: ImageAuthor> ImageGuard<I> {
    pub fn new(image: I) -> Self {
        Self {
            image,
            closed: false,
        }
    }

    pub fn close(mut self) -> Result<(), ImageError> {
        self.closed = true;
        self.image.close()
    }
}

impl<I: ImageAuthor> Deref for ImageGuard<I> {
    type Target = I;

    fn deref(&self) -> &I {
        &self.image
    }
}

impl<I: ImageAuthor> DerefMut for ImageGuard<I> {
    fn deref_mut(&mut self) -> &mut I {
        &mut self.image
    }
}

impl<I: ImageAuthor> Drop for ImageGuard<I> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.image.close() {
                warn!("Failed to close image: {}", e);
            }
        }
    }
}
