//! Name mapping for image entries.
//!
//! An ISO9660 image with Joliet and Rock Ridge extensions stores every entry
//! under three names: a restricted ISO9660 identifier, a long Joliet name and
//! the original POSIX name. [`IsoPath`] derives all three from one relative
//! path.

use std::fmt;

/// Version suffix carried by ISO9660 file identifiers.
pub const FILE_VERSION: &str = ";1";

/// A `/`-separated path relative to the image root, e.g. `custom/My-File.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsoPath {
    path: String,
}

impl IsoPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Child path `self/name`.
    pub fn join(&self, name: &str) -> Self {
        Self::new(format!("{}/{}", self.path, name))
    }

    /// Uppercased, `-` replaced by `_`, rooted at `/`.
    ///
    /// Length and character set are not checked here; the image model
    /// rejects identifiers that do not conform.
    pub fn iso9660_path(&self) -> String {
        format!("/{}", self.path.to_uppercase().replace('-', "_"))
    }

    /// Rooted at `/`, case preserved.
    pub fn joliet_path(&self) -> String {
        format!("/{}", self.path)
    }

    /// Last path segment, unmodified.
    pub fn rock_ridge_name(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.path,
        }
    }

    pub fn names(&self) -> MappedNames {
        MappedNames {
            iso9660: self.iso9660_path(),
            joliet: self.joliet_path(),
            rock_ridge: self.rock_ridge_name().to_string(),
        }
    }
}

impl fmt::Display for IsoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// The three spellings of one image entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedNames {
    pub iso9660: String,
    pub joliet: String,
    pub rock_ridge: String,
}

impl MappedNames {
    pub fn new(
        iso9660: impl Into<String>,
        joliet: impl Into<String>,
        rock_ridge: impl Into<String>,
    ) -> Self {
        Self {
            iso9660: iso9660.into(),
            joliet: joliet.into(),
            rock_ridge: rock_ridge.into(),
        }
    }

    /// Appends the ISO9660 file version to the identifier.
    pub fn versioned(mut self) -> Self {
        self.iso9660.push_str(FILE_VERSION);
        self
    }
}
