//! In-memory model of an image's directory hierarchy.
//!
//! Entries are keyed by their ISO9660 path without the version suffix, so
//! `/BOOT/GRUB/GRUB.CFG;1` and `/BOOT/GRUB/GRUB.CFG` name the same file.
//! Every accepted change is appended to a journal that a backend replays
//! when writing the image.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::catalog::Catalog;
use crate::core::mapper::MappedNames;
use crate::error::ImageError;

/// Longest ISO9660 identifier accepted, version suffix excluded.
pub const MAX_ISO9660_COMPONENT: usize = 31;

/// Longest Joliet name, in characters.
pub const MAX_JOLIET_COMPONENT: usize = 64;

const JOLIET_FORBIDDEN: &[char] = &['*', '/', ':', ';', '?', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Where an entry's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Already present in the source image.
    Source,
    /// Added during this run, from a local file for files.
    Added(Option<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub iso_path: String,
    pub joliet_path: String,
    pub rr_path: String,
    pub mode: Option<u32>,
    pub origin: Origin,
}

/// One accepted change, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddDirectory {
        iso_path: String,
        joliet_path: String,
        rr_path: String,
    },
    AddFile {
        source: PathBuf,
        iso_path: String,
        joliet_path: String,
        rr_path: String,
        mode: u32,
    },
    RemoveFile {
        iso_path: String,
        rr_path: String,
    },
}

#[derive(Debug, Clone)]
pub struct ImageTree {
    entries: BTreeMap<String, Entry>,
    joliet: HashMap<String, String>,
    journal: Vec<Mutation>,
}

impl Default for ImageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTree {
    /// An image holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "/".to_string(),
            Entry {
                kind: EntryKind::Directory,
                iso_path: "/".to_string(),
                joliet_path: "/".to_string(),
                rr_path: "/".to_string(),
                mode: None,
                origin: Origin::Source,
            },
        );
        let mut joliet = HashMap::new();
        joliet.insert("/".to_string(), "/".to_string());

        Self {
            entries,
            joliet,
            journal: Vec::new(),
        }
    }

    /// Seed the model with the hierarchy of an existing image.
    ///
    /// Joliet names of existing entries follow their Rock Ridge paths, which
    /// is how Joliet trees are generated for Ubuntu images.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut tree = Self::new();
        for item in &catalog.entries {
            let key = strip_version(&item.iso_path).to_string();
            tree.joliet.insert(item.rr_path.clone(), key.clone());
            tree.entries.insert(
                key,
                Entry {
                    kind: item.kind,
                    iso_path: item.iso_path.clone(),
                    joliet_path: item.rr_path.clone(),
                    rr_path: item.rr_path.clone(),
                    mode: item.mode,
                    origin: Origin::Source,
                },
            );
        }
        debug!("Loaded {} entries from source image", tree.entries.len() - 1);
        tree
    }

    pub fn get(&self, iso_path: &str) -> Option<&Entry> {
        self.entries.get(strip_version(iso_path))
    }

    pub fn contains(&self, iso_path: &str) -> bool {
        self.get(iso_path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn journal(&self) -> &[Mutation] {
        &self.journal
    }

    pub fn add_directory(&mut self, names: &MappedNames) -> Result<(), ImageError> {
        let (key, rr_path) = self.check_new_entry(names, EntryKind::Directory)?;

        self.insert(key, names, rr_path.clone(), EntryKind::Directory, None, None);
        self.journal.push(Mutation::AddDirectory {
            iso_path: names.iso9660.clone(),
            joliet_path: names.joliet.clone(),
            rr_path,
        });
        Ok(())
    }

    pub fn add_file(
        &mut self,
        source: &Path,
        names: &MappedNames,
        mode: u32,
    ) -> Result<(), ImageError> {
        let (key, rr_path) = self.check_new_entry(names, EntryKind::File)?;
        File::open(source).map_err(|e| ImageError::SourceRead {
            path: source.to_path_buf(),
            source: e,
        })?;

        let mode = mode & 0o7777;
        self.insert(
            key,
            names,
            rr_path.clone(),
            EntryKind::File,
            Some(mode),
            Some(source.to_path_buf()),
        );
        self.journal.push(Mutation::AddFile {
            source: source.to_path_buf(),
            iso_path: names.iso9660.clone(),
            joliet_path: names.joliet.clone(),
            rr_path,
            mode,
        });
        Ok(())
    }

    pub fn remove_file(&mut self, iso_path: &str) -> Result<(), ImageError> {
        let key = strip_version(iso_path);
        match self.entries.get(key) {
            Some(entry) if entry.kind == EntryKind::File => {}
            _ => return Err(ImageError::NotFound(iso_path.to_string())),
        }

        let Some(entry) = self.entries.remove(key) else {
            return Err(ImageError::NotFound(iso_path.to_string()));
        };
        self.joliet.remove(&entry.joliet_path);
        debug!("Removed {} ({})", entry.iso_path, entry.rr_path);
        self.journal.push(Mutation::RemoveFile {
            iso_path: entry.iso_path,
            rr_path: entry.rr_path,
        });
        Ok(())
    }

    fn insert(
        &mut self,
        key: String,
        names: &MappedNames,
        rr_path: String,
        kind: EntryKind,
        mode: Option<u32>,
        source: Option<PathBuf>,
    ) {
        self.joliet.insert(names.joliet.clone(), key.clone());
        self.entries.insert(
            key,
            Entry {
                kind,
                iso_path: names.iso9660.clone(),
                joliet_path: names.joliet.clone(),
                rr_path,
                mode,
                origin: Origin::Added(source),
            },
        );
    }

    /// Validates the names of a new entry, returning its key and full Rock
    /// Ridge path.
    fn check_new_entry(
        &self,
        names: &MappedNames,
        kind: EntryKind,
    ) -> Result<(String, String), ImageError> {
        validate_iso9660_path(&names.iso9660, kind)?;
        validate_joliet_path(&names.joliet)?;
        validate_rock_ridge_name(&names.rock_ridge)?;

        let key = strip_version(&names.iso9660).to_string();
        if self.entries.contains_key(&key) {
            return Err(ImageError::Collision(names.iso9660.clone()));
        }
        if self.joliet.contains_key(&names.joliet) {
            return Err(ImageError::Collision(names.joliet.clone()));
        }

        let parent = parent_of(&key);
        let parent_entry = match self.entries.get(parent) {
            Some(entry) if entry.kind == EntryKind::Directory => entry,
            _ => return Err(ImageError::MissingParent(names.iso9660.clone())),
        };
        let joliet_parent = parent_of(&names.joliet);
        if !self.joliet.contains_key(joliet_parent) {
            return Err(ImageError::MissingParent(names.joliet.clone()));
        }

        let rr_path = if parent_entry.rr_path == "/" {
            format!("/{}", names.rock_ridge)
        } else {
            format!("{}/{}", parent_entry.rr_path, names.rock_ridge)
        };
        Ok((key, rr_path))
    }
}

/// `/A/B;1` -> `/A/B`
pub fn strip_version(iso_path: &str) -> &str {
    match iso_path.rfind(';') {
        Some(idx) if !iso_path[idx..].contains('/') => &iso_path[..idx],
        _ => iso_path,
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn validate_iso9660_path(path: &str, kind: EntryKind) -> Result<(), ImageError> {
    let Some(relative) = path.strip_prefix('/') else {
        return Err(ImageError::invalid_name(path, "ISO9660 path must start with '/'"));
    };
    let components: Vec<&str> = relative.split('/').collect();
    let last = components.len() - 1;

    for (idx, component) in components.iter().enumerate() {
        let mut identifier = *component;
        if idx == last {
            if let Some((name, version)) = component.split_once(';') {
                if kind == EntryKind::Directory {
                    return Err(ImageError::invalid_name(
                        path,
                        "directory identifiers carry no version",
                    ));
                }
                match version.parse::<u16>() {
                    Ok(1..=32767) => {}
                    _ => {
                        return Err(ImageError::invalid_name(
                            path,
                            format!("invalid file version '{}'", version),
                        ))
                    }
                }
                identifier = name;
            }
        }

        if identifier.is_empty() {
            return Err(ImageError::invalid_name(path, "empty path component"));
        }
        if identifier.len() > MAX_ISO9660_COMPONENT {
            return Err(ImageError::invalid_name(
                path,
                format!(
                    "'{}' is longer than {} characters",
                    identifier, MAX_ISO9660_COMPONENT
                ),
            ));
        }
        if let Some(c) = identifier
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_' || *c == '.'))
        {
            return Err(ImageError::invalid_name(
                path,
                format!("character '{}' is not allowed in ISO9660 names", c),
            ));
        }

        // Directory identifiers have no extension; file identifiers have at
        // most one separator.
        let dots = identifier.matches('.').count();
        let is_directory = idx < last || kind == EntryKind::Directory;
        if is_directory && dots > 0 {
            return Err(ImageError::invalid_name(
                path,
                format!("directory identifier '{}' contains '.'", identifier),
            ));
        }
        if dots > 1 {
            return Err(ImageError::invalid_name(
                path,
                format!("'{}' has more than one '.' separator", identifier),
            ));
        }
    }
    Ok(())
}

fn validate_joliet_path(path: &str) -> Result<(), ImageError> {
    let Some(relative) = path.strip_prefix('/') else {
        return Err(ImageError::invalid_name(path, "Joliet path must start with '/'"));
    };
    for component in relative.split('/') {
        if component.is_empty() {
            return Err(ImageError::invalid_name(path, "empty path component"));
        }
        if component.chars().count() > MAX_JOLIET_COMPONENT {
            return Err(ImageError::invalid_name(
                path,
                format!(
                    "'{}' is longer than {} characters",
                    component, MAX_JOLIET_COMPONENT
                ),
            ));
        }
        if let Some(c) = component.chars().find(|c| JOLIET_FORBIDDEN.contains(c)) {
            return Err(ImageError::invalid_name(
                path,
                format!("character '{}' is not allowed in Joliet names", c),
            ));
        }
    }
    Ok(())
}

fn validate_rock_ridge_name(name: &str) -> Result<(), ImageError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ImageError::invalid_name(name, "invalid Rock Ridge name"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(ImageError::invalid_name(
            name,
            "Rock Ridge names cannot contain '/' or NUL",
        ));
    }
    Ok(())
}
