use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use super::catalog::Catalog;
use super::tree::{ImageTree, Mutation};
use super::{ImageAuthor, ImageBackend};
use crate::core::mapper::MappedNames;
use crate::error::ImageError;

/// ISO9660 level 2 and up keep identifiers of up to 31 characters, so the
/// names `xorriso` derives match the mapped ones instead of 8.3 truncations.
pub const ISO9660_COMPLIANCE: &str = "iso_9660_level=3";

/// Opens images whose final write is performed by `xorriso`.
#[derive(Debug, Clone)]
pub struct Xorriso {
    program: PathBuf,
    dry_run: bool,
}

impl Xorriso {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dry_run: false,
        }
    }

    /// Print the write plan instead of running `xorriso`.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for Xorriso {
    fn default() -> Self {
        Self::new("xorriso")
    }
}

impl ImageBackend for Xorriso {
    type Image = XorrisoImage;

    fn open(&self, source: &Path) -> Result<XorrisoImage, ImageError> {
        info!("Opening source image: {}", source.display());
        let catalog = Catalog::open(source)?;
        if !catalog.rock_ridge {
            debug!("Source image carries no Rock Ridge entries");
        }
        Ok(XorrisoImage {
            source: source.to_path_buf(),
            program: self.program.clone(),
            dry_run: self.dry_run,
            tree: Some(ImageTree::from_catalog(&catalog)),
        })
    }
}

/// An open image. Changes are validated against the in-memory tree and
/// replayed onto the source image by `xorriso` on [`ImageAuthor::write`].
#[derive(Debug)]
pub struct XorrisoImage {
    source: PathBuf,
    program: PathBuf,
    dry_run: bool,
    tree: Option<ImageTree>,
}

#[derive(Serialize)]
struct WritePlan<'a> {
    source: &'a Path,
    output: &'a Path,
    program: &'a Path,
    arguments: Vec<String>,
    mutations: &'a [Mutation],
}

impl XorrisoImage {
    pub fn tree(&self) -> Option<&ImageTree> {
        self.tree.as_ref()
    }

    fn tree_mut(&mut self) -> Result<&mut ImageTree, ImageError> {
        self.tree.as_mut().ok_or(ImageError::Closed)
    }

    /// Arguments that turn the source image plus the journal into `output`.
    ///
    /// Paths are Rock Ridge paths; `xorriso` derives the ISO9660 and Joliet
    /// trees from them.
    pub fn command_args(&self, output: &Path) -> Result<Vec<OsString>, ImageError> {
        let tree = self.tree.as_ref().ok_or(ImageError::Closed)?;

        let mut args: Vec<OsString> = [
            "-abort_on",
            "FAILURE",
            "-iso_rr_pattern",
            "off",
            "-disk_pattern",
            "off",
            "-compliance",
            ISO9660_COMPLIANCE,
            "-indev",
        ]
        .map(OsString::from)
        .into();
        args.push(self.source.clone().into_os_string());
        args.push("-outdev".into());
        args.push(output.as_os_str().to_os_string());
        args.extend(["-joliet", "on", "-rockridge", "on"].map(OsString::from));

        for mutation in tree.journal() {
            match mutation {
                Mutation::AddDirectory { rr_path, .. } => {
                    args.extend(["-mkdir", rr_path.as_str(), "--"].map(OsString::from));
                }
                Mutation::AddFile {
                    source,
                    rr_path,
                    mode,
                    ..
                } => {
                    args.push("-map".into());
                    args.push(source.clone().into_os_string());
                    args.push(rr_path.into());
                    args.push("-chmod".into());
                    args.push(format!("{:04o}", mode).into());
                    args.push(rr_path.into());
                    args.push("--".into());
                }
                Mutation::RemoveFile { rr_path, .. } => {
                    args.extend(["-rm", rr_path.as_str(), "--"].map(OsString::from));
                }
            }
        }

        args.extend(["-boot_image", "any", "replay"].map(OsString::from));
        Ok(args)
    }

    fn print_plan(&self, output: &Path, args: &[OsString]) -> Result<(), ImageError> {
        let tree = self.tree.as_ref().ok_or(ImageError::Closed)?;
        let plan = WritePlan {
            source: &self.source,
            output,
            program: &self.program,
            arguments: args.iter().map(|a| a.to_string_lossy().into_owned()).collect(),
            mutations: tree.journal(),
        };
        let json = serde_json::to_string_pretty(&plan).map_err(|e| ImageError::Serialize {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
        println!("{}", json);
        Ok(())
    }
}

impl ImageAuthor for XorrisoImage {
    fn add_directory(&mut self, names: &MappedNames) -> Result<(), ImageError> {
        debug!("Adding directory {} ({})", names.iso9660, names.joliet);
        self.tree_mut()?.add_directory(names)
    }

    fn add_file(&mut self, source: &Path, names: &MappedNames, mode: u32) -> Result<(), ImageError> {
        debug!(
            "Adding file {} as {} ({}, mode {:o})",
            source.display(),
            names.iso9660,
            names.joliet,
            mode & 0o7777
        );
        self.tree_mut()?.add_file(source, names, mode)
    }

    fn remove_file(&mut self, iso_path: &str) -> Result<(), ImageError> {
        debug!("Removing file {}", iso_path);
        self.tree_mut()?.remove_file(iso_path)
    }

    fn write(&mut self, output: &Path) -> Result<(), ImageError> {
        let args = self.command_args(output)?;
        if self.dry_run {
            info!("Dry run: not writing {}", output.display());
            return self.print_plan(output, &args);
        }

        let serialize_error = |reason: String| ImageError::Serialize {
            path: output.to_path_buf(),
            reason,
        };

        if output.exists() {
            debug!("Replacing existing output {}", output.display());
            std::fs::remove_file(output).map_err(|e| serialize_error(e.to_string()))?;
        }

        info!("Writing image: {}", output.display());
        debug!("{} {:?}", self.program.display(), args);
        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| serialize_error(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(serialize_error(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                tail.join("\n")
            )));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ImageError> {
        if self.tree.take().is_none() {
            return Err(ImageError::Closed);
        }
        debug!("Closed image {}", self.source.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapper::IsoPath;
    use crate::iso::fixture;
    use std::fs;

    fn open_fixture(dir: &Path, image: Vec<u8>) -> XorrisoImage {
        let source = dir.join("ubuntu.iso");
        fs::write(&source, image).unwrap();
        Xorriso::new("xorriso").open(&source).unwrap()
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_open_loads_source_tree() {
        let temp = tempfile::tempdir().unwrap();
        let image = open_fixture(temp.path(), fixture::ubuntu_image());
        let tree = image.tree().unwrap();
        assert!(tree.contains("/BOOT/GRUB/GRUB.CFG;1"));
        assert!(tree.contains("/CASPER/VMLINUZ."));
        assert!(tree.journal().is_empty());
    }

    #[test]
    fn test_command_args() {
        let temp = tempfile::tempdir().unwrap();
        let data = temp.path().join("user-data");
        fs::write(&data, "#cloud-config\n").unwrap();

        let mut image = open_fixture(temp.path(), fixture::ubuntu_image());
        image.add_directory(&IsoPath::new("nocloud").names()).unwrap();
        image
            .add_file(&data, &IsoPath::new("nocloud/user-data").names().versioned(), 0o100640)
            .unwrap();
        image.remove_file("/BOOT/GRUB/GRUB.CFG;1").unwrap();

        let output = temp.path().join("out.iso");
        let args = strings(&image.command_args(&output).unwrap());

        let source = temp.path().join("ubuntu.iso");
        let indev = args.iter().position(|a| a == "-indev").unwrap();
        assert_eq!(args[indev + 1], source.to_string_lossy());
        assert_eq!(args[indev + 2], "-outdev");
        assert_eq!(args[indev + 3], output.to_string_lossy());

        let ops: Vec<&str> = args
            .iter()
            .skip_while(|a| *a != "-rockridge")
            .skip(2)
            .map(String::as_str)
            .collect();
        assert_eq!(
            ops,
            [
                "-mkdir",
                "/nocloud",
                "--",
                "-map",
                data.to_str().unwrap(),
                "/nocloud/user-data",
                "-chmod",
                "0640",
                "/nocloud/user-data",
                "--",
                "-rm",
                "/boot/grub/grub.cfg",
                "--",
                "-boot_image",
                "any",
                "replay",
            ]
        );
        assert_eq!(&args[..2], ["-abort_on", "FAILURE"]);

        let compliance = args.iter().position(|a| a == "-compliance").unwrap();
        assert_eq!(args[compliance + 1], "iso_9660_level=3");
        assert!(compliance < indev);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("ubuntu.iso");
        fs::write(&source, fixture::ubuntu_image()).unwrap();

        let mut image = Xorriso::new("/nonexistent/xorriso")
            .dry_run(true)
            .open(&source)
            .unwrap();
        let output = temp.path().join("out.iso");
        image.write(&output).unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_program_is_serialization_error() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("ubuntu.iso");
        fs::write(&source, fixture::ubuntu_image()).unwrap();

        let mut image = Xorriso::new("/nonexistent/xorriso").open(&source).unwrap();
        let err = image.write(&temp.path().join("out.iso")).unwrap_err();
        assert!(matches!(err, ImageError::Serialize { .. }));
    }

    #[test]
    fn test_operations_after_close() {
        let temp = tempfile::tempdir().unwrap();
        let mut image = open_fixture(temp.path(), fixture::ubuntu_image());
        image.close().unwrap();

        assert!(matches!(image.close(), Err(ImageError::Closed)));
        assert!(matches!(
            image.add_directory(&IsoPath::new("custom").names()),
            Err(ImageError::Closed)
        ));
        assert!(matches!(
            image.write(&temp.path().join("out.iso")),
            Err(ImageError::Closed)
        ));
    }
}
