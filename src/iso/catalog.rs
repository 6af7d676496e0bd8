//! Read-only view of the directory hierarchy of an existing ISO9660 image.
//!
//! Only what is needed to check mutations against the source image is read:
//! the volume descriptor set, the primary directory hierarchy, and the Rock
//! Ridge `NM`/`PX` entries of every record. File contents are never touched.
//!
//! # Layout
//!
//! - Volume descriptors start at sector 16 (byte offset 32768), one per
//!   2048-byte sector, until the set terminator (type 255)
//! - The primary descriptor (type 1) holds the root directory record at
//!   offset 156
//! - A supplementary descriptor (type 2) with a UCS-2 escape sequence at
//!   offset 88 announces a Joliet hierarchy

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

use super::tree::EntryKind;
use crate::error::ImageError;

/// ISO9660 logical sector size
pub const SECTOR_SIZE: usize = 2048;

const FIRST_DESCRIPTOR_SECTOR: u64 = 16;
const MAX_DESCRIPTORS: u64 = 64;

/// Standard identifier of every volume descriptor
const STANDARD_ID: &[u8] = b"CD001";

const DESCRIPTOR_PRIMARY: u8 = 1;
const DESCRIPTOR_SUPPLEMENTARY: u8 = 2;
const DESCRIPTOR_TERMINATOR: u8 = 255;

/// UCS-2 level 1, 2 and 3 escape sequences marking a Joliet descriptor
const JOLIET_ESCAPES: [&[u8]; 3] = [b"%/@", b"%/C", b"%/E"];

const MIN_RECORD_LEN: usize = 34;
const FLAG_DIRECTORY: u8 = 0x02;
const FLAG_MULTI_EXTENT: u8 = 0x80;

/// Directories larger than this are treated as corrupt
const MAX_DIRECTORY_SIZE: u32 = 16 * 1024 * 1024;
const MAX_CONTINUATIONS: usize = 16;

const NM_CURRENT: u8 = 0x02;
const NM_PARENT: u8 = 0x04;

/// One directory or file found in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub kind: EntryKind,
    /// ISO9660 path including the file version, e.g. `/BOOT/GRUB/GRUB.CFG;1`
    pub iso_path: String,
    /// Rock Ridge path, e.g. `/boot/grub/grub.cfg`
    pub rr_path: String,
    /// Rock Ridge `PX` mode, file type bits included
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub volume_id: String,
    pub joliet: bool,
    pub rock_ridge: bool,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        debug!("Reading catalog of {}", path.display());
        let file = File::open(path).map_err(|e| ImageError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let catalog = Self::read(BufReader::new(file))?;
        info!(
            "Source image '{}': {} entries (Joliet: {}, Rock Ridge: {})",
            catalog.volume_id,
            catalog.entries.len(),
            catalog.joliet,
            catalog.rock_ridge
        );
        Ok(catalog)
    }

    pub fn read<R: Read + Seek>(reader: R) -> Result<Self, ImageError> {
        let mut walker = Walker {
            reader,
            visited: HashSet::new(),
        };
        let descriptors = walker.read_descriptors()?;

        let mut catalog = Catalog {
            volume_id: descriptors.volume_id,
            joliet: descriptors.joliet,
            ..Default::default()
        };
        walker.walk(descriptors.root_extent, descriptors.root_size, &mut catalog)?;
        Ok(catalog)
    }

    /// Looks up an entry by ISO9660 path, version suffix included.
    pub fn find(&self, iso_path: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.iso_path == iso_path)
    }
}

struct Descriptors {
    volume_id: String,
    joliet: bool,
    root_extent: u32,
    root_size: u32,
}

/// A parsed directory record.
struct Record<'a> {
    extent: u32,
    size: u32,
    flags: u8,
    identifier: &'a [u8],
    system_use: &'a [u8],
}

impl Record<'_> {
    fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// `.` and `..` use the single bytes 0x00 and 0x01 as identifiers.
    fn is_self_or_parent(&self) -> bool {
        matches!(self.identifier, [0] | [1])
    }
}

/// Rock Ridge data gathered from one System Use area.
#[derive(Debug, Default)]
struct SystemUse {
    name: Option<String>,
    mode: Option<u32>,
    relocated: bool,
}

impl SystemUse {
    fn is_rock_ridge(&self) -> bool {
        self.name.is_some() || self.mode.is_some()
    }
}

struct Walker<R> {
    reader: R,
    visited: HashSet<u32>,
}

impl<R: Read + Seek> Walker<R> {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ImageError> {
        let mut buf = vec![0u8; len];
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut buf))
            .map_err(|e| {
                ImageError::Malformed(format!("cannot read {} bytes at offset {}: {}", len, offset, e))
            })?;
        Ok(buf)
    }

    fn read_descriptors(&mut self) -> Result<Descriptors, ImageError> {
        let mut primary = None;
        let mut joliet = false;

        for index in 0..MAX_DESCRIPTORS {
            let sector = FIRST_DESCRIPTOR_SECTOR + index;
            let buf = self.read_at(sector * SECTOR_SIZE as u64, SECTOR_SIZE)?;
            if &buf[1..6] != STANDARD_ID {
                return Err(ImageError::Malformed(format!(
                    "no CD001 signature at sector {}",
                    sector
                )));
            }

            match buf[0] {
                DESCRIPTOR_PRIMARY => {
                    let volume_id = String::from_utf8_lossy(&buf[40..72]).trim().to_string();
                    let root = parse_record(&buf[156..190])?;
                    debug!("Primary volume descriptor at sector {}: '{}'", sector, volume_id);
                    primary = Some(Descriptors {
                        volume_id,
                        joliet: false,
                        root_extent: root.extent,
                        root_size: root.size,
                    });
                }
                DESCRIPTOR_SUPPLEMENTARY => {
                    if JOLIET_ESCAPES.iter().any(|seq| *seq == &buf[88..91]) {
                        debug!("Joliet descriptor at sector {}", sector);
                        joliet = true;
                    }
                }
                DESCRIPTOR_TERMINATOR => break,
                _ => {}
            }
        }

        let mut descriptors = primary
            .ok_or_else(|| ImageError::Malformed("no primary volume descriptor".to_string()))?;
        descriptors.joliet = joliet;
        Ok(descriptors)
    }

    fn read_directory(&mut self, extent: u32, size: u32) -> Result<Vec<u8>, ImageError> {
        if size > MAX_DIRECTORY_SIZE {
            return Err(ImageError::Malformed(format!(
                "directory at sector {} claims {} bytes",
                extent, size
            )));
        }
        self.read_at(extent as u64 * SECTOR_SIZE as u64, size as usize)
    }

    fn walk(&mut self, root_extent: u32, root_size: u32, catalog: &mut Catalog) -> Result<(), ImageError> {
        self.visited.insert(root_extent);
        let mut stack = vec![(String::from("/"), String::from("/"), root_extent, root_size)];

        while let Some((iso_dir, rr_dir, extent, size)) = stack.pop() {
            let data = self.read_directory(extent, size)?;
            let mut subdirs = Vec::new();
            let mut open_multi_extent: Option<Vec<u8>> = None;

            for record in records(&data)? {
                if record.is_self_or_parent() {
                    continue;
                }

                // Every section of a multi-extent file repeats its identifier;
                // only the first is reported.
                let continues = open_multi_extent.as_deref() == Some(record.identifier);
                open_multi_extent =
                    (record.flags & FLAG_MULTI_EXTENT != 0).then(|| record.identifier.to_vec());
                if continues {
                    continue;
                }

                let system_use = self.system_use(record.system_use)?;
                if system_use.relocated {
                    continue;
                }
                catalog.rock_ridge |= system_use.is_rock_ridge();

                let identifier = String::from_utf8_lossy(record.identifier).into_owned();
                let rr_name = system_use
                    .name
                    .unwrap_or_else(|| fallback_name(&identifier).to_string());
                let iso_path = join(&iso_dir, &identifier);
                let rr_path = join(&rr_dir, &rr_name);

                let kind = if record.is_directory() {
                    if self.visited.insert(record.extent) {
                        subdirs.push((iso_path.clone(), rr_path.clone(), record.extent, record.size));
                    } else {
                        debug!("Directory {} revisits sector {}", iso_path, record.extent);
                    }
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };

                catalog.entries.push(CatalogEntry {
                    kind,
                    iso_path,
                    rr_path,
                    mode: system_use.mode,
                });
            }

            stack.extend(subdirs.into_iter().rev());
        }
        Ok(())
    }

    /// Parses the SUSP entries of a System Use area, following `CE`
    /// continuation areas.
    fn system_use(&mut self, area: &[u8]) -> Result<SystemUse, ImageError> {
        let mut result = SystemUse::default();
        let mut name: Option<Vec<u8>> = None;
        let mut area = area.to_vec();

        for _ in 0..=MAX_CONTINUATIONS {
            let mut continuation = None;
            let mut offset = 0;

            while offset + 4 <= area.len() {
                let signature = &area[offset..offset + 2];
                let len = area[offset + 2] as usize;
                if len < 4 || offset + len > area.len() {
                    break;
                }
                let body = &area[offset + 4..offset + len];

                match signature {
                    b"NM" if !body.is_empty() => {
                        if body[0] & (NM_CURRENT | NM_PARENT) == 0 {
                            name.get_or_insert_with(Vec::new).extend_from_slice(&body[1..]);
                        }
                    }
                    b"PX" if body.len() >= 4 => {
                        result.mode = Some(le_u32(&body[0..4]));
                    }
                    b"RE" => result.relocated = true,
                    b"CE" if body.len() >= 24 => {
                        continuation = Some((le_u32(&body[0..4]), le_u32(&body[8..12]), le_u32(&body[16..20])));
                    }
                    b"ST" => break,
                    _ => {}
                }
                offset += len;
            }

            let Some((block, block_offset, len)) = continuation else {
                break;
            };
            if block_offset as usize + len as usize > SECTOR_SIZE {
                return Err(ImageError::Malformed(format!(
                    "continuation area at sector {} overruns its block",
                    block
                )));
            }
            area = self.read_at(
                block as u64 * SECTOR_SIZE as u64 + block_offset as u64,
                len as usize,
            )?;
        }

        result.name = name.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        Ok(result)
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn parse_record(data: &[u8]) -> Result<Record<'_>, ImageError> {
    if data.len() < MIN_RECORD_LEN {
        return Err(ImageError::Malformed(format!(
            "directory record of {} bytes",
            data.len()
        )));
    }
    let name_len = data[32] as usize;
    if 33 + name_len > data.len() {
        return Err(ImageError::Malformed(
            "directory record identifier overruns the record".to_string(),
        ));
    }
    // The identifier is padded to an even length before the System Use area.
    let system_use_start = 33 + name_len + (name_len + 1) % 2;

    Ok(Record {
        extent: le_u32(&data[2..6]),
        size: le_u32(&data[10..14]),
        flags: data[25],
        identifier: &data[33..33 + name_len],
        system_use: data.get(system_use_start..).unwrap_or(&[]),
    })
}

/// Splits directory data into records. Records never cross a sector
/// boundary; a zero length byte means the rest of the sector is padding.
fn records(data: &[u8]) -> Result<Vec<Record<'_>>, ImageError> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let len = data[offset] as usize;
        if len == 0 {
            offset = (offset / SECTOR_SIZE + 1) * SECTOR_SIZE;
            continue;
        }
        if offset + len > data.len() {
            return Err(ImageError::Malformed(format!(
                "directory record at offset {} overruns its directory",
                offset
            )));
        }
        records.push(parse_record(&data[offset..offset + len])?);
        offset += len;
    }
    Ok(records)
}

/// Name used when a record has no Rock Ridge `NM` entry: the identifier
/// without version and without the empty-extension dot.
fn fallback_name(identifier: &str) -> &str {
    let name = identifier.split(';').next().unwrap_or(identifier);
    name.strip_suffix('.').unwrap_or(name)
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
