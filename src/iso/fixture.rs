//! Synthetic ISO9660 images for tests.
//!
//! Sectors 16-18 hold the primary, Joliet and terminator descriptors; the
//! root directory starts at sector 20 and every further directory, file and
//! continuation area gets one sector of its own.

use super::catalog::SECTOR_SIZE;

const ROOT_SECTOR: u32 = 20;
const DIR_MODE: u32 = 0o40755;

pub(crate) enum Node {
    Dir {
        name: &'static str,
        rr: Option<&'static str>,
        children: Vec<Node>,
    },
    File {
        name: &'static str,
        rr: Option<&'static str>,
        mode: u32,
        data: &'static [u8],
        continued: bool,
    },
}

pub(crate) fn dir(name: &'static str, rr: Option<&'static str>, children: Vec<Node>) -> Node {
    Node::Dir { name, rr, children }
}

pub(crate) fn file(
    name: &'static str,
    rr: Option<&'static str>,
    mode: u32,
    data: &'static [u8],
) -> Node {
    Node::File {
        name,
        rr,
        mode,
        data,
        continued: false,
    }
}

/// A file whose Rock Ridge name lives in a `CE` continuation area.
pub(crate) fn file_with_continuation(
    name: &'static str,
    rr: &'static str,
    mode: u32,
    data: &'static [u8],
) -> Node {
    Node::File {
        name,
        rr: Some(rr),
        mode,
        data,
        continued: true,
    }
}

/// The parts of an Ubuntu installer image the builder cares about.
pub(crate) fn ubuntu_image() -> Vec<u8> {
    build_image(vec![
        dir(
            "BOOT",
            Some("boot"),
            vec![dir(
                "GRUB",
                Some("grub"),
                vec![file(
                    "GRUB.CFG;1",
                    Some("grub.cfg"),
                    0o100444,
                    b"set timeout=30\n",
                )],
            )],
        ),
        dir(
            "CASPER",
            Some("casper"),
            vec![file("VMLINUZ.;1", Some("vmlinuz"), 0o100444, b"kernel")],
        ),
        file("MD5SUM.TXT;1", Some("md5sum.txt"), 0o100444, b"sums"),
    ])
}

/// Same as [`ubuntu_image`] without `/boot/grub/grub.cfg`.
pub(crate) fn image_without_grub() -> Vec<u8> {
    build_image(vec![dir(
        "BOOT",
        Some("boot"),
        vec![dir("GRUB", Some("grub"), vec![])],
    )])
}

pub(crate) fn build_image(root: Vec<Node>) -> Vec<u8> {
    let mut image = vec![0u8; ROOT_SECTOR as usize * SECTOR_SIZE];

    let pvd = sector_mut(&mut image, 16);
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    let volume_id = b"Ubuntu-Server 24.04 LTS amd64";
    pvd[40..72].fill(b' ');
    pvd[40..40 + volume_id.len()].copy_from_slice(volume_id);
    let root_record = record(&[0], ROOT_SECTOR, SECTOR_SIZE as u32, 0x02, &[]);
    pvd[156..156 + root_record.len()].copy_from_slice(&root_record);

    let svd = sector_mut(&mut image, 17);
    svd[0] = 2;
    svd[1..6].copy_from_slice(b"CD001");
    svd[6] = 1;
    svd[88..91].copy_from_slice(b"%/E");

    let terminator = sector_mut(&mut image, 18);
    terminator[0] = 255;
    terminator[1..6].copy_from_slice(b"CD001");
    terminator[6] = 1;

    let mut next = ROOT_SECTOR + 1;
    write_dir(&mut image, ROOT_SECTOR, ROOT_SECTOR, &root, &mut next);
    image
}

fn sector_mut(image: &mut Vec<u8>, sector: u32) -> &mut [u8] {
    let start = sector as usize * SECTOR_SIZE;
    if image.len() < start + SECTOR_SIZE {
        image.resize(start + SECTOR_SIZE, 0);
    }
    &mut image[start..start + SECTOR_SIZE]
}

fn write_dir(image: &mut Vec<u8>, extent: u32, parent: u32, children: &[Node], next: &mut u32) {
    let mut data = record(&[0], extent, SECTOR_SIZE as u32, 0x02, &[]);
    data.extend(record(&[1], parent, SECTOR_SIZE as u32, 0x02, &[]));

    let mut placed = Vec::new();
    for child in children {
        let sector = *next;
        *next += 1;
        match child {
            Node::Dir { name, rr, .. } => {
                let mut su = rr.map(nm).unwrap_or_default();
                su.extend(px(DIR_MODE));
                data.extend(record(name.as_bytes(), sector, SECTOR_SIZE as u32, 0x02, &su));
            }
            Node::File {
                name,
                rr,
                mode,
                data: content,
                continued,
            } => {
                let mut su = px(*mode);
                if *continued {
                    let ce_sector = *next;
                    *next += 1;
                    let area = rr.map(nm).unwrap_or_default();
                    sector_mut(image, ce_sector)[..area.len()].copy_from_slice(&area);
                    su.extend(ce(ce_sector, area.len() as u32));
                } else if let Some(rr) = rr {
                    su.extend(nm(rr));
                }
                data.extend(record(name.as_bytes(), sector, content.len() as u32, 0, &su));
                sector_mut(image, sector)[..content.len()].copy_from_slice(content);
            }
        }
        placed.push((child, sector));
    }
    assert!(data.len() <= SECTOR_SIZE, "fixture directory too large");
    sector_mut(image, extent)[..data.len()].copy_from_slice(&data);

    for (child, sector) in placed {
        if let Node::Dir { children, .. } = child {
            write_dir(image, sector, extent, children, next);
        }
    }
}

fn both_endian_u32(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&value.to_le_bytes());
    out[4..].copy_from_slice(&value.to_be_bytes());
    out
}

fn record(identifier: &[u8], extent: u32, size: u32, flags: u8, system_use: &[u8]) -> Vec<u8> {
    let pad = (identifier.len() + 1) % 2;
    let mut len = 33 + identifier.len() + pad + system_use.len();
    len += len % 2;

    let mut r = vec![0u8; len];
    r[0] = len as u8;
    r[2..10].copy_from_slice(&both_endian_u32(extent));
    r[10..18].copy_from_slice(&both_endian_u32(size));
    r[25] = flags;
    r[28..30].copy_from_slice(&1u16.to_le_bytes());
    r[30..32].copy_from_slice(&1u16.to_be_bytes());
    r[32] = identifier.len() as u8;
    r[33..33 + identifier.len()].copy_from_slice(identifier);
    let su_start = 33 + identifier.len() + pad;
    r[su_start..su_start + system_use.len()].copy_from_slice(system_use);
    r
}

fn nm(name: &str) -> Vec<u8> {
    let mut entry = vec![b'N', b'M', (5 + name.len()) as u8, 1, 0];
    entry.extend_from_slice(name.as_bytes());
    entry
}

fn px(mode: u32) -> Vec<u8> {
    let mut entry = vec![b'P', b'X', 36, 1];
    entry.extend_from_slice(&both_endian_u32(mode));
    entry.extend_from_slice(&both_endian_u32(1));
    entry.extend_from_slice(&both_endian_u32(0));
    entry.extend_from_slice(&both_endian_u32(0));
    entry
}

fn ce(sector: u32, len: u32) -> Vec<u8> {
    let mut entry = vec![b'C', b'E', 28, 1];
    entry.extend_from_slice(&both_endian_u32(sector));
    entry.extend_from_slice(&both_endian_u32(0));
    entry.extend_from_slice(&both_endian_u32(len));
    entry
}
