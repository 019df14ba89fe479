//! Blank-image formatting and file copying on the storage volume.

use cartbridge_storage::{MediaError, OpenMode, Volume};

use crate::path_join;
use crate::SECTOR_SIZE;

/// Largest sectors-per-FAT value a supported geometry produces.
pub const SPF_MAX: u16 = 9;

/// Directory-entry attribute marking the volume label.
const VOLUME_LABEL_ATTRIBUTE: u8 = 0x08;

/// Failures of the image toolbox.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("destination file already exists")]
    Exists,
    #[error("target folder not found")]
    FolderNotFound,
    #[error("not enough free space on the volume")]
    DiskFull,
    #[error("corrupt compressed image: {0}")]
    BadImage(&'static str),
    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Enough room for `bytes` more on the volume?
pub(crate) fn check_free_space<V: Volume>(
    vol: &mut V,
    folder: &str,
    bytes: u64,
) -> Result<(), ImageError> {
    let space = vol.free_space(folder)?;
    if bytes > space.free_bytes() {
        return Err(ImageError::DiskFull);
    }
    Ok(())
}

pub(crate) fn refuse_existing<V: Volume>(
    vol: &mut V,
    path: &str,
    overwrite: bool,
) -> Result<(), ImageError> {
    if !overwrite && vol.stat(path).is_ok() {
        return Err(ImageError::Exists);
    }
    Ok(())
}

/// Creates a blank, formatted raw disk image.
///
/// The boot sector, both FAT seeds and the optional volume label are laid
/// out in a single header write; the data area is zero-filled in
/// sector-sized chunks so the whole image never has to fit in memory.
#[allow(clippy::too_many_arguments)]
pub fn create_st_image<V: Volume>(
    vol: &mut V,
    folder: &str,
    name: &str,
    tracks: u16,
    sectors: u16,
    sides: u16,
    volume_label: Option<&str>,
    overwrite: bool,
) -> Result<(), ImageError> {
    if vol.stat(folder).is_err() {
        return Err(ImageError::FolderNotFound);
    }

    let disk_size = tracks as u64 * sectors as u64 * sides as u64 * SECTOR_SIZE as u64;
    let header_size = 2 * (1 + SPF_MAX as u64) * SECTOR_SIZE as u64;
    check_free_space(vol, folder, disk_size)?;

    let path = path_join(folder, name);
    refuse_existing(vol, &path, overwrite)?;

    // High-density disks are always double sided.
    let sides = if sectors >= 18 { 2 } else { sides };

    let mut header = vec![0u8; header_size as usize];
    header[0] = 0xE9;
    header[2..8].fill(0x4E); // loader
    let serial: [u8; 3] = rand::random();
    header[8..11].copy_from_slice(&serial);
    header[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());

    let sectors_per_cluster: u8 = if tracks == 40 && sides == 1 { 1 } else { 2 };
    header[13] = sectors_per_cluster;
    header[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    header[16] = 2; // FAT count

    let root_entries: u16 = if sectors_per_cluster == 1 {
        64
    } else if sectors < 18 {
        112
    } else {
        224
    };
    header[17..19].copy_from_slice(&root_entries.to_le_bytes());
    header[19..21].copy_from_slice(&(tracks * sectors * sides).to_le_bytes());

    let media_byte: u8 = if sectors >= 18 {
        0xF0
    } else {
        let base = if tracks <= 42 { 0xFC } else { 0xF8 };
        if sides == 2 { base | 0x01 } else { base }
    };
    header[21] = media_byte;

    let sectors_per_fat: u16 = if sectors >= 18 {
        SPF_MAX
    } else if tracks >= 80 {
        5
    } else {
        2
    };
    header[22..24].copy_from_slice(&sectors_per_fat.to_le_bytes());
    header[24..26].copy_from_slice(&sectors.to_le_bytes());
    header[26..28].copy_from_slice(&sides.to_le_bytes());
    header[28..30].copy_from_slice(&0u16.to_le_bytes()); // hidden sectors

    // Media seeds at the head of both FATs.
    let fat2 = SECTOR_SIZE + sectors_per_fat as usize * SECTOR_SIZE;
    for fat in [SECTOR_SIZE, fat2] {
        header[fat] = media_byte;
        header[fat + 1] = 0xFF;
        header[fat + 2] = 0xFF;
    }

    if let Some(label) = volume_label {
        let dir_start = (1 + sectors_per_fat as usize * 2) * SECTOR_SIZE;
        header[dir_start..dir_start + 11].fill(b' ');
        let bytes = label.as_bytes();
        let n = bytes.len().min(11);
        header[dir_start..dir_start + n].copy_from_slice(&bytes[..n]);
        header[dir_start + 11] = VOLUME_LABEL_ATTRIBUTE;
    }

    let mut dest = vol.open(&path, OpenMode::WRITE | OpenMode::CREATE_ALWAYS)?;
    dest.write_all(&header)?;

    let zeros = [0u8; SECTOR_SIZE];
    let mut remaining = disk_size.saturating_sub(header_size);
    while remaining > 0 {
        let chunk = remaining.min(SECTOR_SIZE as u64) as usize;
        dest.write_all(&zeros[..chunk])?;
        remaining -= chunk as u64;
    }
    log::debug!("formatted {path}: {tracks} tracks, {sectors} sectors, {sides} sides");
    Ok(())
}

/// Copies a file within a folder through a bounded buffer.
pub fn copy_file<V: Volume>(
    vol: &mut V,
    folder: &str,
    src_name: &str,
    dest_name: &str,
    overwrite: bool,
) -> Result<(), ImageError> {
    let src_path = path_join(folder, src_name);
    let dest_path = path_join(folder, dest_name);
    refuse_existing(vol, &dest_path, overwrite)?;

    let mut src = vol.open(&src_path, OpenMode::READ)?;
    let mut dest = vol.open(&dest_path, OpenMode::WRITE | OpenMode::CREATE_ALWAYS)?;
    let mut buffer = [0u8; 4096];
    loop {
        let n = src.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        dest.write_all(&buffer[..n])?;
    }
    log::debug!("copied {src_path} to {dest_path}");
    Ok(())
}
