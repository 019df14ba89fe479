//! Decompression of the track-compressed interchange format to raw images.
//!
//! The compressed form carries a five-word big-endian header, then one
//! length-prefixed block per track and side. A block either holds the raw
//! track or a run-length encoding where `0xE5` escapes a (byte, 16-bit
//! count) pair.

use cartbridge_storage::{OpenMode, Volume};

use crate::image::{ImageError, check_free_space, refuse_existing};
use crate::path_join;
use crate::SECTOR_SIZE;

/// Identification word at the head of a compressed image.
pub const MSA_MAGIC: u16 = 0x0E0F;
/// The escape introducing a run in a compressed track.
const RLE_ESCAPE: u8 = 0xE5;

/// Parsed header of a compressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsaHeader {
    pub sectors_per_track: u16,
    /// Stored sides minus one: 0 means single sided.
    pub sides: u16,
    pub start_track: u16,
    pub end_track: u16,
}

impl MsaHeader {
    /// Reads and validates the ten header bytes.
    pub fn parse(bytes: &[u8; 10]) -> Result<Self, ImageError> {
        let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        if word(0) != MSA_MAGIC {
            return Err(ImageError::BadImage("wrong identification word"));
        }
        let header = Self {
            sectors_per_track: word(2),
            sides: word(4),
            start_track: word(6),
            end_track: word(8),
        };
        if header.end_track > 86
            || header.start_track > header.end_track
            || header.sectors_per_track > 56
            || header.sides > 1
        {
            return Err(ImageError::BadImage("geometry out of range"));
        }
        Ok(header)
    }

    pub fn track_bytes(&self) -> usize {
        self.sectors_per_track as usize * SECTOR_SIZE
    }

    /// Size of the raw image this decompresses to.
    pub fn raw_size(&self) -> u64 {
        (self.end_track - self.start_track + 1) as u64
            * (self.sides + 1) as u64
            * self.track_bytes() as u64
    }
}

/// Strips a trailing `.msa`, any case.
pub fn remove_msa_extension(name: &str) -> String {
    match name.len().checked_sub(4) {
        Some(cut) if name[cut..].eq_ignore_ascii_case(".msa") => name[..cut].to_string(),
        _ => name.to_string(),
    }
}

/// Expands one compressed track into `out`. The input is consumed byte by
/// byte; a run that would overflow the track is clamped, a block that runs
/// dry before the track is full is an error.
fn expand_track(comp: &[u8], out: &mut [u8]) -> Result<(), ImageError> {
    let mut read = 0usize;
    let mut written = 0usize;
    while written < out.len() {
        let Some(&byte) = comp.get(read) else {
            return Err(ImageError::BadImage("track block ran dry"));
        };
        read += 1;
        if byte != RLE_ESCAPE {
            out[written] = byte;
            written += 1;
            continue;
        }
        if read + 3 > comp.len() {
            return Err(ImageError::BadImage("truncated run"));
        }
        let data = comp[read];
        let run = u16::from_be_bytes([comp[read + 1], comp[read + 2]]) as usize;
        read += 3;
        let run = run.min(out.len() - written);
        out[written..written + run].fill(data);
        written += run;
    }
    Ok(())
}

/// Converts a compressed image to its raw form, track by track.
pub fn msa_to_st<V: Volume>(
    vol: &mut V,
    folder: &str,
    msa_name: &str,
    st_name: &str,
    overwrite: bool,
) -> Result<(), ImageError> {
    if vol.stat(folder).is_err() {
        return Err(ImageError::FolderNotFound);
    }
    let src_path = path_join(folder, msa_name);
    let dest_path = path_join(folder, st_name);
    refuse_existing(vol, &dest_path, overwrite)?;

    let mut src = vol.open(&src_path, OpenMode::READ)?;
    let mut bytes_left = src.size();
    if bytes_left <= 10 {
        return Err(ImageError::BadImage("no data past the header"));
    }

    let mut header_bytes = [0u8; 10];
    src.read_exact(&mut header_bytes)?;
    let header = MsaHeader::parse(&header_bytes)?;
    bytes_left -= 10;
    log::debug!(
        "converting {src_path}: tracks {}..={}, {} sides, {} sectors/track",
        header.start_track,
        header.end_track,
        header.sides + 1,
        header.sectors_per_track
    );

    check_free_space(vol, folder, header.raw_size())?;

    let mut dest = vol.open(&dest_path, OpenMode::WRITE | OpenMode::CREATE_ALWAYS)?;
    let track_bytes = header.track_bytes();
    let mut track_buf = vec![0u8; track_bytes];

    for track in header.start_track..=header.end_track {
        for side in 0..=header.sides {
            if bytes_left < 2 {
                return Err(ImageError::BadImage("missing track length"));
            }
            let mut len_bytes = [0u8; 2];
            src.read_exact(&mut len_bytes)?;
            bytes_left -= 2;
            let block_len = u16::from_be_bytes(len_bytes) as u64;
            if block_len > bytes_left {
                return Err(ImageError::BadImage("track block past end of file"));
            }
            log::trace!("track {track} side {side}: {block_len} byte block");

            if block_len as usize == track_bytes {
                src.read_exact(&mut track_buf)?;
            } else {
                let mut comp = vec![0u8; block_len as usize];
                src.read_exact(&mut comp)?;
                expand_track(&comp, &mut track_buf)?;
            }
            bytes_left -= block_len;
            dest.write_all(&track_buf)?;
        }
    }
    log::debug!("wrote {dest_path}: {} bytes", header.raw_size());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartbridge_storage::MemVolume;
    use pretty_assertions::assert_eq;

    fn header_bytes(spt: u16, sides: u16, start: u16, end: u16) -> Vec<u8> {
        let mut out = Vec::new();
        for word in [MSA_MAGIC, spt, sides, start, end] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }

    fn with_image(bytes: &[u8]) -> MemVolume {
        let mut vol = MemVolume::new();
        vol.mkdir("/f").unwrap();
        vol.put_file("/f/disk.msa", bytes).unwrap();
        vol
    }

    #[test]
    fn uncompressed_single_track_converts_verbatim() {
        let track: Vec<u8> = (0..9 * SECTOR_SIZE).map(|i| (i % 251) as u8).collect();
        let mut msa = header_bytes(9, 0, 0, 0);
        msa.extend_from_slice(&(track.len() as u16).to_be_bytes());
        msa.extend_from_slice(&track);

        let mut vol = with_image(&msa);
        msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false).unwrap();
        let out = vol.file_contents("/f/disk.st").unwrap();
        assert_eq!(out.len(), 9 * SECTOR_SIZE);
        assert_eq!(out, track);
    }

    #[test]
    fn rle_runs_expand() {
        // One 9-sector track: a 7-byte literal prefix, then one run filling
        // the rest of the track with 0xAA.
        let track_bytes = 9 * SECTOR_SIZE;
        let literals = *b"LITERAL";
        let run_len = (track_bytes - literals.len()) as u16;
        let mut block = literals.to_vec();
        block.extend_from_slice(&[RLE_ESCAPE, 0xAA]);
        block.extend_from_slice(&run_len.to_be_bytes());

        let mut msa = header_bytes(9, 0, 0, 0);
        msa.extend_from_slice(&(block.len() as u16).to_be_bytes());
        msa.extend_from_slice(&block);

        let mut vol = with_image(&msa);
        msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false).unwrap();
        let out = vol.file_contents("/f/disk.st").unwrap();
        assert_eq!(out.len(), track_bytes);
        assert_eq!(&out[..7], b"LITERAL");
        assert!(out[7..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn overlong_runs_are_clamped_to_the_track() {
        let track_bytes = 9 * SECTOR_SIZE;
        let mut block = vec![RLE_ESCAPE, 0x55];
        block.extend_from_slice(&u16::MAX.to_be_bytes());

        let mut msa = header_bytes(9, 0, 0, 0);
        msa.extend_from_slice(&(block.len() as u16).to_be_bytes());
        msa.extend_from_slice(&block);

        let mut vol = with_image(&msa);
        msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false).unwrap();
        let out = vol.file_contents("/f/disk.st").unwrap();
        assert_eq!(out.len(), track_bytes);
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn multi_track_double_sided_size_law() {
        // Three tracks, two sides, every track a compressed zero fill.
        let spt = 9u16;
        let mut msa = header_bytes(spt, 1, 0, 2);
        for _ in 0..3 * 2 {
            let mut block = vec![RLE_ESCAPE, 0x00];
            block.extend_from_slice(&(spt as u16 * SECTOR_SIZE as u16).to_be_bytes());
            msa.extend_from_slice(&(block.len() as u16).to_be_bytes());
            msa.extend_from_slice(&block);
        }
        let mut vol = with_image(&msa);
        msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false).unwrap();
        let out = vol.file_contents("/f/disk.st").unwrap();
        assert_eq!(out.len(), 3 * 2 * spt as usize * SECTOR_SIZE);
    }

    #[test]
    fn bad_headers_are_rejected() {
        let cases = [
            {
                let mut h = header_bytes(9, 0, 0, 0);
                h[0] = 0xFF; // wrong magic
                h
            },
            header_bytes(9, 0, 0, 90),  // too many tracks
            header_bytes(9, 0, 5, 2),   // start past end
            header_bytes(60, 0, 0, 0),  // too many sectors
            header_bytes(9, 2, 0, 0),   // too many sides
        ];
        for (i, mut msa) in cases.into_iter().enumerate() {
            msa.extend_from_slice(&[0x12, 0x00]); // some body
            let mut vol = with_image(&msa);
            assert!(
                matches!(
                    msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false),
                    Err(ImageError::BadImage(_))
                ),
                "case {i}"
            );
        }
    }

    #[test]
    fn truncated_bodies_are_rejected() {
        // Header only.
        let mut vol = with_image(&header_bytes(9, 0, 0, 0));
        assert!(matches!(
            msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false),
            Err(ImageError::BadImage(_))
        ));

        // Declared block length runs past the file.
        let mut msa = header_bytes(9, 0, 0, 0);
        msa.extend_from_slice(&4608u16.to_be_bytes());
        msa.extend_from_slice(&[0u8; 100]);
        let mut vol = with_image(&msa);
        assert!(matches!(
            msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false),
            Err(ImageError::BadImage(_))
        ));

        // Compressed block too short to fill its track.
        let mut msa = header_bytes(9, 0, 0, 0);
        msa.extend_from_slice(&3u16.to_be_bytes());
        msa.extend_from_slice(&[1, 2, 3]);
        let mut vol = with_image(&msa);
        assert!(matches!(
            msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false),
            Err(ImageError::BadImage(_))
        ));
    }

    #[test]
    fn conversion_respects_free_space() {
        let mut vol = MemVolume::with_capacity(8 * 1024);
        vol.mkdir("/f").unwrap();
        let mut msa = header_bytes(9, 1, 0, 80);
        msa.extend_from_slice(&[0u8; 64]);
        vol.put_file("/f/disk.msa", &msa).unwrap();
        assert!(matches!(
            msa_to_st(&mut vol, "/f", "disk.msa", "disk.st", false),
            Err(ImageError::DiskFull)
        ));
    }

    #[test]
    fn extension_strip_is_case_insensitive() {
        assert_eq!(remove_msa_extension("GAME.MSA"), "GAME");
        assert_eq!(remove_msa_extension("game.msa"), "game");
        assert_eq!(remove_msa_extension("game.st"), "game.st");
        assert_eq!(remove_msa_extension("msa"), "msa");
    }
}
