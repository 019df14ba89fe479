//! Virtual floppy drives.
//!
//! Two drives, each backed by a raw sector image file on the storage
//! volume. The target's disk routines are redirected at the cartridge and
//! arrive here as sector read/write commands; the geometry the target needs
//! is synthesized from the image's boot sector into a BIOS Parameter Block
//! in shared memory at mount time.
//!
//! The crate also carries the image toolbox: a blank-image formatter and
//! the decompressor for the track-compressed interchange format.

pub mod bpb;
mod engine;
pub mod image;
pub mod layout;
pub mod msa;

pub use bpb::BpbData;
pub use engine::{DriveState, FloppyConfig, FloppyEmulator};
pub use image::{ImageError, copy_file, create_st_image};
pub use msa::{MsaHeader, msa_to_st, remove_msa_extension};

use cartbridge_proto::{APP_FLOPPY, command_id};

/// Sector size every supported image uses.
pub const SECTOR_SIZE: usize = 512;

/// Joins a folder and a file name with exactly one separator.
pub(crate) fn path_join(folder: &str, name: &str) -> String {
    format!(
        "{}/{}",
        folder.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Operation codes of the floppy engine, tag `0x02`.
pub mod cmd {
    use super::*;

    pub const SAVE_VECTORS: u16 = command_id(APP_FLOPPY, 0x00);
    pub const READ_SECTORS: u16 = command_id(APP_FLOPPY, 0x01);
    pub const WRITE_SECTORS: u16 = command_id(APP_FLOPPY, 0x02);
    pub const PING: u16 = command_id(APP_FLOPPY, 0x03);
    pub const SAVE_HARDWARE: u16 = command_id(APP_FLOPPY, 0x04);
    pub const SET_SHARED_VAR: u16 = command_id(APP_FLOPPY, 0x05);
    pub const RESET: u16 = command_id(APP_FLOPPY, 0x06);
    pub const SAVE_BIOS_VECTOR: u16 = command_id(APP_FLOPPY, 0x07);
    pub const SHOW_VECTOR_CALL: u16 = command_id(APP_FLOPPY, 0x0B);
    pub const DEBUG: u16 = command_id(APP_FLOPPY, 0x0C);
}
