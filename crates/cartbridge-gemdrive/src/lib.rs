//! GEMDOS hard-disk responder.
//!
//! The target's operating system routes its file-system traps through the
//! cartridge; this crate services them against a directory tree on the
//! storage volume, so an unmodified system sees an ordinary hard drive. The
//! responder is a state machine over three tables — the directory-enumeration
//! (DTA) pool, the open-file table, and the cached default path — plus the
//! shared-memory slots each trap's result lands in.

pub mod attr;
pub mod calls;
pub mod dta;
pub mod fd;
pub mod glob;
pub mod layout;
pub mod path;
mod responder;
pub mod status;

pub use responder::{GemDrive, GemDriveConfig};
pub use status::GemdosError;

use cartbridge_proto::{APP_GEMDRIVE, command_id};

/// Operation codes of the file-system responder, tag `0x04`.
pub mod cmd {
    use super::*;

    pub const RESET: u16 = command_id(APP_GEMDRIVE, 0x00);
    pub const SAVE_VECTORS: u16 = command_id(APP_GEMDRIVE, 0x01);
    pub const SHOW_VECTOR_CALL: u16 = command_id(APP_GEMDRIVE, 0x02);
    pub const REENTRY_LOCK: u16 = command_id(APP_GEMDRIVE, 0x03);
    pub const REENTRY_UNLOCK: u16 = command_id(APP_GEMDRIVE, 0x04);
    pub const SAVE_XBIOS_VECTOR: u16 = command_id(APP_GEMDRIVE, 0x0A);
    pub const DGETDRV: u16 = command_id(APP_GEMDRIVE, 0x19);
    pub const FSETDTA: u16 = command_id(APP_GEMDRIVE, 0x1A);
    pub const DFREE: u16 = command_id(APP_GEMDRIVE, 0x36);
    pub const DCREATE: u16 = command_id(APP_GEMDRIVE, 0x39);
    pub const DDELETE: u16 = command_id(APP_GEMDRIVE, 0x3A);
    pub const DSETPATH: u16 = command_id(APP_GEMDRIVE, 0x3B);
    pub const FCREATE: u16 = command_id(APP_GEMDRIVE, 0x3C);
    pub const FOPEN: u16 = command_id(APP_GEMDRIVE, 0x3D);
    pub const FCLOSE: u16 = command_id(APP_GEMDRIVE, 0x3E);
    pub const FDELETE: u16 = command_id(APP_GEMDRIVE, 0x41);
    pub const FSEEK: u16 = command_id(APP_GEMDRIVE, 0x42);
    pub const FATTRIB: u16 = command_id(APP_GEMDRIVE, 0x43);
    pub const DGETPATH: u16 = command_id(APP_GEMDRIVE, 0x47);
    pub const PEXEC: u16 = command_id(APP_GEMDRIVE, 0x4B);
    pub const FSFIRST: u16 = command_id(APP_GEMDRIVE, 0x4E);
    pub const FSNEXT: u16 = command_id(APP_GEMDRIVE, 0x4F);
    pub const FRENAME: u16 = command_id(APP_GEMDRIVE, 0x56);
    pub const FDATETIME: u16 = command_id(APP_GEMDRIVE, 0x57);
    pub const READ_BUFFER: u16 = command_id(APP_GEMDRIVE, 0x81);
    pub const DEBUG: u16 = command_id(APP_GEMDRIVE, 0x82);
    pub const SAVE_BASEPAGE: u16 = command_id(APP_GEMDRIVE, 0x83);
    pub const SAVE_EXEC_HEADER: u16 = command_id(APP_GEMDRIVE, 0x84);
    pub const SET_SHARED_VAR: u16 = command_id(APP_GEMDRIVE, 0x87);
    pub const WRITE_BUFFER: u16 = command_id(APP_GEMDRIVE, 0x88);
    pub const WRITE_BUFFER_CHECK: u16 = command_id(APP_GEMDRIVE, 0x89);
    pub const DTA_EXIST: u16 = command_id(APP_GEMDRIVE, 0x8A);
    pub const DTA_RELEASE: u16 = command_id(APP_GEMDRIVE, 0x8B);
}
