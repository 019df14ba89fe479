//! Shared-memory layout of the responder.
//!
//! Each trap has a fixed slot the target polls for its result; the offsets
//! are running sums so a size change in one field moves everything after it.

use cartbridge_shm::RANDOM_TOKEN_OFFSET;

/// Longest path the target may hand us, including the terminator.
pub const MAX_FOLDER_LENGTH: usize = 128;
/// One read round through the shared window.
pub const READ_BUFFER_SIZE: usize = 4096;
/// One write round through the transfer payload.
pub const WRITE_BUFFER_SIZE: usize = 1024;
/// Size of the enumeration record as the target lays it out.
pub const DTA_TRANSFER_SIZE: usize = 44;
pub const EXEC_HEADER_SIZE: usize = 32;
pub const BASEPAGE_SIZE: usize = 0x100;

/// Responder variables start one page past the random token.
pub const VARIABLES_OFFSET: usize = RANDOM_TOKEN_OFFSET + 0x100;

pub const REENTRY_FLAG: usize = VARIABLES_OFFSET;
pub const OLD_XBIOS_TRAP: usize = REENTRY_FLAG + 4;
pub const DEFAULT_PATH: usize = OLD_XBIOS_TRAP + 4;
pub const DTA_FOUND: usize = DEFAULT_PATH + MAX_FOLDER_LENGTH;
pub const DTA_TRANSFER: usize = DTA_FOUND + 4;
pub const DTA_EXIST: usize = DTA_TRANSFER + DTA_TRANSFER_SIZE;
pub const DTA_RELEASE: usize = DTA_EXIST + 4;
pub const DSETPATH_STATUS: usize = DTA_RELEASE + 4;
pub const FOPEN_HANDLE: usize = DSETPATH_STATUS + 4;
pub const READ_BYTES: usize = FOPEN_HANDLE + 4;
pub const READ_BUFFER: usize = READ_BYTES + 4;
pub const WRITE_BYTES: usize = READ_BUFFER + READ_BUFFER_SIZE;
pub const WRITE_CHECK: usize = WRITE_BYTES + 4;
pub const WRITE_CONFIRM_STATUS: usize = WRITE_CHECK + 4;
pub const FCLOSE_STATUS: usize = WRITE_CONFIRM_STATUS + 4;
pub const DCREATE_STATUS: usize = FCLOSE_STATUS + 4;
pub const DDELETE_STATUS: usize = DCREATE_STATUS + 4;
pub const EXEC_HEADER: usize = DDELETE_STATUS + 4;
pub const FCREATE_HANDLE: usize = EXEC_HEADER + EXEC_HEADER_SIZE;
pub const FDELETE_STATUS: usize = FCREATE_HANDLE + 4;
pub const FSEEK_STATUS: usize = FDELETE_STATUS + 4;
pub const FATTRIB_STATUS: usize = FSEEK_STATUS + 4;
pub const FRENAME_STATUS: usize = FATTRIB_STATUS + 4;
pub const FDATETIME_DATE: usize = FRENAME_STATUS + 4;
pub const FDATETIME_TIME: usize = FDATETIME_DATE + 4;
pub const FDATETIME_STATUS: usize = FDATETIME_TIME + 4;
pub const DFREE_STATUS: usize = FDATETIME_STATUS + 4;
pub const DFREE_STRUCT: usize = DFREE_STATUS + 4;
pub const PEXEC_MODE: usize = DFREE_STRUCT + 32;
pub const PEXEC_STACK_ADDR: usize = PEXEC_MODE + 4;
pub const PEXEC_FNAME: usize = PEXEC_STACK_ADDR + 4;
pub const PEXEC_CMDLINE: usize = PEXEC_FNAME + 4;
pub const PEXEC_ENVSTR: usize = PEXEC_CMDLINE + 4;
pub const EXEC_BASEPAGE: usize = PEXEC_ENVSTR + 4;

/// Shared-variable indices. The first sixteen are reserved for functions
/// shared with other subsystems.
pub const SVAR_SHARED_FUNCTIONS: usize = 16;
pub const SVAR_FIRST_FILE_DESCRIPTOR: usize = SVAR_SHARED_FUNCTIONS;
pub const SVAR_DRIVE_LETTER: usize = SVAR_SHARED_FUNCTIONS + 1;
pub const SVAR_DRIVE_NUMBER: usize = SVAR_SHARED_FUNCTIONS + 2;
pub const SVAR_PEXEC_RESTORE: usize = SVAR_SHARED_FUNCTIONS + 3;
pub const SVAR_FAKE_FLOPPY: usize = SVAR_SHARED_FUNCTIONS + 4;
pub const SVAR_ENABLED: usize = SVAR_SHARED_FUNCTIONS + 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_contiguous_and_in_window() {
        assert_eq!(DTA_FOUND, VARIABLES_OFFSET + 8 + MAX_FOLDER_LENGTH);
        assert!(READ_BUFFER > DTA_TRANSFER);
        assert!(EXEC_BASEPAGE + BASEPAGE_SIZE <= cartbridge_shm::WINDOW_SIZE);
    }
}
