//! The storage contract between the emulators and whatever medium backs them.
//!
//! On the device the medium is a FAT volume on a microSD card driven by an
//! external library; this crate pins down the slice of that library's surface
//! the emulators actually consume, as traits. Two implementations ship with
//! it: [`MemVolume`], an in-memory tree with a capacity quota that the test
//! suites run against, and [`HostVolume`], a thin mapping onto `std::fs` used
//! by the image tools.

mod host;
mod mem;
mod time;
mod volume;

pub use host::HostVolume;
pub use mem::MemVolume;
pub use time::DosDateTime;
pub use volume::{
    DirStream, FileAttributes, FileHandle, FileInfo, FreeSpace, OpenMode, Volume,
};

/// Failures the storage layer can report, mirroring the result codes of the
/// block-storage library the device firmware links against. Every handler
/// maps these once, at its boundary, into the target's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The final path component does not exist.
    #[error("file not found")]
    NotFound,
    /// An interior path component does not exist or is not a directory.
    #[error("path not found")]
    PathNotFound,
    /// The operation is forbidden: read-only object, non-empty directory,
    /// write through a read-only handle, or an exhausted quota.
    #[error("access denied")]
    Denied,
    /// The destination already exists.
    #[error("already exists")]
    Exists,
    /// The handle does not refer to a live object.
    #[error("invalid handle")]
    InvalidHandle,
    /// The supplied name cannot name an object (empty, for instance).
    #[error("invalid name")]
    InvalidName,
    /// Anything the layers below failed with.
    #[error("i/o failure: {0:?}")]
    Io(std::io::ErrorKind),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => MediaError::NotFound,
            ErrorKind::PermissionDenied => MediaError::Denied,
            ErrorKind::AlreadyExists => MediaError::Exists,
            ErrorKind::DirectoryNotEmpty => MediaError::Denied,
            kind => MediaError::Io(kind),
        }
    }
}
