use crate::time::DosDateTime;
use crate::MediaResult;

bitflags::bitflags! {
    /// File attributes, FAT bit positions.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_LABEL = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

bitflags::bitflags! {
    /// Open disposition for [`Volume::open`].
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenMode: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        /// Create the file, truncating an existing one.
        const CREATE_ALWAYS = 0x08;
    }
}

/// Directory-entry metadata, the shape of a `stat` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    /// 8.3 alternate name where the backend tracks one; empty otherwise,
    /// in which case consumers derive their own short form from `name`.
    pub alt_name: String,
    pub size: u64,
    pub attributes: FileAttributes,
    pub stamp: DosDateTime,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// Free-space report for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    pub free_clusters: u32,
    pub total_clusters: u32,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
}

impl FreeSpace {
    pub fn free_bytes(&self) -> u64 {
        self.free_clusters as u64 * self.sectors_per_cluster as u64 * self.bytes_per_sector as u64
    }
}

/// An open file. Explicit-seek model: position once, then read or write.
pub trait FileHandle: std::fmt::Debug {
    fn read(&mut self, buf: &mut [u8]) -> MediaResult<usize>;
    fn write(&mut self, buf: &[u8]) -> MediaResult<usize>;
    fn seek(&mut self, pos: u64) -> MediaResult<()>;
    fn size(&self) -> u64;

    fn read_exact(&mut self, buf: &mut [u8]) -> MediaResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(crate::MediaError::Io(std::io::ErrorKind::UnexpectedEof));
            }
            filled += n;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> MediaResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(crate::MediaError::Io(std::io::ErrorKind::WriteZero));
            }
            written += n;
        }
        Ok(())
    }
}

/// An open directory enumeration. Yields entries until exhausted; dot
/// entries are never produced.
pub trait DirStream {
    fn next_entry(&mut self) -> MediaResult<Option<FileInfo>>;
}

/// The slice of the block-storage library the emulators consume.
///
/// Paths are absolute within the volume, `/`-separated, and matched
/// case-insensitively like the FAT volume the device really serves.
pub trait Volume {
    fn open(&mut self, path: &str, mode: OpenMode) -> MediaResult<Box<dyn FileHandle>>;
    fn stat(&mut self, path: &str) -> MediaResult<FileInfo>;
    fn mkdir(&mut self, path: &str) -> MediaResult<()>;
    /// Removes a file or an empty directory.
    fn remove(&mut self, path: &str) -> MediaResult<()>;
    fn rename(&mut self, from: &str, to: &str) -> MediaResult<()>;
    /// Applies `attrs` restricted to `mask`, leaving other bits untouched.
    fn set_attributes(
        &mut self,
        path: &str,
        attrs: FileAttributes,
        mask: FileAttributes,
    ) -> MediaResult<()>;
    fn set_times(&mut self, path: &str, stamp: DosDateTime) -> MediaResult<()>;
    fn open_dir(&mut self, path: &str) -> MediaResult<Box<dyn DirStream>>;
    fn free_space(&mut self, path: &str) -> MediaResult<FreeSpace>;
}
