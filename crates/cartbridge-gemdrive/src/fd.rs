//! Open-file bookkeeping.
//!
//! Descriptors are issued from a base far above the handle range the
//! target's own system uses, so the two never collide. The lowest unused
//! number is reissued after a close, which some target programs rely on.

use cartbridge_storage::FileHandle;

/// First descriptor the responder hands out.
pub const FIRST_FILE_DESCRIPTOR: u16 = 16384;

pub struct FdEntry {
    pub path: String,
    pub fd: u16,
    /// Logical seek position, applied lazily before each read or write.
    pub offset: u64,
    pub writable: bool,
    pub handle: Box<dyn FileHandle>,
}

#[derive(Default)]
pub struct FdTable {
    entries: Vec<FdEntry>,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest unused descriptor at or above the base.
    pub fn first_available_fd(&self) -> u16 {
        let mut candidate = FIRST_FILE_DESCRIPTOR;
        while self.entries.iter().any(|e| e.fd == candidate) {
            candidate += 1;
        }
        candidate
    }

    /// Registers an open file and returns its new descriptor.
    pub fn add(&mut self, path: String, handle: Box<dyn FileHandle>, writable: bool) -> u16 {
        let fd = self.first_available_fd();
        log::debug!("file {path} tracked as descriptor {fd}");
        self.entries.push(FdEntry {
            path,
            fd,
            offset: 0,
            writable,
            handle,
        });
        fd
    }

    pub fn find_by_fd(&mut self, fd: u16) -> Option<&mut FdEntry> {
        self.entries.iter_mut().find(|e| e.fd == fd)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&FdEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Drops the entry, closing the underlying handle.
    pub fn remove(&mut self, fd: u16) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.fd != fd);
        self.entries.len() != before
    }

    /// Closes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartbridge_storage::{MemVolume, OpenMode, Volume};

    fn open_handle(vol: &mut MemVolume, path: &str) -> Box<dyn FileHandle> {
        vol.open(path, OpenMode::CREATE_ALWAYS).unwrap()
    }

    #[test]
    fn descriptors_start_at_the_base_and_fill_gaps() {
        let mut vol = MemVolume::new();
        let mut table = FdTable::new();
        let a = table.add("/a".into(), open_handle(&mut vol, "/a"), true);
        let b = table.add("/b".into(), open_handle(&mut vol, "/b"), true);
        let c = table.add("/c".into(), open_handle(&mut vol, "/c"), true);
        assert_eq!(a, FIRST_FILE_DESCRIPTOR);
        assert_eq!(b, FIRST_FILE_DESCRIPTOR + 1);
        assert_eq!(c, FIRST_FILE_DESCRIPTOR + 2);

        assert!(table.remove(b));
        let again = table.add("/d".into(), open_handle(&mut vol, "/d"), true);
        assert_eq!(again, b);
    }

    #[test]
    fn lookups_by_fd_and_path() {
        let mut vol = MemVolume::new();
        let mut table = FdTable::new();
        let fd = table.add("/x".into(), open_handle(&mut vol, "/x"), false);
        assert_eq!(table.find_by_fd(fd).unwrap().path, "/x");
        assert_eq!(table.find_by_path("/x").unwrap().fd, fd);
        assert!(table.find_by_fd(fd + 1).is_none());
        assert!(table.find_by_path("/y").is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut vol = MemVolume::new();
        let mut table = FdTable::new();
        let fd = table.add("/x".into(), open_handle(&mut vol, "/x"), true);
        assert!(table.remove(fd));
        assert!(!table.remove(fd));
        assert!(table.is_empty());
    }
}
