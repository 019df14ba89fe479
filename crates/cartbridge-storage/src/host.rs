use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::time::DosDateTime;
use crate::volume::{
    DirStream, FileAttributes, FileHandle, FileInfo, FreeSpace, OpenMode, Volume,
};
use crate::{MediaError, MediaResult};

/// A volume mapped onto a directory of the host filesystem.
///
/// This is what the image tools run against. Two deliberate simplifications,
/// both irrelevant to the sector-level tools: only the read-only attribute
/// survives a round trip (the host has no hidden/system bits), and
/// `free_space` reports an effectively unlimited card rather than querying
/// the OS.
pub struct HostVolume {
    root: PathBuf,
}

impl HostVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let rel: PathBuf = path
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect();
        self.root.join(rel)
    }
}

fn info_from_metadata(path: &Path, meta: &fs::Metadata) -> FileInfo {
    let mut attributes = FileAttributes::empty();
    if meta.is_dir() {
        attributes |= FileAttributes::DIRECTORY;
    } else {
        attributes |= FileAttributes::ARCHIVE;
    }
    if meta.permissions().readonly() {
        attributes |= FileAttributes::READ_ONLY;
    }
    let stamp = meta
        .modified()
        .ok()
        .map(|t| DosDateTime::from(DateTime::<Local>::from(t).naive_local()))
        .unwrap_or_default();
    FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string()),
        alt_name: String::new(),
        size: meta.len(),
        attributes,
        stamp,
    }
}

#[derive(Debug)]
struct HostFile {
    file: fs::File,
    size: u64,
}

impl FileHandle for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> MediaResult<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> MediaResult<usize> {
        let n = self.file.write(buf)?;
        self.size = self.size.max(self.file.stream_position()?);
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> MediaResult<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

struct HostDirStream {
    entries: std::vec::IntoIter<FileInfo>,
}

impl DirStream for HostDirStream {
    fn next_entry(&mut self) -> MediaResult<Option<FileInfo>> {
        Ok(self.entries.next())
    }
}

impl Volume for HostVolume {
    fn open(&mut self, path: &str, mode: OpenMode) -> MediaResult<Box<dyn FileHandle>> {
        let full = self.resolve(path);
        let mut options = fs::OpenOptions::new();
        options.read(mode.contains(OpenMode::READ));
        options.write(mode.intersects(OpenMode::WRITE | OpenMode::CREATE_ALWAYS));
        if mode.contains(OpenMode::CREATE_ALWAYS) {
            options.create(true).truncate(true);
        }
        let file = options.open(&full)?;
        let size = file.metadata()?.len();
        Ok(Box::new(HostFile { file, size }))
    }

    fn stat(&mut self, path: &str) -> MediaResult<FileInfo> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)?;
        Ok(info_from_metadata(&full, &meta))
    }

    fn mkdir(&mut self, path: &str) -> MediaResult<()> {
        Ok(fs::create_dir(self.resolve(path))?)
    }

    fn remove(&mut self, path: &str) -> MediaResult<()> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)?;
        if meta.is_dir() {
            fs::remove_dir(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> MediaResult<()> {
        let dst = self.resolve(to);
        if dst.exists() {
            return Err(MediaError::Exists);
        }
        Ok(fs::rename(self.resolve(from), dst)?)
    }

    fn set_attributes(
        &mut self,
        path: &str,
        attrs: FileAttributes,
        mask: FileAttributes,
    ) -> MediaResult<()> {
        let full = self.resolve(path);
        if mask.contains(FileAttributes::READ_ONLY) {
            let meta = fs::metadata(&full)?;
            let mut perms = meta.permissions();
            perms.set_readonly(attrs.contains(FileAttributes::READ_ONLY));
            fs::set_permissions(&full, perms)?;
        }
        Ok(())
    }

    fn set_times(&mut self, path: &str, stamp: DosDateTime) -> MediaResult<()> {
        // No portable std API; accepted and recorded in the log only.
        log::debug!("set_times({path}) -> {stamp:?} ignored on host volume");
        fs::metadata(self.resolve(path))?;
        Ok(())
    }

    fn open_dir(&mut self, path: &str) -> MediaResult<Box<dyn DirStream>> {
        let full = self.resolve(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::PathNotFound,
            _ => MediaError::from(e),
        })? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(info_from_metadata(&entry.path(), &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::new(HostDirStream {
            entries: entries.into_iter(),
        }))
    }

    fn free_space(&mut self, _path: &str) -> MediaResult<FreeSpace> {
        Ok(FreeSpace {
            free_clusters: u32::MAX >> 1,
            total_clusters: u32::MAX >> 1,
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
        })
    }
}
