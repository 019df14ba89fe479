use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::time::DosDateTime;
use crate::volume::{
    DirStream, FileAttributes, FileHandle, FileInfo, FreeSpace, OpenMode, Volume,
};
use crate::{MediaError, MediaResult};

const BYTES_PER_SECTOR: u32 = 512;
const SECTORS_PER_CLUSTER: u32 = 2;
const CLUSTER_BYTES: u64 = (BYTES_PER_SECTOR * SECTORS_PER_CLUSTER) as u64;

#[derive(Debug)]
struct FileNode {
    data: Vec<u8>,
    attrs: FileAttributes,
    stamp: DosDateTime,
}

enum MemNode {
    Dir(BTreeMap<String, MemNode>),
    File(Rc<RefCell<FileNode>>),
}

/// An in-memory volume with FAT-ish semantics: case-insensitive names, a
/// cluster-granular free-space report, read-only attributes honoured on
/// writes and deletes. The integration suites run against it; the capacity
/// quota only shows through [`Volume::free_space`], the way a nearly full
/// card would.
pub struct MemVolume {
    root: BTreeMap<String, MemNode>,
    capacity: u64,
}

impl Default for MemVolume {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

fn lookup_key(map: &BTreeMap<String, MemNode>, name: &str) -> Option<String> {
    map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

/// Walks to the directory holding the final component. A missing or
/// non-directory interior component is `PathNotFound`.
fn dir_of<'a>(
    mut map: &'a BTreeMap<String, MemNode>,
    dirs: &[&str],
) -> MediaResult<&'a BTreeMap<String, MemNode>> {
    for seg in dirs {
        let key = lookup_key(map, seg).ok_or(MediaError::PathNotFound)?;
        match map.get(&key) {
            Some(MemNode::Dir(next)) => map = next,
            _ => return Err(MediaError::PathNotFound),
        }
    }
    Ok(map)
}

fn dir_of_mut<'a>(
    mut map: &'a mut BTreeMap<String, MemNode>,
    dirs: &[&str],
) -> MediaResult<&'a mut BTreeMap<String, MemNode>> {
    for seg in dirs {
        let key = lookup_key(map, seg).ok_or(MediaError::PathNotFound)?;
        match map.get_mut(&key) {
            Some(MemNode::Dir(next)) => map = next,
            _ => return Err(MediaError::PathNotFound),
        }
    }
    Ok(map)
}

fn file_info(name: &str, node: &MemNode) -> FileInfo {
    match node {
        MemNode::Dir(_) => FileInfo {
            name: name.to_string(),
            alt_name: String::new(),
            size: 0,
            attributes: FileAttributes::DIRECTORY,
            stamp: DosDateTime::default(),
        },
        MemNode::File(f) => {
            let f = f.borrow();
            FileInfo {
                name: name.to_string(),
                alt_name: String::new(),
                size: f.data.len() as u64,
                attributes: f.attrs,
                stamp: f.stamp,
            }
        }
    }
}

impl MemVolume {
    pub fn new() -> Self {
        Self::with_capacity(16 * 1024 * 1024)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            root: BTreeMap::new(),
            capacity,
        }
    }

    /// Creates a file with the given contents, making parent directories as
    /// needed. Seeding convenience for tests and tools.
    pub fn put_file(&mut self, path: &str, data: &[u8]) -> MediaResult<()> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let mut map = &mut self.root;
        for seg in dirs {
            let key = lookup_key(map, seg).unwrap_or_else(|| {
                map.insert(seg.to_string(), MemNode::Dir(BTreeMap::new()));
                seg.to_string()
            });
            match map.get_mut(&key) {
                Some(MemNode::Dir(next)) => map = next,
                _ => return Err(MediaError::PathNotFound),
            }
        }
        let key = lookup_key(map, leaf).unwrap_or_else(|| leaf.to_string());
        map.insert(
            key,
            MemNode::File(Rc::new(RefCell::new(FileNode {
                data: data.to_vec(),
                attrs: FileAttributes::ARCHIVE,
                stamp: DosDateTime::default(),
            }))),
        );
        Ok(())
    }

    /// Reads a whole file back out. Test convenience.
    pub fn file_contents(&self, path: &str) -> MediaResult<Vec<u8>> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of(&self.root, dirs)?;
        let key = lookup_key(map, leaf).ok_or(MediaError::NotFound)?;
        match map.get(&key) {
            Some(MemNode::File(f)) => Ok(f.borrow().data.clone()),
            _ => Err(MediaError::NotFound),
        }
    }

    fn used_bytes(map: &BTreeMap<String, MemNode>) -> u64 {
        map.values()
            .map(|n| match n {
                MemNode::Dir(d) => Self::used_bytes(d),
                MemNode::File(f) => f.borrow().data.len().div_ceil(CLUSTER_BYTES as usize) as u64
                    * CLUSTER_BYTES,
            })
            .sum()
    }
}

#[derive(Debug)]
struct MemFile {
    node: Rc<RefCell<FileNode>>,
    pos: u64,
    writable: bool,
}

impl FileHandle for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> MediaResult<usize> {
        let node = self.node.borrow();
        let pos = (self.pos as usize).min(node.data.len());
        let n = buf.len().min(node.data.len() - pos);
        buf[..n].copy_from_slice(&node.data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> MediaResult<usize> {
        if !self.writable {
            return Err(MediaError::Denied);
        }
        let mut node = self.node.borrow_mut();
        let pos = self.pos as usize;
        if node.data.len() < pos {
            node.data.resize(pos, 0);
        }
        let end = pos + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[pos..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: u64) -> MediaResult<()> {
        self.pos = pos;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.node.borrow().data.len() as u64
    }
}

struct MemDirStream {
    entries: std::vec::IntoIter<FileInfo>,
}

impl DirStream for MemDirStream {
    fn next_entry(&mut self) -> MediaResult<Option<FileInfo>> {
        Ok(self.entries.next())
    }
}

impl Volume for MemVolume {
    fn open(&mut self, path: &str, mode: OpenMode) -> MediaResult<Box<dyn FileHandle>> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of_mut(&mut self.root, dirs)?;
        let key = lookup_key(map, leaf);
        let node = match key.as_deref().and_then(|k| map.get(k)) {
            Some(MemNode::Dir(_)) => return Err(MediaError::Denied),
            Some(MemNode::File(f)) => {
                let locked = f.borrow().attrs.contains(FileAttributes::READ_ONLY);
                if locked && mode.intersects(OpenMode::WRITE | OpenMode::CREATE_ALWAYS) {
                    return Err(MediaError::Denied);
                }
                if mode.contains(OpenMode::CREATE_ALWAYS) {
                    let mut node = f.borrow_mut();
                    node.data.clear();
                    node.stamp = DosDateTime::now();
                }
                f.clone()
            }
            None => {
                if !mode.contains(OpenMode::CREATE_ALWAYS) {
                    return Err(MediaError::NotFound);
                }
                let node = Rc::new(RefCell::new(FileNode {
                    data: Vec::new(),
                    attrs: FileAttributes::ARCHIVE,
                    stamp: DosDateTime::now(),
                }));
                map.insert(leaf.to_string(), MemNode::File(node.clone()));
                node
            }
        };
        Ok(Box::new(MemFile {
            node,
            pos: 0,
            writable: mode.intersects(OpenMode::WRITE | OpenMode::CREATE_ALWAYS),
        }))
    }

    fn stat(&mut self, path: &str) -> MediaResult<FileInfo> {
        let segs = segments(path);
        let Some((leaf, dirs)) = segs.split_last() else {
            // The volume root always exists.
            return Ok(FileInfo {
                name: "/".to_string(),
                alt_name: String::new(),
                size: 0,
                attributes: FileAttributes::DIRECTORY,
                stamp: DosDateTime::default(),
            });
        };
        let map = dir_of(&self.root, dirs)?;
        let key = lookup_key(map, leaf).ok_or(MediaError::NotFound)?;
        Ok(file_info(&key, &map[&key]))
    }

    fn mkdir(&mut self, path: &str) -> MediaResult<()> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of_mut(&mut self.root, dirs)?;
        if lookup_key(map, leaf).is_some() {
            return Err(MediaError::Exists);
        }
        map.insert(leaf.to_string(), MemNode::Dir(BTreeMap::new()));
        Ok(())
    }

    fn remove(&mut self, path: &str) -> MediaResult<()> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of_mut(&mut self.root, dirs)?;
        let key = lookup_key(map, leaf).ok_or(MediaError::NotFound)?;
        match &map[&key] {
            MemNode::Dir(children) if !children.is_empty() => return Err(MediaError::Denied),
            MemNode::File(f) if f.borrow().attrs.contains(FileAttributes::READ_ONLY) => {
                return Err(MediaError::Denied);
            }
            _ => {}
        }
        map.remove(&key);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> MediaResult<()> {
        let from_segs = segments(from);
        let (from_leaf, from_dirs) = from_segs.split_last().ok_or(MediaError::InvalidName)?;
        let to_segs = segments(to);
        let (to_leaf, to_dirs) = to_segs.split_last().ok_or(MediaError::InvalidName)?;

        // Validate both ends before mutating anything.
        let src_map = dir_of(&self.root, from_dirs)?;
        let src_key = lookup_key(src_map, from_leaf).ok_or(MediaError::NotFound)?;
        let dst_map = dir_of(&self.root, to_dirs)?;
        if lookup_key(dst_map, to_leaf).is_some() {
            return Err(MediaError::Exists);
        }

        let node = dir_of_mut(&mut self.root, from_dirs)?
            .remove(&src_key)
            .ok_or(MediaError::NotFound)?;
        dir_of_mut(&mut self.root, to_dirs)?.insert(to_leaf.to_string(), node);
        Ok(())
    }

    fn set_attributes(
        &mut self,
        path: &str,
        attrs: FileAttributes,
        mask: FileAttributes,
    ) -> MediaResult<()> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of_mut(&mut self.root, dirs)?;
        let key = lookup_key(map, leaf).ok_or(MediaError::NotFound)?;
        if let Some(MemNode::File(f)) = map.get(&key) {
            let mut node = f.borrow_mut();
            node.attrs = (attrs & mask) | (node.attrs & !mask);
        }
        Ok(())
    }

    fn set_times(&mut self, path: &str, stamp: DosDateTime) -> MediaResult<()> {
        let segs = segments(path);
        let (leaf, dirs) = segs.split_last().ok_or(MediaError::InvalidName)?;
        let map = dir_of_mut(&mut self.root, dirs)?;
        let key = lookup_key(map, leaf).ok_or(MediaError::NotFound)?;
        if let Some(MemNode::File(f)) = map.get(&key) {
            f.borrow_mut().stamp = stamp;
        }
        Ok(())
    }

    fn open_dir(&mut self, path: &str) -> MediaResult<Box<dyn DirStream>> {
        let segs = segments(path);
        let map = dir_of(&self.root, &segs)?;
        let entries: Vec<FileInfo> = map.iter().map(|(k, v)| file_info(k, v)).collect();
        Ok(Box::new(MemDirStream {
            entries: entries.into_iter(),
        }))
    }

    fn free_space(&mut self, _path: &str) -> MediaResult<FreeSpace> {
        let used = Self::used_bytes(&self.root);
        let total = self.capacity / CLUSTER_BYTES;
        let free = self.capacity.saturating_sub(used) / CLUSTER_BYTES;
        Ok(FreeSpace {
            free_clusters: free.min(u32::MAX as u64) as u32,
            total_clusters: total.min(u32::MAX as u64) as u32,
            bytes_per_sector: BYTES_PER_SECTOR,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
        })
    }
}
