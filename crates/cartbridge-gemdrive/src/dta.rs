//! Directory Transfer Area bookkeeping.
//!
//! The target identifies an enumeration session by the address of its DTA
//! buffer; we key a fixed pool of nodes by that 32-bit address through a
//! chained hash table. A node owns the pattern it matches against and the
//! open directory stream, and both go away when the node is released.

use cartbridge_storage::DirStream;

pub const DTA_POOL_SIZE: usize = 32;
const DTA_BUCKETS: usize = 128;

/// xorshift/multiply mix of the key, masked to the bucket count.
fn bucket_of(key: u32) -> usize {
    let mut x = key;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7FEB_352D);
    x ^= x >> 15;
    (x as usize) & (DTA_BUCKETS - 1)
}

/// One enumeration session.
pub struct DtaNode {
    key: u32,
    /// Attribute filter supplied by the search call, all-ones until then.
    pub attribs: u32,
    /// Owned copy of the name pattern.
    pub pattern: Option<String>,
    /// The directory stream the session walks.
    pub stream: Option<Box<dyn DirStream>>,
    next: Option<usize>,
}

impl DtaNode {
    pub fn key(&self) -> u32 {
        self.key
    }
}

/// The pool and its hash index.
pub struct DtaTable {
    buckets: [Option<usize>; DTA_BUCKETS],
    slots: Vec<Option<DtaNode>>,
    free: Vec<usize>,
}

impl Default for DtaTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DtaTable {
    pub fn new() -> Self {
        Self {
            buckets: [None; DTA_BUCKETS],
            slots: (0..DTA_POOL_SIZE).map(|_| None).collect(),
            free: (0..DTA_POOL_SIZE).rev().collect(),
        }
    }

    /// Adds a node for `key`. Fails when the pool is exhausted; the caller
    /// surfaces that to the target.
    pub fn insert(&mut self, key: u32) -> bool {
        let Some(slot) = self.free.pop() else {
            log::warn!("DTA pool exhausted, cannot track {key:#010x}");
            return false;
        };
        let bucket = bucket_of(key);
        self.slots[slot] = Some(DtaNode {
            key,
            attribs: 0xFFFF_FFFF,
            pattern: None,
            stream: None,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(slot);
        log::trace!("DTA {key:#010x} tracked in slot {slot}");
        true
    }

    fn slot_of(&self, key: u32) -> Option<usize> {
        let mut cursor = self.buckets[bucket_of(key)];
        while let Some(slot) = cursor {
            let node = self.slots[slot].as_ref()?;
            if node.key == key {
                return Some(slot);
            }
            cursor = node.next;
        }
        None
    }

    pub fn contains(&self, key: u32) -> bool {
        self.slot_of(key).is_some()
    }

    pub fn lookup(&mut self, key: u32) -> Option<&mut DtaNode> {
        let slot = self.slot_of(key)?;
        self.slots[slot].as_mut()
    }

    /// Unlinks the node and drops its pattern and stream.
    pub fn release(&mut self, key: u32) {
        let bucket = bucket_of(key);
        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(slot) = cursor {
            let next = self.slots[slot].as_ref().and_then(|n| n.next);
            if self.slots[slot].as_ref().is_some_and(|n| n.key == key) {
                match prev {
                    Some(p) => {
                        if let Some(node) = self.slots[p].as_mut() {
                            node.next = next;
                        }
                    }
                    None => self.buckets[bucket] = next,
                }
                self.slots[slot] = None;
                self.free.push(slot);
                return;
            }
            prev = Some(slot);
            cursor = next;
        }
    }

    pub fn clear(&mut self) {
        self.buckets = [None; DTA_BUCKETS];
        self.free = (0..DTA_POOL_SIZE).rev().collect();
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
