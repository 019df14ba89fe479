use crate::SECTOR_SIZE;

/// Size of the record as copied into shared memory.
pub const BPB_BYTES: usize = core::mem::size_of::<BpbData>();

/// BIOS Parameter Block: the volume geometry the target's disk routines
/// consult, synthesized from the image's boot sector. Copied into its
/// shared-memory slot verbatim, so the layout is fixed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BpbData {
    /// Sector size in bytes.
    pub record_size: u16,
    /// Cluster size in sectors.
    pub cluster_size: u16,
    /// Cluster size in bytes.
    pub cluster_bytes: u16,
    /// Root directory length in sectors.
    pub root_dir_len: u16,
    /// FAT size in sectors.
    pub fat_size: u16,
    /// Sector number of the second FAT.
    pub second_fat_sector: u16,
    /// Sector number of the first data cluster.
    pub first_data_sector: u16,
    /// Data clusters on the disk.
    pub data_clusters: u16,
    /// Magic flags.
    pub flags: u16,
    pub track_count: u16,
    pub side_count: u16,
    pub sectors_per_cylinder: u16,
    pub sectors_per_track: u16,
    pub reserved: [u16; 3],
    pub disk_number: u16,
}

impl BpbData {
    /// Geometry of a double-sided 720K disk, published before the first
    /// image is mounted.
    pub fn placeholder(disk_number: u16) -> Self {
        Self {
            record_size: SECTOR_SIZE as u16,
            cluster_size: 2,
            cluster_bytes: 1024,
            root_dir_len: 8,
            fat_size: 6,
            second_fat_sector: 7,
            first_data_sector: 21,
            data_clusters: 1015,
            flags: 0,
            track_count: 0,
            side_count: 0,
            sectors_per_cylinder: 0,
            sectors_per_track: 0,
            reserved: [0; 3],
            disk_number,
        }
    }

    /// Derives the block from a DOS boot sector.
    ///
    /// The root-directory length comes out of the entry count's upper
    /// nibble: entry counts are multiples of 16, and 32-byte entries make
    /// each sector hold exactly 16 of them.
    pub fn from_boot_sector(sector: &[u8; SECTOR_SIZE], disk_number: u16) -> Self {
        let record_size = u16::from_le_bytes([sector[11], sector[12]]);
        let cluster_size = sector[13] as u16;
        let root_dir_len = ((sector[17] as u16) >> 4) | ((sector[18] as u16) << 8);
        let fat_size = sector[22] as u16;
        let second_fat_sector = fat_size + 1;
        let first_data_sector = root_dir_len + second_fat_sector + fat_size;
        let total_sectors = u16::from_le_bytes([sector[19], sector[20]]);
        let side_count = sector[26] as u16;
        let sectors_per_track = sector[24] as u16;
        Self {
            record_size,
            cluster_size,
            cluster_bytes: cluster_size.wrapping_mul(record_size),
            root_dir_len,
            fat_size,
            second_fat_sector,
            first_data_sector,
            data_clusters: total_sectors.saturating_sub(first_data_sector)
                / cluster_size.max(1),
            flags: 0,
            track_count: 0,
            side_count,
            sectors_per_cylinder: sectors_per_track.wrapping_mul(side_count),
            sectors_per_track,
            reserved: [0; 3],
            disk_number,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
