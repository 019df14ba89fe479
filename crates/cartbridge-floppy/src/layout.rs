//! Shared-memory layout of the floppy engine.

use cartbridge_shm::RANDOM_TOKEN_OFFSET;

/// Gap reserved between the random token and the engine's variables; the
/// target keeps transfer state of its own in there.
const GAP_SIZE: usize = 0x1800;
/// Shared-variable indices below this belong to shared functions.
const SHARED_VARIABLE_BASE: usize = GAP_SIZE / 4;
/// Longwords reserved for the engine's shared variables.
const SHARED_VARIABLES_COUNT: usize = 32;

pub const SVAR_XBIOS_TRAP_ENABLED: usize = SHARED_VARIABLE_BASE;
pub const SVAR_BOOT_ENABLED: usize = SHARED_VARIABLE_BASE + 1;
/// Bit 0: drive A emulated, bit 1: drive B emulated.
pub const SVAR_EMULATION_MODE: usize = SHARED_VARIABLE_BASE + 2;
pub const SVAR_ENABLED: usize = SHARED_VARIABLE_BASE + 3;

pub const VARIABLES_OFFSET: usize =
    RANDOM_TOKEN_OFFSET + GAP_SIZE + SHARED_VARIABLES_COUNT;

pub const OLD_XBIOS_TRAP: usize = VARIABLES_OFFSET;
/// Per-drive BIOS Parameter Block slots, 17 16-bit fields each.
pub const BPB_SLOT_A: usize = OLD_XBIOS_TRAP + 4;
pub const BPB_SLOT_B: usize = BPB_SLOT_A + crate::bpb::BPB_BYTES;

/// Sector transfer buffer the target reads from.
pub const IMAGE_BUFFER: usize = VARIABLES_OFFSET + 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_the_published_map() {
        assert_eq!(SVAR_XBIOS_TRAP_ENABLED, 1536);
        assert_eq!(VARIABLES_OFFSET, 0x9A20);
        assert_eq!(BPB_SLOT_A, 0x9A24);
        assert_eq!(BPB_SLOT_B, 0x9A24 + 34);
        assert_eq!(IMAGE_BUFFER, 0x9B20);
    }
}
