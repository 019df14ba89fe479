use cartbridge_proto::{APP_FLOPPY, Frame, PayloadReader, app_of};
use cartbridge_shm::{SharedWindow, WINDOW_SIZE};
use cartbridge_storage::{FileHandle, MediaError, MediaResult, OpenMode, Volume};

use crate::bpb::BpbData;
use crate::cmd;
use crate::layout::*;
use crate::path_join;
use crate::SECTOR_SIZE;

/// Machine identifier that keeps its cache/speed toggling code.
const MACHINE_MEGA: u32 = 0x0001_0010;
/// The no-op opcode patched over machine-specific code elsewhere.
const OPCODE_NOP: u16 = 0x4E71;

/// Lifecycle of one virtual drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveState {
    #[default]
    Unmounted,
    MountedRw,
    MountedRo,
    Error,
    Unknown,
}

impl DriveState {
    pub fn is_mounted(self) -> bool {
        matches!(self, DriveState::MountedRw | DriveState::MountedRo)
    }
}

/// Settings the engine is built from. An empty image name means the drive
/// is ejected.
#[derive(Debug, Clone, Default)]
pub struct FloppyConfig {
    pub folder: String,
    pub image_a: Option<String>,
    pub image_b: Option<String>,
    pub boot_enabled: bool,
    pub xbios_trap_enabled: bool,
}

struct DriveSlot {
    state: DriveState,
    image: Option<Box<dyn FileHandle>>,
    path: String,
    bpb: BpbData,
}

impl DriveSlot {
    fn new(disk_number: u16) -> Self {
        Self {
            state: DriveState::Unmounted,
            image: None,
            path: String::new(),
            bpb: BpbData::placeholder(disk_number),
        }
    }
}

/// The two virtual drives and their command fan-in.
pub struct FloppyEmulator {
    folder: String,
    image_names: [Option<String>; 2],
    drives: [DriveSlot; 2],
    boot_enabled: bool,
    xbios_trap_enabled: bool,
}

impl FloppyEmulator {
    pub fn new(cfg: FloppyConfig) -> Self {
        let normalize = |name: Option<String>| name.filter(|n| !n.is_empty());
        Self {
            folder: cfg.folder,
            image_names: [normalize(cfg.image_a), normalize(cfg.image_b)],
            drives: [DriveSlot::new(0), DriveSlot::new(1)],
            boot_enabled: cfg.boot_enabled,
            xbios_trap_enabled: cfg.xbios_trap_enabled,
        }
    }

    /// Publishes the engine's shared variables and mounts the configured
    /// images. A drive that fails to mount stays out of the emulation mask.
    pub fn init<V: Volume>(&mut self, win: &mut SharedWindow, vol: &mut V) {
        win.set_shared_var(
            SVAR_XBIOS_TRAP_ENABLED,
            if self.xbios_trap_enabled { 0xFFFF_FFFF } else { 0 },
        );
        win.set_shared_var(
            SVAR_BOOT_ENABLED,
            if self.boot_enabled { 0xFFFF_FFFF } else { 0 },
        );
        win.set_shared_var(SVAR_ENABLED, 0xFFFF_FFFF);

        for drive in 0..2 {
            if self.image_names[drive].is_none() {
                continue;
            }
            if let Err(e) = self.mount(drive, win, vol) {
                log::warn!("drive {} failed to mount: {e}", drive_letter(drive));
                self.drives[drive].state = DriveState::Unmounted;
                win.clear_shared_var_bit(SVAR_EMULATION_MODE, drive as u8);
            }
        }
    }

    pub fn drive_state(&self, drive: usize) -> DriveState {
        self.drives[drive].state
    }

    pub fn drive_bpb(&self, drive: usize) -> &BpbData {
        &self.drives[drive].bpb
    }

    /// Opens the configured image for one drive, derives its geometry and
    /// publishes it. Read/write eligibility comes from the image name: a
    /// trailing `.rw` after the primary extension mounts writable.
    pub fn mount<V: Volume>(
        &mut self,
        drive: usize,
        win: &mut SharedWindow,
        vol: &mut V,
    ) -> MediaResult<()> {
        let slot = &mut self.drives[drive];
        let Some(name) = self.image_names[drive].as_deref() else {
            log::debug!("drive {} has no image configured", drive_letter(drive));
            slot.state = DriveState::Error;
            return Err(MediaError::InvalidName);
        };
        let writable = name.ends_with(".rw");
        let path = path_join(&self.folder, name);
        log::debug!(
            "mounting {} on drive {} ({})",
            path,
            drive_letter(drive),
            if writable { "read/write" } else { "read only" }
        );

        let mode = if writable {
            OpenMode::READ | OpenMode::WRITE
        } else {
            OpenMode::READ
        };
        let mut image = match vol.open(&path, mode) {
            Ok(image) => image,
            Err(e) => {
                slot.state = DriveState::Error;
                return Err(e);
            }
        };

        // Walk to the end and back: a dead card fails here, not mid-read.
        let size = image.size();
        let live = image
            .seek(size)
            .and_then(|_| image.seek(0))
            .and_then(|_| {
                let mut sector = [0u8; SECTOR_SIZE];
                image.read_exact(&mut sector).map(|_| sector)
            });
        let sector = match live {
            Ok(sector) => sector,
            Err(e) => {
                slot.state = DriveState::Error;
                return Err(e);
            }
        };

        slot.bpb = BpbData::from_boot_sector(&sector, drive as u16);
        let bpb_slot = if drive == 0 { BPB_SLOT_A } else { BPB_SLOT_B };
        win.write_bytes(bpb_slot, slot.bpb.as_bytes());
        win.set_shared_var_bit(SVAR_EMULATION_MODE, drive as u8);

        slot.image = Some(image);
        slot.path = path;
        slot.state = if writable {
            DriveState::MountedRw
        } else {
            DriveState::MountedRo
        };
        Ok(())
    }

    /// Entry point from the dispatcher.
    pub fn on_command<V: Volume>(&mut self, frame: &Frame, win: &mut SharedWindow, vol: &mut V) {
        if app_of(frame.command_id) != APP_FLOPPY {
            return;
        }
        let rd = frame.params();
        match frame.command_id {
            cmd::SAVE_VECTORS => save_vectors(rd, win),
            cmd::SAVE_BIOS_VECTOR => save_bios_vector(rd, win),
            cmd::SAVE_HARDWARE => save_hardware(rd, win),
            cmd::SET_SHARED_VAR => set_shared_var(rd, win),
            cmd::SHOW_VECTOR_CALL => {
                log::debug!("disk vector call {:#06x}", rd.peek_u16());
            }
            cmd::RESET => {
                // The display continues the target's boot sequence from here.
                log::info!("floppy engine reset");
            }
            cmd::PING => log::trace!("ping"),
            cmd::READ_SECTORS => self.read_sectors(rd, win, vol),
            cmd::WRITE_SECTORS => self.write_sectors(rd, win, vol),
            cmd::DEBUG => debug_report(frame, rd),
            other => log::debug!("unhandled floppy command {other:#06x}"),
        }
    }

    fn ensure_mounted<V: Volume>(
        &mut self,
        drive: usize,
        win: &mut SharedWindow,
        vol: &mut V,
    ) -> bool {
        if self.drives[drive].state.is_mounted() {
            return true;
        }
        log::debug!("drive {} not mounted, retrying", drive_letter(drive));
        match self.mount(drive, win, vol) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("drive {} remount failed: {e}", drive_letter(drive));
                self.drives[drive].state = DriveState::Error;
                false
            }
        }
    }

    /// Serves one sector into the shared transfer buffer, byte-swapped for
    /// the bus. Failures only flip the drive's error state; the target
    /// retries at its layer.
    fn read_sectors<V: Volume>(
        &mut self,
        mut rd: PayloadReader<'_>,
        win: &mut SharedWindow,
        vol: &mut V,
    ) {
        let sector_size = rd.peek_u16() as usize;
        let logical_sector = rd.next_word() as u64;
        let disk = drive_index(rd.next_word());
        log::debug!(
            "disk read {}: sector {logical_sector}, {sector_size} bytes",
            drive_letter(disk)
        );

        if !self.ensure_mounted(disk, win, vol) {
            return;
        }
        let slot = &mut self.drives[disk];
        let Some(image) = slot.image.as_mut() else {
            slot.state = DriveState::Error;
            return;
        };
        let mut buf = vec![0u8; sector_size.min(SECTOR_SIZE * 2)];
        let read = image
            .seek(logical_sector * sector_size as u64)
            .and_then(|_| image.read(&mut buf));
        match read {
            Ok(n) => {
                win.write_bytes(IMAGE_BUFFER, &buf[..n]);
                win.swap_block16(IMAGE_BUFFER, buf.len());
            }
            Err(e) => {
                log::warn!("sector read failed on {}: {e}", slot.path);
                slot.image = None;
                slot.state = DriveState::Error;
            }
        }
    }

    /// Writes one sector from the staged payload. Only a read/write mount
    /// accepts it.
    fn write_sectors<V: Volume>(
        &mut self,
        mut rd: PayloadReader<'_>,
        win: &mut SharedWindow,
        vol: &mut V,
    ) {
        let sector_size = rd.peek_u16() as usize;
        let logical_sector = rd.next_word() as u64;
        let disk = drive_index(rd.next_word());
        let remote_addr = rd.next_long();
        rd.skip_long();
        log::debug!(
            "disk write {}: sector {logical_sector}, {sector_size} bytes from {remote_addr:#010x}",
            drive_letter(disk)
        );

        if !self.ensure_mounted(disk, win, vol) {
            return;
        }
        if self.drives[disk].state != DriveState::MountedRw {
            log::warn!("drive {} is not writable", drive_letter(disk));
            return;
        }
        let slot = &mut self.drives[disk];
        let Some(image) = slot.image.as_mut() else {
            slot.state = DriveState::Error;
            return;
        };
        let staged = rd.rest_bytes_swapped();
        let count = sector_size.min(staged.len());
        let written = image
            .seek(logical_sector * sector_size as u64)
            .and_then(|_| image.write_all(&staged[..count]));
        if let Err(e) = written {
            log::warn!("sector write failed on {}: {e}", slot.path);
            slot.image = None;
            slot.state = DriveState::Error;
        }
    }
}

fn drive_index(raw: u16) -> usize {
    if raw == 0 { 0 } else { 1 }
}

fn drive_letter(drive: usize) -> char {
    if drive == 0 { 'A' } else { 'B' }
}

/// Records the old XBIOS trap vector for the target's chain.
fn save_vectors(rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let old_vector = rd.peek_u32();
    log::debug!("recording old XBIOS trap {old_vector:#010x}");
    win.write_long_swapped(OLD_XBIOS_TRAP, old_vector);
}

/// Links the old BIOS vector into the relocated handler's chain slot.
fn save_bios_vector(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let old_vector = rd.peek_u32();
    let handler = rd.next_long();
    let _replacement = rd.next_long();
    let chain_slot = (handler & 0xFFFF) as usize;
    log::debug!("linking old BIOS vector {old_vector:#010x} at {chain_slot:#06x}");
    win.write_long_swapped(chain_slot, old_vector);
}

/// On anything but the machine that needs its cache toggled, the toggle
/// routine in the firmware image is overwritten with no-ops: eight at its
/// start, two at its end.
fn save_hardware(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let machine = rd.peek_u32();
    let func_start = rd.next_long();
    let func_end = rd.next_long();
    if machine == MACHINE_MEGA {
        log::debug!("machine {machine:#010x} keeps its cache toggling code");
        return;
    }
    win.fill_words((func_start & 0xFFFF) as usize, 8, OPCODE_NOP);
    win.fill_words((func_end & 0xFFFF) as usize, 2, OPCODE_NOP);
    log::debug!("cache toggling stubbed out for machine {machine:#010x}");
}

fn set_shared_var(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let index = rd.peek_u32() as usize;
    let value = rd.next_long();
    if cartbridge_shm::SHARED_VARIABLES_OFFSET + index * 4 + 4 > WINDOW_SIZE {
        log::warn!("shared variable index {index} out of range");
        return;
    }
    win.set_shared_var(index, value);
}

fn debug_report(frame: &Frame, mut rd: PayloadReader<'_>) {
    log::debug!("debug d3 {:#010x}", rd.peek_u32());
    if frame.payload_size > 8 {
        log::debug!("debug d4 {:#010x}", rd.next_long());
    }
    if frame.payload_size > 12 {
        log::debug!("debug d5 {:#010x}", rd.next_long());
    }
    if frame.payload_size > 16 {
        log::debug!("debug d6 {:#010x}", rd.next_long());
    }
}
