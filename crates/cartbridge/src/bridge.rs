use std::sync::Arc;
use std::time::Instant;

use cartbridge_floppy::{FloppyConfig, FloppyEmulator};
use cartbridge_gemdrive::{GemDrive, GemDriveConfig};
use cartbridge_proto::{Dispatcher, Mailbox, ParserEvent, ProtocolParser, decode_bus_address};
use cartbridge_shm::{
    RANDOM_TOKEN_OFFSET, RANDOM_TOKEN_SEED_OFFSET, SVAR_HARDWARE_TYPE, SVAR_VERSION, SharedWindow,
};
use cartbridge_storage::Volume;

use crate::config::{Settings, keys};

/// Board revision the target-side driver matches against.
const BOARD_REVISION: u32 = 1;

/// Crate version packed as `major << 16 | minor << 8 | patch`.
fn packed_version() -> u32 {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .filter_map(|p| p.parse::<u32>().ok());
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    (major << 16) | (minor << 8) | patch
}

/// Everything the command handlers touch from the main loop.
pub struct Peripherals<V: Volume> {
    pub gemdrive: GemDrive,
    pub floppy: FloppyEmulator,
    pub volume: V,
}

/// The main-loop side of the bridge: the shared window, the dispatcher and
/// the emulated peripherals.
///
/// The capture-interrupt side lives in [`BusFrontend`] values handed out by
/// [`Bridge::frontend`]; the two meet only in the single-slot mailbox.
pub struct Bridge<V: Volume> {
    window: SharedWindow,
    dispatcher: Dispatcher<Peripherals<V>>,
    peripherals: Peripherals<V>,
    mailbox: Arc<Mailbox>,
}

impl<V: Volume + 'static> Bridge<V> {
    /// Evaluates the settings, initializes the enabled subsystems, mounts
    /// the configured floppy images and seeds the token chain.
    pub fn new(settings: &Settings, volume: V) -> Self {
        Self::with_window(settings, volume, SharedWindow::new())
    }

    /// Same, over a preloaded firmware image.
    pub fn with_window(settings: &Settings, volume: V, mut window: SharedWindow) -> Self {
        window.clear_from(RANDOM_TOKEN_OFFSET);
        window.set_shared_var(SVAR_HARDWARE_TYPE, BOARD_REVISION);
        window.set_shared_var(SVAR_VERSION, packed_version());

        let gemdrive_enabled = settings.flag(keys::GEMDRIVE_ENABLED);
        let floppy_enabled = settings.flag(keys::FLOPPY_ENABLED);

        let gemdrive = GemDrive::new(GemDriveConfig {
            root_folder: settings.text_or(keys::GEMDRIVE_FOLDER, "/hd"),
            drive_letter: settings.letter(keys::GEMDRIVE_DRIVE, 'C'),
            read_only: settings.flag(keys::GEMDRIVE_READ_ONLY),
        });
        let floppy = FloppyEmulator::new(FloppyConfig {
            folder: settings.text_or(keys::FLOPPY_FOLDER, "/floppies"),
            image_a: settings.text(keys::FLOPPY_IMAGE_A).map(str::to_string),
            image_b: settings.text(keys::FLOPPY_IMAGE_B).map(str::to_string),
            boot_enabled: settings.flag(keys::FLOPPY_BOOT_ENABLED),
            xbios_trap_enabled: settings.flag(keys::FLOPPY_XBIOS_ENABLED),
        });

        let mut peripherals = Peripherals {
            gemdrive,
            floppy,
            volume,
        };
        let mut dispatcher = Dispatcher::new();

        if gemdrive_enabled {
            peripherals.gemdrive.init(&mut window);
            dispatcher.register(Box::new(|frame, win, p: &mut Peripherals<V>| {
                p.gemdrive.on_command(frame, win, &mut p.volume);
            }));
        } else {
            log::info!("hard-disk responder disabled");
        }
        if floppy_enabled {
            peripherals.floppy.init(&mut window, &mut peripherals.volume);
            dispatcher.register(Box::new(|frame, win, p: &mut Peripherals<V>| {
                p.floppy.on_command(frame, win, &mut p.volume);
            }));
        } else {
            log::info!("floppy engine disabled");
        }

        // Token slot zeroed, seed published for the target's first request.
        window.write_long(RANDOM_TOKEN_OFFSET, 0);
        window.write_long(RANDOM_TOKEN_OFFSET + 4, 0);
        let seed: u32 = rand::random();
        window.write_long(RANDOM_TOKEN_SEED_OFFSET, seed);
        log::debug!("token seed {seed:#010x}, {} handlers", dispatcher.handler_count());

        Self {
            window,
            dispatcher,
            peripherals,
            mailbox: Arc::new(Mailbox::new()),
        }
    }

    /// A capture-context feeder wired to this bridge's mailbox.
    pub fn frontend(&self) -> BusFrontend {
        BusFrontend::new(self.mailbox.clone())
    }

    /// Blocks for the next frame and services it.
    pub fn run_once(&mut self) {
        let frame = self.mailbox.take();
        self.dispatcher
            .run_frame(&frame, &mut self.window, &mut self.peripherals);
    }

    /// Services a pending frame, if any. Returns whether one ran.
    pub fn try_run_once(&mut self) -> bool {
        match self.mailbox.try_take() {
            Some(frame) => {
                self.dispatcher
                    .run_frame(&frame, &mut self.window, &mut self.peripherals);
                true
            }
            None => false,
        }
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    pub fn peripherals(&self) -> &Peripherals<V> {
        &self.peripherals
    }

    pub fn peripherals_mut(&mut self) -> &mut Peripherals<V> {
        &mut self.peripherals
    }
}

/// The capture-interrupt side: address decode, frame reassembly and the
/// non-blocking mailbox deposit. Never blocks, never allocates per word.
pub struct BusFrontend {
    parser: ProtocolParser,
    mailbox: Arc<Mailbox>,
    epoch: Instant,
}

impl BusFrontend {
    fn new(mailbox: Arc<Mailbox>) -> Self {
        Self {
            parser: ProtocolParser::new(),
            mailbox,
            epoch: Instant::now(),
        }
    }

    /// Feeds one captured bus address; ordinary ROM reads fall through.
    pub fn on_bus_capture(&mut self, addr: u32) {
        if let Some(word) = decode_bus_address(addr) {
            self.feed_word(word);
        }
    }

    /// Feeds one already-decoded protocol word.
    pub fn feed_word(&mut self, word: u16) {
        let now = self.epoch.elapsed().as_micros() as u64;
        match self.parser.push_word(word, now) {
            Some(ParserEvent::Frame(frame)) => {
                self.mailbox.offer(frame);
            }
            Some(ParserEvent::ChecksumMismatch(frame)) => {
                log::warn!(
                    "checksum mismatch on command {:#06x} ({} payload bytes)",
                    frame.command_id,
                    frame.payload_size
                );
            }
            None => {}
        }
    }

    /// Feeds a whole wire stream; test and loopback convenience.
    pub fn feed_words(&mut self, words: &[u16]) {
        for &w in words {
            self.feed_word(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartbridge_proto::Frame;
    use cartbridge_gemdrive::layout as gem_layout;
    use cartbridge_gemdrive::{GemdosError, cmd as gem_cmd};
    use cartbridge_proto::words_from_string;
    use cartbridge_storage::MemVolume;

    fn settings() -> Settings {
        let mut s = Settings::new();
        s.set_flag(keys::GEMDRIVE_ENABLED, true)
            .set_text(keys::GEMDRIVE_FOLDER, "/hd")
            .set_text(keys::GEMDRIVE_DRIVE, "C")
            .set_flag(keys::FLOPPY_ENABLED, true)
            .set_text(keys::FLOPPY_FOLDER, "/floppies");
        s
    }

    fn fopen_frame(name: &str) -> Frame {
        let mut words = vec![0xAABB, 0xCCDD]; // token
        words.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        words.extend(words_from_string(name, gem_layout::MAX_FOLDER_LENGTH));
        Frame::new(gem_cmd::FOPEN, &words)
    }

    #[test]
    fn a_frame_travels_from_the_wire_to_a_handler() {
        let mut vol = MemVolume::new();
        vol.put_file("/hd/BOOT.PRG", b"prg").unwrap();
        let mut bridge = Bridge::new(&settings(), vol);
        let mut frontend = bridge.frontend();

        frontend.feed_words(&fopen_frame("BOOT.PRG").to_wire());
        assert!(bridge.try_run_once());
        assert!(!bridge.try_run_once());

        assert_eq!(
            bridge.window().read_long_swapped(gem_layout::FOPEN_HANDLE),
            16384
        );
        // Completion: counter 1 over the echoed token.
        assert_eq!(bridge.window().read_token64(), (1u64 << 32) | 0xAABB_CCDD);
    }

    #[test]
    fn back_to_back_frames_without_service_drop_the_second() {
        let mut vol = MemVolume::new();
        vol.put_file("/hd/A.PRG", b"a").unwrap();
        vol.put_file("/hd/B.PRG", b"b").unwrap();
        let mut bridge = Bridge::new(&settings(), vol);
        let mut frontend = bridge.frontend();

        frontend.feed_words(&fopen_frame("A.PRG").to_wire());
        frontend.feed_words(&fopen_frame("B.PRG").to_wire());
        assert!(bridge.try_run_once());
        // Only the first frame survived the mailbox.
        assert!(!bridge.try_run_once());
        assert_eq!(bridge.peripherals().gemdrive.open_files(), 1);
    }

    #[test]
    fn corrupt_frames_never_reach_the_dispatcher() {
        let vol = MemVolume::new();
        let mut bridge = Bridge::new(&settings(), vol);
        let mut frontend = bridge.frontend();

        let mut wire = fopen_frame("A.PRG").to_wire();
        let last = wire.len() - 1;
        wire[last] = wire[last].wrapping_add(1);
        frontend.feed_words(&wire);
        assert!(!bridge.try_run_once());
    }

    #[test]
    fn disabled_subsystems_register_no_handlers() {
        let vol = MemVolume::new();
        let mut bridge = Bridge::new(&Settings::new(), vol);
        let mut frontend = bridge.frontend();
        frontend.feed_words(&fopen_frame("A.PRG").to_wire());
        assert!(bridge.try_run_once());
        // The frame ran, but no status was produced.
        assert_eq!(bridge.window().read_long(gem_layout::FOPEN_HANDLE), 0);
    }

    #[test]
    fn reset_status_reaches_the_window_before_the_token_rotates() {
        let mut vol = MemVolume::new();
        vol.mkdir("/hd").unwrap();
        let mut bridge = Bridge::new(&settings(), vol);
        let mut frontend = bridge.frontend();

        // Dsetpath to a missing directory: the error status and the token
        // rotation both land in the window after one service pass.
        let mut words = vec![0x0102, 0x0304];
        words.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        words.extend(words_from_string("\\MISSING", gem_layout::MAX_FOLDER_LENGTH));
        frontend.feed_words(&Frame::new(gem_cmd::DSETPATH, &words).to_wire());
        assert!(bridge.try_run_once());
        assert_eq!(
            bridge.window().read_word(gem_layout::DSETPATH_STATUS),
            GemdosError::PathNotFound.word()
        );
        assert_eq!(bridge.window().read_token64() & 0xFFFF_FFFF, 0x0102_0304);
    }
}
