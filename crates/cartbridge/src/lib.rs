//! The cartridge-bus storage bridge.
//!
//! A small computer sits on the cartridge port of a vintage 16-bit machine
//! and emulates mass storage for it: a hard-disk volume served from a
//! directory tree, and two floppy drives served from image files. The
//! target runs unmodified system code; its file-system and disk traps are
//! captured on the bus, parsed into command frames, and answered through a
//! shared memory window.
//!
//! This crate is the assembly point: it evaluates the configuration,
//! brings up the enabled subsystems, wires them to the command dispatcher
//! and owns the main loop's side of the interrupt handoff. The subsystem
//! crates are re-exported under short names.

pub use cartbridge_floppy as floppy;
pub use cartbridge_gemdrive as gemdrive;
pub use cartbridge_proto as proto;
pub use cartbridge_shm as shm;
pub use cartbridge_storage as storage;

mod bridge;
mod config;

pub use bridge::{Bridge, BusFrontend, Peripherals};
pub use config::{SettingValue, Settings, keys};
