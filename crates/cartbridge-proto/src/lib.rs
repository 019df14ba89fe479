//! Command transport for the cartridge bus.
//!
//! The target machine issues commands by performing read cycles against a
//! reserved address range of the cartridge port; the captured addresses form
//! a word stream carrying framed, checksummed requests. This crate
//! reassembles that stream into [`Frame`]s, hands them from the capture
//! (interrupt) context to the main loop through a single-slot [`Mailbox`],
//! and fans them out to registered handlers in order.

mod bus;
mod dispatch;
mod frame;
mod parser;
mod payload;

pub use bus::{ADDRESS_HIGH_BIT, REQUEST_CYCLE_BIT, decode_bus_address};
pub use dispatch::{Dispatcher, Handler, Mailbox};
pub use frame::{Frame, HEADER_MAGIC, MAX_PAYLOAD_BYTES, MAX_PAYLOAD_WORDS, checksum};
pub use parser::{ParserEvent, ProtocolParser, READ_RESTART_MICROS};
pub use payload::{PayloadReader, words_from_string};

/// Application tag of the floppy engine (high byte of the command id).
pub const APP_FLOPPY: u8 = 0x02;
/// Application tag of the real-time-clock subsystem (not handled here).
pub const APP_CLOCK: u8 = 0x03;
/// Application tag of the file-system responder.
pub const APP_GEMDRIVE: u8 = 0x04;

/// Builds a command id from an application tag and an operation code.
pub const fn command_id(app: u8, op: u8) -> u16 {
    ((app as u16) << 8) | op as u16
}

/// Application tag of a command id.
pub const fn app_of(command_id: u16) -> u8 {
    (command_id >> 8) as u8
}
