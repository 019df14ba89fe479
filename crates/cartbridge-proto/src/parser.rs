use crate::frame::{Frame, HEADER_MAGIC, MAX_PAYLOAD_BYTES};

/// Inter-word silence after which a partial frame is abandoned.
pub const READ_RESTART_MICROS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    HeaderSearch,
    CommandRead,
    PayloadSize,
    PayloadInProgress,
    PayloadEnd,
}

/// Outcome of feeding one word into the parser.
#[derive(Debug)]
pub enum ParserEvent<'a> {
    /// A frame arrived and its checksum matched.
    Frame(&'a Frame),
    /// A complete frame arrived with a bad trailing checksum; carried for
    /// logging only.
    ChecksumMismatch(&'a Frame),
}

/// Reassembles frames from the 16-bit word stream captured off the bus.
///
/// Runs in the capture interrupt context: feeding a word never blocks and
/// never allocates. A torn frame is recovered by the silence watchdog — if
/// more than [`READ_RESTART_MICROS`] pass since the header was last seen,
/// the next word restarts the search.
pub struct ProtocolParser {
    step: Step,
    frame: Frame,
    bytes_read: u16,
    last_header_micros: u64,
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self {
            step: Step::HeaderSearch,
            frame: Frame::empty(),
            bytes_read: 0,
            last_header_micros: 0,
        }
    }

    /// Feeds one captured word. `now_micros` is a monotonic microsecond
    /// counter supplied by the caller.
    pub fn push_word(&mut self, word: u16, now_micros: u64) -> Option<ParserEvent<'_>> {
        if now_micros.wrapping_sub(self.last_header_micros) > READ_RESTART_MICROS {
            self.step = Step::HeaderSearch;
        }

        match self.step {
            Step::HeaderSearch => {
                if word == HEADER_MAGIC {
                    self.step = Step::CommandRead;
                }
                self.last_header_micros = now_micros;
                None
            }
            Step::CommandRead => {
                self.frame.reset(word);
                self.step = Step::PayloadSize;
                None
            }
            Step::PayloadSize => {
                self.frame.payload_size = word;
                self.bytes_read = 0;
                self.step = if word == 0 {
                    Step::PayloadEnd
                } else {
                    Step::PayloadInProgress
                };
                None
            }
            Step::PayloadInProgress => {
                if (self.bytes_read as usize) < MAX_PAYLOAD_BYTES {
                    self.frame.store_word(self.bytes_read as usize / 2, word);
                }
                self.bytes_read = self.bytes_read.saturating_add(2);
                if self.bytes_read >= self.frame.payload_size {
                    self.step = Step::PayloadEnd;
                }
                None
            }
            Step::PayloadEnd => {
                self.step = Step::HeaderSearch;
                self.last_header_micros = 0;
                if word == self.frame.checksum() {
                    Some(ParserEvent::Frame(&self.frame))
                } else {
                    Some(ParserEvent::ChecksumMismatch(&self.frame))
                }
            }
        }
    }
}
