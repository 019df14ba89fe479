use crate::payload::PayloadReader;

/// Fixed magic preceding every frame on the wire.
pub const HEADER_MAGIC: u16 = 0xABCD;

/// Largest accepted payload: 2 KiB of data plus a safety margin.
pub const MAX_PAYLOAD_BYTES: usize = 2048 + 64;
pub const MAX_PAYLOAD_WORDS: usize = MAX_PAYLOAD_BYTES / 2;

/// 16-bit sum of the command id, payload size and every payload word.
pub fn checksum(command_id: u16, payload_size: u16, words: &[u16]) -> u16 {
    let mut sum = command_id.wrapping_add(payload_size);
    for &w in words {
        sum = sum.wrapping_add(w);
    }
    sum
}

/// One reassembled command frame.
///
/// The payload buffer is fixed-size and reused by the parser, so the frame is
/// a plain copyable value with no heap behind it. The first two payload words
/// carry the 32-bit random token the target correlates completions with.
#[derive(Clone)]
pub struct Frame {
    pub command_id: u16,
    pub payload_size: u16,
    payload: [u16; MAX_PAYLOAD_WORDS],
}

impl Frame {
    pub fn empty() -> Self {
        Self {
            command_id: 0,
            payload_size: 0,
            payload: [0; MAX_PAYLOAD_WORDS],
        }
    }

    /// Builds a frame from payload words; sizes above the maximum are
    /// clamped the same way the parser clamps them.
    pub fn new(command_id: u16, words: &[u16]) -> Self {
        let mut frame = Self::empty();
        frame.command_id = command_id;
        let n = words.len().min(MAX_PAYLOAD_WORDS);
        frame.payload[..n].copy_from_slice(&words[..n]);
        frame.payload_size = (n * 2) as u16;
        frame
    }

    pub(crate) fn reset(&mut self, command_id: u16) {
        self.command_id = command_id;
        self.payload_size = 0;
    }

    pub(crate) fn store_word(&mut self, index: usize, word: u16) {
        if index < MAX_PAYLOAD_WORDS {
            self.payload[index] = word;
        }
    }

    /// Number of payload words actually carried, clamped to the buffer.
    pub fn payload_words(&self) -> &[u16] {
        let words = (self.payload_size as usize / 2).min(MAX_PAYLOAD_WORDS);
        &self.payload[..words]
    }

    /// The 32-bit random token from the head of the payload. The token
    /// travels most-significant word first.
    pub fn token(&self) -> u32 {
        let w = self.payload_words();
        let hi = w.first().copied().unwrap_or(0) as u32;
        let lo = w.get(1).copied().unwrap_or(0) as u32;
        (hi << 16) | lo
    }

    pub fn checksum(&self) -> u16 {
        checksum(self.command_id, self.payload_size, self.payload_words())
    }

    /// Cursor positioned past the random token, at the first parameter.
    pub fn params(&self) -> PayloadReader<'_> {
        PayloadReader::new(self.payload_words(), 2)
    }

    /// Serializes the frame as the word stream the target would emit,
    /// including the header magic and trailing checksum.
    pub fn to_wire(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(4 + self.payload_words().len());
        out.push(HEADER_MAGIC);
        out.push(self.command_id);
        out.push(self.payload_size);
        out.extend_from_slice(self.payload_words());
        out.push(self.checksum());
        out
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("command_id", &format_args!("{:#06x}", self.command_id))
            .field("payload_size", &self.payload_size)
            .field("token", &format_args!("{:#010x}", self.token()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_modular_sum() {
        assert_eq!(checksum(0x0401, 4, &[0xDEAD, 0xBEEF]), {
            (0x0401u16)
                .wrapping_add(4)
                .wrapping_add(0xDEAD)
                .wrapping_add(0xBEEF)
        });
    }

    #[test]
    fn token_is_msw_first() {
        let frame = Frame::new(0x0400, &[0x1234, 0x5678]);
        assert_eq!(frame.token(), 0x1234_5678);
    }

    #[test]
    fn oversized_payload_is_clamped() {
        let words = vec![0u16; MAX_PAYLOAD_WORDS + 16];
        let frame = Frame::new(0x0400, &words);
        assert_eq!(frame.payload_words().len(), MAX_PAYLOAD_WORDS);
    }
}
