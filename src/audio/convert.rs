//! PCM sample format conversion

/// Convert one signed 16-bit sample to unsigned 8-bit
///
/// Keeps the high byte and flips its sign bit, so `i16::MIN` maps to 0,
/// silence to 128 and `i16::MAX` to 255.
#[must_use]
pub const fn sample_to_u8(sample: i16) -> u8 {
    sample.to_be_bytes()[0] ^ 0x80
}

/// Streaming converter from 16-bit signed little-endian PCM to 8-bit unsigned PCM
///
/// Input may be split at any byte; an odd trailing byte is held until the
/// next call.
#[derive(Debug, Default)]
pub struct Pcm16ToU8 {
    carry: Option<u8>,
}

impl Pcm16ToU8 {
    /// Create a converter with no pending input
    #[must_use]
    pub const fn new() -> Self {
        Self { carry: None }
    }

    /// Convert a block of input bytes
    pub fn convert(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len() / 2 + 1);
        let mut rest = input;

        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    out.push(sample_to_u8(i16::from_le_bytes([low, high])));
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return out;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        out.extend(
            pairs
                .by_ref()
                .map(|pair| sample_to_u8(i16::from_le_bytes([pair[0], pair[1]]))),
        );
        self.carry = pairs.remainder().first().copied();

        out
    }

    /// Whether half a sample is waiting for its second byte
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.carry.is_some()
    }
}
