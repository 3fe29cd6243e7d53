//! WAV container framing
//!
//! Captured utterances are framed with a fixed 50-byte header written before
//! any audio arrives. The RIFF size is derived from a nominal sample count and
//! the data length is zero; neither is rewritten once recording completes.

use std::io::Cursor;

use crate::{Error, Result};

/// Length of the capture header, including six bytes of zero padding
pub const HEADER_LEN: usize = 50;

/// Bytes of the header covered by RIFF/fmt/data fields
const FIELDS_LEN: usize = 44;

/// PCM format tag
const FORMAT_PCM: u16 = 1;

/// Sample layout of an uncompressed PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Interleaved channels
    pub channels: u16,
}

impl WavFormat {
    /// Native capture format of the device: 16 kHz, 8-bit, mono
    pub const CAPTURE: Self = Self {
        sample_rate: 16_000,
        bits_per_sample: 8,
        channels: 1,
    };

    /// Synthesized speech format: 16 kHz, 16-bit, mono
    pub const SPEECH: Self = Self {
        sample_rate: 16_000,
        bits_per_sample: 16,
        channels: 1,
    };

    /// Bytes per single-channel sample
    #[must_use]
    pub const fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample.div_ceil(8)
    }

    /// Bytes per frame across all channels, saturating at `u16::MAX`
    #[must_use]
    pub const fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bytes_per_sample())
    }

    /// Bytes per second, saturating at `u32::MAX`
    #[must_use]
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align() as u32)
    }
}

/// Fields read back from a capture header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Declared format
    pub format: WavFormat,
    /// Declared RIFF chunk size (placeholder)
    pub riff_size: u32,
    /// Declared data length (placeholder)
    pub data_len: u32,
}

/// Encode the fixed capture header
///
/// The RIFF size is a streaming placeholder, `32 + nominal_samples * channels`,
/// and is never rewritten once the recording ends.
#[must_use]
pub fn encode_header(format: &WavFormat, nominal_samples: u32) -> [u8; HEADER_LEN] {
    let riff_size = nominal_samples
        .saturating_mul(u32::from(format.channels))
        .saturating_add(32);

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&0u32.to_le_bytes());
    header
}

/// Decode a header produced by [`encode_header`]
///
/// # Errors
///
/// Returns error if the buffer is too short or a magic field is wrong
pub fn decode_header(bytes: &[u8]) -> Result<WavHeader> {
    if bytes.len() < FIELDS_LEN {
        return Err(Error::Audio(format!(
            "header too short: {} bytes",
            bytes.len()
        )));
    }

    let magic = |offset: usize, expected: &[u8; 4]| {
        if &bytes[offset..offset + 4] == expected {
            Ok(())
        } else {
            Err(Error::Audio(format!(
                "expected {:?} at offset {offset}",
                String::from_utf8_lossy(expected)
            )))
        }
    };
    magic(0, b"RIFF")?;
    magic(8, b"WAVE")?;
    magic(12, b"fmt ")?;
    magic(36, b"data")?;

    let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
    let u32_at = |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);

    if u16_at(20) != FORMAT_PCM {
        return Err(Error::Audio(format!("unsupported format tag {}", u16_at(20))));
    }

    Ok(WavHeader {
        format: WavFormat {
            sample_rate: u32_at(24),
            bits_per_sample: u16_at(34),
            channels: u16_at(22),
        },
        riff_size: u32_at(4),
        data_len: u32_at(40),
    })
}

/// Decode a canonical WAV file into mono 16-bit little-endian PCM
///
/// Stereo input is averaged down to mono. Only 16-bit integer sources are
/// accepted since the output pipeline converts from 16-bit.
///
/// # Errors
///
/// Returns error if the file is not a readable 16-bit integer WAV
pub fn decode_pcm16(wav: &[u8]) -> Result<(WavFormat, Vec<u8>)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported wav source: {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let channels = usize::from(spec.channels.max(1));
    let mut pcm = Vec::with_capacity(samples.len() / channels * 2);
    for frame in samples.chunks(channels) {
        let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
        // Average of i16 values always fits back into i16
        let mono = i16::try_from(sum / i32::try_from(frame.len()).unwrap_or(1)).unwrap_or_default();
        pcm.extend_from_slice(&mono.to_le_bytes());
    }

    if spec.sample_rate != WavFormat::SPEECH.sample_rate {
        tracing::warn!(
            sample_rate = spec.sample_rate,
            expected = WavFormat::SPEECH.sample_rate,
            "wav source sample rate differs from device playback rate"
        );
    }

    let format = WavFormat {
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        channels: 1,
    };
    Ok((format, pcm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn capture_header_layout() {
        let header = encode_header(&WavFormat::CAPTURE, 1000);

        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 1032);
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(header[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(header[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(header[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(header[24..28].try_into().unwrap()), 16_000);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 16_000);
        assert_eq!(u16::from_le_bytes(header[32..34].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(header[34..36].try_into().unwrap()), 8);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(&header[40..44], &[0, 0, 0, 0]);
        assert_eq!(&header[44..50], &[0; 6]);
    }

    #[test]
    fn riff_size_tracks_nominal_samples_and_channels() {
        let stereo = WavFormat {
            channels: 2,
            ..WavFormat::CAPTURE
        };
        let header = encode_header(&stereo, 500);
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 1032);
        assert_eq!(u16::from_le_bytes(header[32..34].try_into().unwrap()), 2);
    }

    #[test]
    fn oversized_format_saturates() {
        let format = WavFormat {
            sample_rate: u32::MAX,
            bits_per_sample: 32,
            channels: u16::MAX,
        };

        assert_eq!(format.block_align(), u16::MAX);
        assert_eq!(format.byte_rate(), u32::MAX);

        let header = encode_header(&format, u32::MAX);
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), u32::MAX);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), u32::MAX);
    }

    #[test]
    fn header_decodes_back() {
        let header = encode_header(&WavFormat::SPEECH, 1000);
        let decoded = decode_header(&header).unwrap();

        assert_eq!(decoded.format, WavFormat::SPEECH);
        assert_eq!(decoded.riff_size, 1032);
        assert_eq!(decoded.data_len, 0);
        assert_eq!(WavFormat::SPEECH.byte_rate(), 32_000);
    }

    #[test]
    fn decode_header_rejects_garbage() {
        assert!(decode_header(b"RIFF").is_err());

        let mut header = encode_header(&WavFormat::CAPTURE, 1000);
        header[8..12].copy_from_slice(b"AVI ");
        assert!(decode_header(&header).is_err());
    }

    #[test]
    fn decode_pcm16_mono() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let wav = write_wav(spec, &[0, 256, -256, i16::MAX]);

        let (format, pcm) = decode_pcm16(&wav).unwrap();
        assert_eq!(format, WavFormat::SPEECH);
        assert_eq!(pcm, vec![0x00, 0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn decode_pcm16_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let wav = write_wav(spec, &[100, 300, -1000, 1000]);

        let (_, pcm) = decode_pcm16(&wav).unwrap();
        assert_eq!(pcm, [200i16.to_le_bytes(), 0i16.to_le_bytes()].concat());
    }

    #[test]
    fn decode_pcm16_rejects_float() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.5f32).unwrap();
            writer.finalize().unwrap();
        }

        assert!(decode_pcm16(&cursor.into_inner()).is_err());
    }
}
