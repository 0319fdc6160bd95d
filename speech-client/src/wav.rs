//! Minimal RIFF/WAVE support for linear PCM.
//!
//! Speech services hand back raw L16 PCM; everything downstream works on
//! complete WAV files, so this module wraps PCM in a canonical 44-byte header
//! and parses headers back when segments are validated and concatenated.

use std::ops::Range;
use thiserror::Error;

/// Size of the canonical header written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WavError {
    #[error("not a RIFF/WAVE file")]
    NotWave,

    #[error("truncated {0} chunk")]
    Truncated(&'static str),

    #[error("missing {0} chunk")]
    MissingChunk(&'static str),

    #[error("unsupported audio format tag {0} (only PCM is supported)")]
    UnsupportedFormat(u16),

    #[error("invalid format parameters: {0}")]
    InvalidFormat(String),
}

/// Layout of linear PCM samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for PcmFormat {
    /// Gemini's native output: 24 kHz mono 16-bit.
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl PcmFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Duration in milliseconds of `data_len` bytes of PCM in this format.
    pub fn duration_ms(&self, data_len: usize) -> f64 {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        data_len as f64 * 1000.0 / byte_rate as f64
    }

    fn validate(&self) -> Result<(), WavError> {
        if self.sample_rate == 0 {
            return Err(WavError::InvalidFormat("sample rate is zero".into()));
        }
        if self.channels == 0 {
            return Err(WavError::InvalidFormat("channel count is zero".into()));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(WavError::InvalidFormat(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Parse sample rate and bit depth from a MIME type such as
/// `audio/L16;codec=pcm;rate=24000`. Unknown or missing parameters fall back
/// to the defaults.
pub fn parse_pcm_mime(mime_type: &str) -> PcmFormat {
    let mut format = PcmFormat::default();

    for param in mime_type.split(';') {
        let param = param.trim();
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("rate") {
                if let Ok(rate) = value.trim().parse() {
                    format.sample_rate = rate;
                }
            }
        } else if let Some(bits) = param
            .strip_prefix("audio/L")
            .or_else(|| param.strip_prefix("audio/l"))
        {
            if let Ok(bits) = bits.parse() {
                format.bits_per_sample = bits;
            }
        }
    }

    format
}

/// Canonical 44-byte header for `data_len` bytes of PCM.
pub fn wav_header(format: PcmFormat, data_len: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(WAV_HEADER_LEN);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&36u32.saturating_add(data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    out
}

/// Wrap raw little-endian PCM in a WAV container.
pub fn encode_wav(format: PcmFormat, pcm: &[u8]) -> Vec<u8> {
    let mut out = wav_header(format, pcm.len() as u32);
    out.extend_from_slice(pcm);
    out
}

/// A WAV file containing `duration_ms` of digital silence.
pub fn silence(format: PcmFormat, duration_ms: u64) -> Vec<u8> {
    let frames = format.sample_rate as u64 * duration_ms / 1000;
    let len = frames as usize * format.block_align() as usize;
    encode_wav(format, &vec![0u8; len])
}

/// Parsed view of a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub format: PcmFormat,
    /// Byte range of the PCM samples within the file.
    pub data: Range<usize>,
}

impl WavInfo {
    pub fn data_len(&self) -> usize {
        self.data.end - self.data.start
    }

    pub fn duration_ms(&self) -> f64 {
        self.format.duration_ms(self.data_len())
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Walk the RIFF chunks of a WAV file and locate its format and sample data.
pub fn parse_wav(bytes: &[u8]) -> Result<WavInfo, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut format = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4) as usize;
        let body = pos + 8;

        match id {
            b"fmt " => {
                if size < 16 || body + size > bytes.len() {
                    return Err(WavError::Truncated("fmt"));
                }
                let tag = read_u16(bytes, body);
                if tag != WAVE_FORMAT_PCM && tag != WAVE_FORMAT_EXTENSIBLE {
                    return Err(WavError::UnsupportedFormat(tag));
                }
                let parsed = PcmFormat {
                    channels: read_u16(bytes, body + 2),
                    sample_rate: read_u32(bytes, body + 4),
                    bits_per_sample: read_u16(bytes, body + 14),
                };
                parsed.validate()?;
                format = Some(parsed);
            }
            b"data" => {
                let format = format.ok_or(WavError::MissingChunk("fmt"))?;
                if body + size > bytes.len() {
                    return Err(WavError::Truncated("data"));
                }
                if size % format.block_align() as usize != 0 {
                    return Err(WavError::InvalidFormat(format!(
                        "data length {} is not a whole number of frames",
                        size
                    )));
                }
                return Ok(WavInfo {
                    format,
                    data: body..body + size,
                });
            }
            _ => {}
        }

        // Chunks are word aligned
        pos = body + size + (size & 1);
    }

    Err(WavError::MissingChunk("data"))
}
