//! Stateless conversion between float PCM and the streaming wire format.
//!
//! Upload frames are 16-bit little-endian PCM, base64-encoded and tagged
//! with a MIME type carrying the sample rate. Returned audio uses the same
//! byte layout, interleaved when it has more than one channel.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CoachError, CoachResult};

/// One encoded chunk ready to push onto a live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    /// Base64-encoded PCM bytes
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Decoded audio, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PlayableBuffer {
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Playback length in seconds on the output clock
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        let count = self.channels.len().max(1) as f32;
        (0..self.frame_count())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / count)
            .collect()
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Pack float samples in [-1.0, 1.0] as 16-bit PCM for upload
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> WireBlob {
    let pcm_bytes: Vec<u8> = samples
        .iter()
        .map(|&s| float_to_i16(s))
        .flat_map(|s| s.to_le_bytes())
        .collect();

    WireBlob {
        data: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
        mime_type: pcm_mime_type(sample_rate),
    }
}

/// Inverse of [`encode_frame`] for interleaved PCM bytes
///
/// A trailing odd byte or incomplete frame is dropped.
pub fn decode_to_buffer(
    wire_bytes: &[u8],
    sample_rate: u32,
    channel_count: u16,
) -> CoachResult<PlayableBuffer> {
    if channel_count == 0 {
        return Err(CoachError::audio("channel count must be at least 1"));
    }
    if sample_rate == 0 {
        return Err(CoachError::audio("sample rate must be positive"));
    }

    let samples: Vec<i16> = wire_bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let channels = channel_count as usize;
    let frame_count = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frame_count); channels];

    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in frame.iter().enumerate() {
            out[channel].push(sample as f32 / 32768.0);
        }
    }

    Ok(PlayableBuffer {
        channels: out,
        sample_rate,
    })
}

pub fn decode_base64(data: &str) -> CoachResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CoachError::audio(format!("invalid base64 audio payload: {}", e)))
}

fn float_to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
