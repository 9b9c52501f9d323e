use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CoachError, CoachResult};

/// Captured microphone audio (float PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for an audio input
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Upload sample rate (frames are decimated down to it)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Frame size in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for AudioInputConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Microphone capability
///
/// The live coordinator encodes every frame it receives and pushes it to the
/// remote channel; there is no backpressure in either direction.
#[async_trait]
pub trait AudioInput: Send {
    /// Start capturing; frames arrive on the returned channel until stopped
    async fn start(&mut self) -> CoachResult<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> CoachResult<()>;

    fn is_capturing(&self) -> bool;

    /// Input name for logging
    fn name(&self) -> &str;
}

/// Placeholder for hosts without a microphone
pub struct UnavailableInput;

#[async_trait]
impl AudioInput for UnavailableInput {
    async fn start(&mut self) -> CoachResult<mpsc::Receiver<AudioFrame>> {
        Err(CoachError::UnsupportedCapability(
            "audio capture is not available on this platform".to_string(),
        ))
    }

    async fn stop(&mut self) -> CoachResult<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Streams a WAV file as if it were spoken into a microphone
pub struct WavFileInput {
    path: PathBuf,
    config: AudioInputConfig,
    /// Sleep one frame duration between frames
    realtime: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileInput {
    pub fn new(path: impl AsRef<Path>, config: AudioInputConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            realtime: true,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Emit frames as fast as the receiver accepts them
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Read the whole file and convert it to the target format
    pub fn load_frames(&self) -> CoachResult<Vec<AudioFrame>> {
        let reader = WavReader::open(&self.path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        info!(
            "Loaded {}: {}Hz, {} channels, {} samples",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let whole = AudioFrame {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            timestamp_ms: 0,
        };
        let processed = process_frame(
            whole,
            self.config.target_sample_rate,
            self.config.target_channels,
        );

        let frames_per_chunk =
            (processed.sample_rate as u64 * self.config.frame_duration_ms / 1000) as usize;
        let per_frame = frames_per_chunk * processed.channels as usize;
        let per_frame = per_frame.max(1);

        Ok(processed
            .samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: processed.sample_rate,
                channels: processed.channels,
                timestamp_ms: i as u64 * self.config.frame_duration_ms,
            })
            .collect())
    }
}

#[async_trait]
impl AudioInput for WavFileInput {
    async fn start(&mut self) -> CoachResult<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CoachError::invalid_state("WAV input already started"));
        }

        let frames = self.load_frames()?;
        let (tx, rx) = mpsc::channel(32);
        let capturing = Arc::clone(&self.capturing);
        let pace = Duration::from_millis(self.config.frame_duration_ms);
        let realtime = self.realtime;

        capturing.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            debug!("WAV input task started ({} frames)", frames.len());
            for frame in frames {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
                if realtime {
                    tokio::time::sleep(pace).await;
                }
            }
            capturing.store(false, Ordering::SeqCst);
            debug!("WAV input task finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> CoachResult<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("WAV input task failed: {}", e);
                }
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Downsample and downmix a frame to the upload format
pub fn process_frame(
    frame: AudioFrame,
    target_sample_rate: u32,
    target_channels: u16,
) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != target_channels && target_channels == 1 {
        processed = to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = downsample(processed, target_sample_rate);
    }

    processed
}

/// Decimate by an integer ratio; upsampling is not supported
fn downsample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if target_rate == 0 {
        return frame;
    }
    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let samples: Vec<f32> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples,
        sample_rate: frame.sample_rate / ratio,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Average interleaved channels into one
fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let samples = frame
        .samples
        .chunks_exact(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect();

    AudioFrame {
        samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
