//! Gapless playback scheduling for synthesized audio.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use super::codec::PlayableBuffer;
use crate::error::CoachResult;

pub type SourceId = u64;

/// Output audio capability (the platform's audio graph)
///
/// Times are seconds on the output device clock.
pub trait AudioOutputScheduler: Send {
    /// Current position of the output clock
    fn now(&self) -> f64;

    /// Queue `buffer` to start playing at `start_at`
    fn schedule_buffer(&mut self, buffer: PlayableBuffer, start_at: f64) -> CoachResult<SourceId>;

    /// Stop a scheduled or playing source; unknown ids are ignored
    fn stop(&mut self, id: SourceId);

    /// Release the device; must be safe to call more than once
    fn release(&mut self) -> CoachResult<()>;

    fn name(&self) -> &str;
}

/// Where a buffer landed on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub id: SourceId,
    pub start: f64,
    pub end: f64,
}

/// Tracks live sources and the `next_start_time` cursor
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    next_start_time: f64,
    /// source id -> end time
    sources: HashMap<SourceId, f64>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule right after the previous chunk, never in the past
    pub fn schedule(
        &mut self,
        output: &mut dyn AudioOutputScheduler,
        buffer: PlayableBuffer,
    ) -> CoachResult<ScheduledPlayback> {
        let now = output.now();
        self.prune(now);

        let start = self.next_start_time.max(now);
        let end = start + buffer.duration_secs();
        let id = output.schedule_buffer(buffer, start)?;

        self.next_start_time = end;
        self.sources.insert(id, end);

        debug!("Scheduled source {} at {:.3}s..{:.3}s", id, start, end);

        Ok(ScheduledPlayback { id, start, end })
    }

    /// Stop everything and rewind the cursor; returns how many sources were stopped
    pub fn interrupt(&mut self, output: &mut dyn AudioOutputScheduler) -> usize {
        let stopped = self.sources.len();
        for (id, _) in self.sources.drain() {
            output.stop(id);
        }
        self.next_start_time = 0.0;
        stopped
    }

    /// Forget all state without touching a device
    pub fn clear(&mut self) {
        self.sources.clear();
        self.next_start_time = 0.0;
    }

    /// Drop sources that finished playing before `now`
    pub fn prune(&mut self, now: f64) {
        self.sources.retain(|_, end| *end > now);
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }
}

enum OutputClock {
    Wall(Instant),
    Manual(f64),
}

struct TimelineSource {
    start_frame: usize,
    samples: Vec<f32>,
}

/// Renders scheduled buffers onto a mono timeline, optionally written to WAV
///
/// Stands in for a sound card in headless runs and tests.
pub struct WavTimelineOutput {
    sample_rate: u32,
    clock: OutputClock,
    next_id: SourceId,
    sources: BTreeMap<SourceId, TimelineSource>,
    path: Option<PathBuf>,
    released: bool,
}

impl WavTimelineOutput {
    /// Output whose clock follows wall time from construction
    pub fn realtime(sample_rate: u32) -> Self {
        Self::with_clock(sample_rate, OutputClock::Wall(Instant::now()))
    }

    /// Output whose clock only moves via [`advance`](Self::advance)
    pub fn manual(sample_rate: u32) -> Self {
        Self::with_clock(sample_rate, OutputClock::Manual(0.0))
    }

    fn with_clock(sample_rate: u32, clock: OutputClock) -> Self {
        Self {
            sample_rate,
            clock,
            next_id: 1,
            sources: BTreeMap::new(),
            path: None,
            released: false,
        }
    }

    /// Write the rendered timeline to `path` on release
    pub fn write_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Move a manual clock forward; no-op for wall clocks
    pub fn advance(&mut self, secs: f64) {
        if let OutputClock::Manual(now) = &mut self.clock {
            *now += secs;
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mix every scheduled source into one sample vector
    pub fn render(&self) -> Vec<f32> {
        let len = self
            .sources
            .values()
            .map(|s| s.start_frame + s.samples.len())
            .max()
            .unwrap_or(0);

        let mut mix = vec![0.0f32; len];
        for source in self.sources.values() {
            for (i, sample) in source.samples.iter().enumerate() {
                mix[source.start_frame + i] += sample;
            }
        }
        mix
    }

    fn now_frame(&self) -> usize {
        (self.now() * self.sample_rate as f64).round() as usize
    }
}

impl AudioOutputScheduler for WavTimelineOutput {
    fn now(&self) -> f64 {
        match &self.clock {
            OutputClock::Wall(origin) => origin.elapsed().as_secs_f64(),
            OutputClock::Manual(now) => *now,
        }
    }

    fn schedule_buffer(&mut self, buffer: PlayableBuffer, start_at: f64) -> CoachResult<SourceId> {
        let id = self.next_id;
        self.next_id += 1;

        // Sources at a different rate are placed by time, not resampled
        let start_frame = (start_at.max(0.0) * self.sample_rate as f64).round() as usize;
        self.sources.insert(
            id,
            TimelineSource {
                start_frame,
                samples: buffer.to_mono(),
            },
        );
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        let now_frame = self.now_frame();
        let Some(start_frame) = self.sources.get(&id).map(|s| s.start_frame) else {
            return;
        };
        if start_frame >= now_frame {
            self.sources.remove(&id);
        } else if let Some(source) = self.sources.get_mut(&id) {
            source.samples.truncate(now_frame - start_frame);
        }
    }

    fn release(&mut self) -> CoachResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        let rendered = self.render();
        for sample in &rendered {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;

        info!(
            "Wrote {:.1}s of synthesized audio to {}",
            rendered.len() as f64 / self.sample_rate as f64,
            path.display()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-timeline"
    }
}
