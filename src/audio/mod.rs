pub mod capture;
pub mod codec;
pub mod input;
pub mod output;

pub use capture::{SpeechCapture, UnsupportedSpeechCapture};
pub use codec::{
    decode_base64, decode_to_buffer, encode_frame, pcm_mime_type, PlayableBuffer, WireBlob,
};
pub use input::{
    process_frame, AudioFrame, AudioInput, AudioInputConfig, UnavailableInput, WavFileInput,
};
pub use output::{
    AudioOutputScheduler, PlaybackQueue, ScheduledPlayback, SourceId, WavTimelineOutput,
};
