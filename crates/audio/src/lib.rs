mod capture;
mod pcm;

pub use capture::AudioCapture;
pub use pcm::encode_pcm;

/// Wire sample rate for the recognition service (16kHz mono linear16).
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per encoded block handed to the stream client.
pub const BLOCK_SAMPLES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The input device could not be acquired: none exists, its config
    /// could not be read, or the capture stream failed to build or start.
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("stream error: {0}")]
    StreamError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;
