//! Microphone capture feeding fixed-size encoded PCM blocks to a sink.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::Mutex;
use std::thread::JoinHandle;

use crate::{encode_pcm, AudioError, BLOCK_SAMPLES, SAMPLE_RATE};

/// Owns the default input device for the lifetime of a session.
///
/// Captured samples are downmixed to mono, resampled to 16kHz when the
/// device runs at a different rate, assembled into 4096-sample blocks, and
/// delivered to the sink as encoded PCM frames from the audio thread. The
/// sink must not block: if the consumer falls behind the capture cadence the
/// device driver may coalesce or drop blocks, and this component does not
/// attempt to correct that.
pub struct AudioCapture {
    stop_tx: crossbeam_channel::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AudioCapture {
    /// Acquire the default input device and start delivering blocks.
    ///
    /// Fails with [`AudioError::DeviceUnavailable`] if no input device
    /// exists or the stream cannot be built. cpal streams are not `Send`,
    /// so the stream lives and dies on a dedicated thread; errors during
    /// setup are reported back synchronously.
    pub fn start<F>(sink: F) -> crate::Result<Self>
    where
        F: Fn(Vec<u8>) + Send + 'static,
    {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<crate::Result<()>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            let stream = match build_capture_stream(sink) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Block until stop() fires or the handle is dropped.
            let _ = stop_rx.recv();
            drop(stream);
            tracing::debug!("capture stream released");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                handle: Mutex::new(Some(handle)),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::StreamError(
                "capture thread exited before reporting readiness".into(),
            )),
        }
    }

    /// Release the device and halt block delivery.
    ///
    /// Idempotent and safe to call from any thread, including error
    /// callbacks that did not start the capture.
    pub fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .expect("capture handle mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = self.stop_tx.send(());
            let _ = handle.join();
            tracing::info!("audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_capture_stream<F>(sink: F) -> crate::Result<cpal::Stream>
where
    F: Fn(Vec<u8>) + Send + 'static,
{
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceUnavailable("no input device found".into()))?;
    let config = device
        .default_input_config()
        .map_err(|e| AudioError::DeviceUnavailable(format!("failed to get default config: {e}")))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    tracing::info!(
        device = %device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "starting audio capture"
    );

    let build_failed =
        |e: cpal::BuildStreamError| AudioError::DeviceUnavailable(format!("failed to build capture stream: {e}"));

    let mut assembler = BlockAssembler::new();
    let stream = match config.sample_format() {
        SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    let samples = prepare_samples(data, channels, sample_rate);
                    assembler.push(&samples, |block| sink(encode_pcm(block)));
                },
                |err| tracing::error!("audio stream error: {}", err),
                None,
            )
            .map_err(build_failed)?,
        SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _| {
                    let float: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let samples = prepare_samples(&float, channels, sample_rate);
                    assembler.push(&samples, |block| sink(encode_pcm(block)));
                },
                |err| tracing::error!("audio stream error: {}", err),
                None,
            )
            .map_err(build_failed)?,
        format => {
            return Err(AudioError::DeviceUnavailable(format!(
                "unsupported sample format: {format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::DeviceUnavailable(format!("failed to start stream: {e}")))?;

    Ok(stream)
}

fn prepare_samples(samples: &[f32], channels: usize, device_rate: u32) -> Vec<f32> {
    let mono = if channels > 1 {
        to_mono(samples, channels)
    } else {
        samples.to_vec()
    };
    if device_rate != SAMPLE_RATE {
        resample_linear(&mono, device_rate, SAMPLE_RATE)
    } else {
        mono
    }
}

fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    let inv_channels = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * inv_channels)
        .collect()
}

/// Stateless linear interpolation resampling.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx.fract() as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }
    output
}

/// Accumulates variable-size callback buffers into fixed 4096-sample blocks.
struct BlockAssembler {
    buf: Vec<f32>,
}

impl BlockAssembler {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(BLOCK_SAMPLES * 2),
        }
    }

    fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        self.buf.extend_from_slice(samples);
        while self.buf.len() >= BLOCK_SAMPLES {
            let block: Vec<f32> = self.buf.drain(..BLOCK_SAMPLES).collect();
            emit(&block);
        }
    }
}
