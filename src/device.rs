//! CPAL output device discovery and playback.
//!
//! [`CpalDevice`] finds an output device; [`CpalDevice::start`] moves a
//! [`RenderEngine`] into the device callback, which then pulls blocks
//! straight from the graph at the device's pace.
//!
//! ```no_run
//! use schwebung::device::CpalDevice;
//! use schwebung::synth::{FeedbackSynth, SynthSettings};
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let (synth, engine) = FeedbackSynth::build(device.engine_config(), SynthSettings::default()).unwrap();
//! let stream = device.start(engine).unwrap();
//! synth.activate().unwrap();
//! # drop(stream);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use alloc::string::String;
use alloc::vec::Vec;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use tracing::{error, info};

use crate::engine::{EngineConfig, RenderEngine};
use crate::error::EngineError;

/// Frames of scratch space reserved for integer sample formats.
const SCRATCH_FRAMES: usize = 8192;

/// A discovered audio output device.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,

    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// The system's default output device, if there is one.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        Self::from_device(device)
    }

    /// Every output device that reports a usable default config.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Engine settings matching this device.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.sample_rate).with_channels(self.channels as usize)
    }

    /// Hand `engine` to the device and start playing.
    ///
    /// The engine has to run at the device's sample rate. Playback stops when
    /// the returned [`OutputStream`] is dropped.
    pub fn start(&self, engine: RenderEngine) -> Result<OutputStream, EngineError> {
        if engine.sample_rate() != self.sample_rate {
            return Err(EngineError::Device(format!(
                "engine runs at {} Hz but {} runs at {} Hz",
                engine.sample_rate(),
                self.name,
                self.sample_rate
            )));
        }

        let status = Arc::new(StreamStatus::default());
        let stream_config = self.config.config();
        let stream = build_stream(
            &self.device,
            self.config.sample_format(),
            &stream_config,
            engine,
            status.clone(),
        )
        .map_err(|e| EngineError::Device(e.to_string()))?;
        stream.play().map_err(|e| EngineError::Device(e.to_string()))?;

        info!(device = %self.name, sample_rate = self.sample_rate, channels = self.channels, "output stream started");
        Ok(OutputStream { _stream: stream, status })
    }
}

#[derive(Default)]
struct StreamStatus {
    frames_played: AtomicUsize,
    render_failed: AtomicBool,
}

/// A running output stream. Dropping it stops playback.
pub struct OutputStream {
    _stream: cpal::Stream,
    status: Arc<StreamStatus>,
}

impl OutputStream {
    /// Frames handed to the device so far.
    #[inline]
    pub fn frames_played(&self) -> usize {
        self.status.frames_played.load(Ordering::Relaxed)
    }

    /// Whether the engine has refused to render (it was closed).
    #[inline]
    pub fn render_failed(&self) -> bool {
        self.status.render_failed.load(Ordering::Relaxed)
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut engine: RenderEngine,
    status: Arc<StreamStatus>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = (stream_config.channels as usize).max(1);
    let on_error = |err: cpal::StreamError| error!(?err, "output stream error");

    match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| {
                if engine.render_interleaved(data, channels).is_err() {
                    status.render_failed.store(true, Ordering::Relaxed);
                }
                status.frames_played.fetch_add(data.len() / channels, Ordering::Relaxed);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];
            device.build_output_stream(
                stream_config,
                move |data: &mut [i16], _| {
                    let ok = render_chunked(&mut engine, &mut scratch, data, channels, |s| {
                        (s.max(-1.0).min(1.0) * i16::MAX as f32) as i16
                    });
                    if !ok {
                        status.render_failed.store(true, Ordering::Relaxed);
                    }
                    status.frames_played.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                on_error,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];
            device.build_output_stream(
                stream_config,
                move |data: &mut [u16], _| {
                    let ok = render_chunked(&mut engine, &mut scratch, data, channels, |s| {
                        ((s.max(-1.0).min(1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
                    });
                    if !ok {
                        status.render_failed.store(true, Ordering::Relaxed);
                    }
                    status.frames_played.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                on_error,
                None,
            )
        }
        _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
    }
}

/// Render `data` through the float `scratch` buffer, one scratch-sized chunk
/// at a time. `scratch.len()` must be a multiple of `channels`.
///
/// Returns `false` if the engine refused any chunk; that chunk is silence.
fn render_chunked<T>(
    engine: &mut RenderEngine,
    scratch: &mut [f32],
    data: &mut [T],
    channels: usize,
    convert: impl Fn(f32) -> T,
) -> bool {
    let mut ok = true;
    for chunk in data.chunks_mut(scratch.len()) {
        let floats = &mut scratch[..chunk.len()];
        ok &= engine.render_interleaved(floats, channels).is_ok();
        for (out, &s) in chunk.iter_mut().zip(floats.iter()) {
            *out = convert(s);
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SignalGraph;
    use crate::nodes::{ConstantSource, Gain};

    fn dc_engine(level: f32) -> (RenderEngine, crate::engine::Controller) {
        let mut g = SignalGraph::new();
        let dc = g.add("dc", ConstantSource::new(1.0));
        let gain = g.add("level", Gain::new(level));
        g.connect(dc, gain).unwrap();
        g.set_output(gain).unwrap();
        let (engine, controller) = RenderEngine::new(g, EngineConfig::new(48_000)).unwrap();
        controller.activate().unwrap();
        (engine, controller)
    }

    #[test]
    fn device_buffer_larger_than_scratch_is_filled_in_chunks() {
        let (mut engine, _controller) = dc_engine(0.5);
        // 3 stereo frames of scratch against a 200-frame device buffer
        let mut scratch = [0.0f32; 6];
        let mut data = [0i16; 400];

        let ok = render_chunked(&mut engine, &mut scratch, &mut data, 2, |s| (s * i16::MAX as f32) as i16);

        assert!(ok);
        assert!(data.iter().all(|&s| s == (0.5 * i16::MAX as f32) as i16));
    }

    #[test]
    fn closed_engine_reports_failure_and_writes_silence() {
        let (mut engine, controller) = dc_engine(0.5);
        controller.close();

        let mut scratch = [1.0f32; 8];
        let mut data = [1u16; 20];
        let ok = render_chunked(&mut engine, &mut scratch, &mut data, 2, |s| {
            ((s + 1.0) * 0.5 * u16::MAX as f32) as u16
        });

        assert!(!ok);
        assert!(data.iter().all(|&s| s == (0.5 * u16::MAX as f32) as u16));
    }
}
