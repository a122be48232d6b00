//! CPAL audio backend
//!
//! Opens a capture stream and a playback stream and runs the live graph
//! between them.
//!
//! ```text
//! ┌──────────────────┐   push()   ┌─────────────────────┐
//! │  Input callback  │───────────►│  Sample ring (SPSC) │
//! │ (capture thread) │            └──────────┬──────────┘
//! └──────────────────┘                       │ read_chunk()
//!                                            ▼
//! ┌──────────────────┐   commit   ┌─────────────────────┐
//! │  Control thread  │───────────►│  Output callback    │
//! │   (LiveGraph)    │  (rtrb)    │ (owns GraphRenderer)│
//! └──────────────────┘            └─────────────────────┘
//! ```
//!
//! The output callback owns its state outright; nothing on the render path
//! takes a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, SampleFormat, SampleRate, Stream, StreamConfig,
    SupportedStreamConfig, SupportedStreamConfigRange,
};

use super::config::AudioConfig;
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::graph::{GraphRenderer, LiveGraph};
use crate::types::{AudioBuffer, RenderTimestamp, Sample, StreamFormat, MAX_CHANNELS};

/// Ring capacity in device buffers of input headroom
const INPUT_RING_BUFFERS: usize = 4;

/// Callback counters shared with the control thread
#[derive(Debug, Default)]
pub struct StreamStats {
    callbacks: AtomicU64,
    frames_rendered: AtomicU64,
    /// Output frames rendered without captured input
    underruns: AtomicU64,
    /// Captured samples dropped because the ring was full
    overruns: AtomicU64,
}

impl StreamStats {
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Keeps both streams alive; drop to stop audio
pub struct AudioHandle {
    _input_stream: Stream,
    _output_stream: Stream,
    input_format: StreamFormat,
    output_format: StreamFormat,
    buffer_size: u32,
    stats: Arc<StreamStats>,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.output_format.sample_rate
    }

    pub fn input_format(&self) -> StreamFormat {
        self.input_format
    }

    pub fn output_format(&self) -> StreamFormat {
        self.output_format
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.output_format.sample_rate as f32) * 1000.0
    }

    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }
}

impl std::fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioHandle")
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

/// Running audio system plus the control half of its graph
pub struct AudioSystemResult {
    pub handle: AudioHandle,
    pub graph: LiveGraph,
}

/// Open both devices, build the graph and start streaming
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let input_device = resolve_device(config.input_device.as_ref(), Direction::Input)?;
    let output_device = resolve_device(config.output_device.as_ref(), Direction::Output)?;

    log::info!(
        "Using input device: {}",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    log::info!(
        "Using output device: {}",
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let input_supported = get_stream_config(&input_device, Direction::Input, config.sample_rate)?;
    let output_supported =
        get_stream_config(&output_device, Direction::Output, config.sample_rate)?;

    let input_rate = input_supported.sample_rate().0;
    let output_rate = output_supported.sample_rate().0;
    if input_rate != output_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_rate,
            output: output_rate,
        });
    }

    let buffer_size = config.buffer_size.frames();
    let input_format = StreamFormat::new(input_supported.channels() as usize, input_rate);
    let output_format = StreamFormat::new(output_supported.channels() as usize, output_rate);

    let input_config = StreamConfig {
        channels: input_supported.channels(),
        sample_rate: input_supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let output_config = StreamConfig {
        channels: output_supported.channels(),
        sample_rate: output_supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: input {}, output {}, {} frames (~{:.1}ms latency)",
        input_format,
        output_format,
        buffer_size,
        config.buffer_size.latency_ms(output_rate)
    );

    let (graph, renderer) = LiveGraph::new(input_format, output_format, buffer_size as usize);

    let ring_capacity = buffer_size as usize * input_format.channels * INPUT_RING_BUFFERS;
    let (ring_producer, ring_consumer) = rtrb::RingBuffer::<Sample>::new(ring_capacity);
    log::debug!("Input ring created with capacity {} samples", ring_capacity);

    let stats = Arc::new(StreamStats::default());
    let callback_state = OutputCallbackState::new(
        renderer,
        ring_consumer,
        input_format.channels,
        output_format.channels,
        stats.clone(),
    );

    let input_stream = build_input_stream(&input_device, &input_config, ring_producer, stats.clone())?;
    let output_stream = build_output_stream(&output_device, &output_config, callback_state)?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;

    log::info!("Audio streams started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _input_stream: input_stream,
            _output_stream: output_stream,
            input_format,
            output_format,
            buffer_size,
            stats,
        },
        graph,
    })
}

/// State owned by the output callback
///
/// Buffers are sized up front; `fill` renders in chunks of at most the
/// graph's frame limit.
pub struct OutputCallbackState {
    renderer: GraphRenderer,
    ring: rtrb::Consumer<Sample>,
    input: AudioBuffer,
    output: AudioBuffer,
    interleaved: Vec<Sample>,
    input_channels: usize,
    output_channels: usize,
    sample_time: u64,
    stats: Arc<StreamStats>,
}

impl OutputCallbackState {
    pub fn new(
        renderer: GraphRenderer,
        ring: rtrb::Consumer<Sample>,
        input_channels: usize,
        output_channels: usize,
        stats: Arc<StreamStats>,
    ) -> Self {
        let max_frames = renderer.max_frames();
        Self {
            renderer,
            ring,
            input: AudioBuffer::new(input_channels, max_frames),
            output: AudioBuffer::new(output_channels, max_frames),
            interleaved: vec![0.0; max_frames * input_channels],
            input_channels,
            output_channels,
            sample_time: 0,
            stats,
        }
    }

    /// Render one device buffer of interleaved output samples
    pub fn fill(&mut self, data: &mut [Sample]) {
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);
        if self.output_channels == 0 || self.input_channels == 0 {
            data.fill(0.0);
            return;
        }

        let total_frames = data.len() / self.output_channels;
        let max_frames = self.renderer.max_frames().max(1);
        let mut offset = 0;

        while offset < total_frames {
            let frames = (total_frames - offset).min(max_frames);
            let read = self.read_input(frames);
            if read < frames {
                self.stats
                    .underruns
                    .fetch_add((frames - read) as u64, Ordering::Relaxed);
            }

            self.input.set_frames(frames);
            self.input
                .read_interleaved(&self.interleaved[..frames * self.input_channels], self.input_channels, frames);
            self.output.set_frames(frames);
            self.renderer.process(
                &self.input,
                &mut self.output,
                frames,
                RenderTimestamp::new(self.sample_time),
            );
            self.sample_time += frames as u64;

            let start = offset * self.output_channels;
            let end = (offset + frames) * self.output_channels;
            self.output
                .write_interleaved(&mut data[start..end], self.output_channels, frames);
            offset += frames;
        }

        // Trailing partial frame, if the device ever hands us one
        data[total_frames * self.output_channels..].fill(0.0);
        self.stats
            .frames_rendered
            .fetch_add(total_frames as u64, Ordering::Relaxed);
    }

    /// Pull up to `frames` whole frames from the ring into the scratch buffer
    ///
    /// Missing frames are zeroed. Returns the number of frames captured.
    fn read_input(&mut self, frames: usize) -> usize {
        let wanted = frames * self.input_channels;
        let available = (self.ring.slots().min(wanted) / self.input_channels) * self.input_channels;

        if available > 0 {
            if let Ok(chunk) = self.ring.read_chunk(available) {
                let (first, second) = chunk.as_slices();
                self.interleaved[..first.len()].copy_from_slice(first);
                self.interleaved[first.len()..first.len() + second.len()].copy_from_slice(second);
                chunk.commit_all();
            }
        }
        self.interleaved[available..wanted].fill(0.0);
        available / self.input_channels
    }
}

/// Pick the best config from a device's supported ranges
///
/// F32 is required. Input prefers mono, output prefers stereo, and the
/// target rate is used when any range covers it.
fn select_config(
    supported: &[SupportedStreamConfigRange],
    direction: Direction,
    target_sample_rate: u32,
) -> AudioResult<SupportedStreamConfig> {
    let first = supported.first().ok_or_else(|| {
        AudioError::ConfigError(format!("No supported {} configurations", direction))
    })?;

    let usable: Vec<&SupportedStreamConfigRange> = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() > 0 && c.channels() as usize <= MAX_CHANNELS)
        .collect();
    if usable.is_empty() {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} device offers {:?}, f32 required",
            direction,
            first.sample_format()
        )));
    }

    let covers_rate = |c: &&&SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };
    let preferred = |channels: u16| match direction {
        Direction::Input => channels == 1,
        Direction::Output => channels == 2,
    };
    let acceptable = |channels: u16| match direction {
        Direction::Input => true,
        Direction::Output => channels >= 2,
    };

    let best = usable
        .iter()
        .filter(covers_rate)
        .find(|c| preferred(c.channels()))
        .or_else(|| {
            usable
                .iter()
                .filter(covers_rate)
                .filter(|c| acceptable(c.channels()))
                .min_by_key(|c| c.channels())
        })
        .or_else(|| usable.iter().find(|c| preferred(c.channels())))
        .or_else(|| usable.iter().min_by_key(|c| c.channels()))
        .ok_or_else(|| {
            AudioError::ConfigError(format!("No suitable {} configuration found", direction))
        })?;

    let sample_rate = if target_sample_rate >= best.min_sample_rate().0
        && target_sample_rate <= best.max_sample_rate().0
    {
        SampleRate(target_sample_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio {} device doesn't support {}Hz, falling back to {}Hz",
            direction,
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok((*best).clone().with_sample_rate(sample_rate))
}

fn get_stream_config(
    device: &cpal::Device,
    direction: Direction,
    target_sample_rate: u32,
) -> AudioResult<SupportedStreamConfig> {
    let supported: Vec<SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };
    select_config(&supported, direction, target_sample_rate)
}

/// Build the capture stream feeding the sample ring
fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: rtrb::Producer<Sample>,
    stats: Arc<StreamStats>,
) -> AudioResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for (i, &sample) in data.iter().enumerate() {
                    if producer.push(sample).is_err() {
                        stats
                            .overruns
                            .fetch_add((data.len() - i) as u64, Ordering::Relaxed);
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Build the playback stream that owns the graph renderer
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: OutputCallbackState,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                state.fill(data);
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
