//! Render-side bridge between parameter snapshots and the engine
//!
//! [`RenderBridge::render`] runs once per buffer inside the audio callback.
//! It takes a parameter snapshot, drives the engine and turns every failure
//! into silence plus a counter in [`RenderStats`]. Nothing here allocates,
//! locks, or logs; the control side reads the counters and reports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{AudioBuffer, RenderTimestamp};

use super::engine::{DenoiseEngine, EngineConfig, EngineFault, ProcessStatus};
use super::error::EffectResult;
use super::params::ParameterStore;

/// Outcome of one render call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Engine output written
    Rendered,
    /// Bypass set; input copied to output
    Bypassed,
    /// Engine failed; output zeroed for this buffer
    Silenced(EngineFault),
    /// More frames than the allocated maximum; output zeroed
    TooManyFrames,
    /// Resources not allocated; output zeroed
    NotAllocated,
    /// Buffer shape differs from the allocated format; output zeroed
    FormatMismatch,
}

/// Counters published by the render path
#[derive(Debug, Default)]
pub struct RenderStats {
    rendered: AtomicU64,
    failures: AtomicU64,
    last_fault: AtomicU64,
    last_sample_time: AtomicU64,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers rendered or bypassed successfully
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    /// Buffers silenced because the engine failed
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Most recent engine fault, if any
    pub fn last_fault(&self) -> Option<EngineFault> {
        EngineFault::from_code(self.last_fault.load(Ordering::Acquire))
    }

    /// Sample time of the most recent render call
    pub fn last_sample_time(&self) -> u64 {
        self.last_sample_time.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_fault(&self, fault: EngineFault) {
        self.last_fault.store(fault.code(), Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Release);
    }
}

/// Owns the engine on behalf of an effect node
pub struct RenderBridge {
    engine: Box<dyn DenoiseEngine>,
    params: Arc<ParameterStore>,
    stats: Arc<RenderStats>,
    config: Option<EngineConfig>,
    /// Input copy for in-place rendering
    scratch: Option<AudioBuffer>,
}

impl RenderBridge {
    pub fn new(engine: Box<dyn DenoiseEngine>, params: Arc<ParameterStore>) -> Self {
        Self {
            engine,
            params,
            stats: Arc::new(RenderStats::new()),
            config: None,
            scratch: None,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    pub fn is_allocated(&self) -> bool {
        self.config.is_some()
    }

    pub fn latency_samples(&self) -> u32 {
        self.engine.latency_samples()
    }

    /// Allocate the engine and scratch storage (control thread)
    pub fn allocate(&mut self, config: EngineConfig) -> EffectResult<()> {
        self.engine.allocate(config)?;
        self.scratch = Some(AudioBuffer::new(config.channels, config.max_frames));
        self.config = Some(config);
        Ok(())
    }

    /// Release the engine and scratch storage (control thread)
    pub fn deallocate(&mut self) {
        if self.config.take().is_some() {
            self.engine.deallocate();
        }
        self.scratch = None;
    }

    /// Render `frames` frames of `input` into `output`
    ///
    /// Real-time safe. Every non-audible status leaves the first `frames`
    /// frames of `output` zeroed.
    pub fn render(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        timestamp: RenderTimestamp,
    ) -> RenderStatus {
        let Some(config) = self.config else {
            output.silence(frames);
            return RenderStatus::NotAllocated;
        };
        if frames > config.max_frames {
            output.silence(frames);
            return RenderStatus::TooManyFrames;
        }
        if input.channel_count() != config.channels
            || output.channel_count() != config.channels
            || input.frames() < frames
            || output.frames() < frames
        {
            output.silence(frames);
            return RenderStatus::FormatMismatch;
        }

        self.stats
            .last_sample_time
            .store(timestamp.sample_time, Ordering::Relaxed);

        let snapshot = self.params.snapshot();
        if snapshot.bypassed {
            output.copy_from(input, frames);
            self.stats.rendered.fetch_add(1, Ordering::Relaxed);
            return RenderStatus::Bypassed;
        }

        let status = match self.engine.process(input, output, frames, &snapshot) {
            ProcessStatus::Ok if !is_finite(output, frames) => {
                ProcessStatus::Failed(EngineFault::NonFiniteOutput)
            }
            status => status,
        };

        match status {
            ProcessStatus::Ok => {
                self.stats.rendered.fetch_add(1, Ordering::Relaxed);
                RenderStatus::Rendered
            }
            ProcessStatus::Failed(fault) => {
                output.silence(frames);
                self.stats.record_fault(fault);
                RenderStatus::Silenced(fault)
            }
        }
    }

    /// Render with the same buffer as input and output
    ///
    /// Uses the scratch buffer allocated alongside the engine.
    pub fn render_in_place(
        &mut self,
        buffer: &mut AudioBuffer,
        frames: usize,
        timestamp: RenderTimestamp,
    ) -> RenderStatus {
        let Some(mut scratch) = self.scratch.take() else {
            buffer.silence(frames);
            return RenderStatus::NotAllocated;
        };
        scratch.set_frames(frames);
        scratch.copy_from(buffer, frames);
        let status = self.render(&scratch, buffer, frames, timestamp);
        self.scratch = Some(scratch);
        status
    }
}

fn is_finite(buffer: &AudioBuffer, frames: usize) -> bool {
    (0..buffer.channel_count()).all(|c| buffer.channel(c)[..frames].iter().all(|s| s.is_finite()))
}

impl Drop for RenderBridge {
    fn drop(&mut self) {
        self.deallocate();
    }
}

/// Render entry point of an allocated node
///
/// Borrowed from [`EffectNode::render_block`](super::node::EffectNode::render_block);
/// only exists while resources are allocated.
pub struct RenderBlock<'a> {
    bridge: &'a mut RenderBridge,
}

impl<'a> RenderBlock<'a> {
    pub(crate) fn new(bridge: &'a mut RenderBridge) -> Self {
        Self { bridge }
    }

    /// See [`RenderBridge::render`]
    #[inline]
    pub fn render(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        timestamp: RenderTimestamp,
    ) -> RenderStatus {
        self.bridge.render(input, output, frames, timestamp)
    }

    /// See [`RenderBridge::render_in_place`]
    #[inline]
    pub fn render_in_place(
        &mut self,
        buffer: &mut AudioBuffer,
        frames: usize,
        timestamp: RenderTimestamp,
    ) -> RenderStatus {
        self.bridge.render_in_place(buffer, frames, timestamp)
    }
}
