//! Voice gate - energy-based speech gate
//!
//! Tracks the background noise floor, turns the level above it into a
//! speech confidence in [0, 1] and gates the signal:
//! - confidence at or above the threshold opens the gate and restarts the
//!   hold timer (`gateAttackDelay`)
//! - while the hold timer runs the gate stays open
//! - afterwards the gate closes
//!
//! Gain ramps linearly across each buffer so opening and closing never click.

use crate::effect::engine::{DenoiseEngine, EngineConfig, EngineFault, ProcessStatus};
use crate::effect::error::{EffectError, EffectResult};
use crate::effect::params::{ParameterSnapshot, GATE_ATTACK, SPEECH_THRESHOLD};
use crate::types::AudioBuffer;

/// Level below which a buffer counts as digital silence
const SILENCE_RMS: f32 = 1e-4;

/// Lowest noise floor the tracker will settle on
const MIN_NOISE_FLOOR: f32 = 1e-5;

/// How fast the floor estimate may rise toward a louder background
const FLOOR_RISE_DB_PER_SEC: f32 = 6.0;

/// Level above the floor (dB) at which confidence reaches 0.5
const CONFIDENCE_MIDPOINT_DB: f32 = 6.0;

/// Steepness of the confidence curve (dB per logistic unit)
const CONFIDENCE_SLOPE_DB: f32 = 2.0;

/// Gain applied while the gate is closed
const CLOSED_GAIN: f32 = 0.0;

/// Energy-based stand-in for a neural voice-activity denoiser
///
/// Zero latency. All state is plain scalars, so `process` never allocates.
pub struct VoiceGate {
    config: Option<EngineConfig>,
    noise_floor: f32,
    hold_remaining: usize,
    gain: f32,
    confidence: f32,
}

impl VoiceGate {
    pub fn new() -> Self {
        Self {
            config: None,
            noise_floor: 0.0,
            hold_remaining: 0,
            gain: CLOSED_GAIN,
            confidence: 0.0,
        }
    }

    /// Speech confidence of the last processed buffer
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Current noise floor estimate (linear RMS)
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Forget the tracked noise floor and close the gate
    fn reset(&mut self) {
        self.noise_floor = 0.0;
        self.hold_remaining = 0;
        self.gain = CLOSED_GAIN;
        self.confidence = 0.0;
    }

    fn track_floor(&mut self, rms: f32, frames: usize, sample_rate: u32) {
        if self.noise_floor <= 0.0 || rms < self.noise_floor {
            self.noise_floor = rms.max(MIN_NOISE_FLOOR);
        } else {
            let seconds = frames as f32 / sample_rate as f32;
            let rise = 10f32.powf(FLOOR_RISE_DB_PER_SEC * seconds / 20.0);
            self.noise_floor = (self.noise_floor * rise).min(rms);
        }
    }

    fn speech_confidence(&self, rms: f32) -> f32 {
        if rms < SILENCE_RMS {
            return 0.0;
        }
        let snr_db = 20.0 * (rms / self.noise_floor).log10();
        1.0 / (1.0 + (-(snr_db - CONFIDENCE_MIDPOINT_DB) / CONFIDENCE_SLOPE_DB).exp())
    }
}

impl Default for VoiceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DenoiseEngine for VoiceGate {
    fn name(&self) -> &str {
        "VoiceGate"
    }

    fn allocate(&mut self, config: EngineConfig) -> EffectResult<()> {
        if config.sample_rate == 0 {
            return Err(EffectError::ResourceAllocationFailed {
                effect: self.name().to_string(),
                reason: "sample rate must be non-zero".to_string(),
            });
        }
        self.config = Some(config);
        self.reset();
        Ok(())
    }

    fn process(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        params: &ParameterSnapshot,
    ) -> ProcessStatus {
        let Some(config) = self.config else {
            return ProcessStatus::Failed(EngineFault::NotAllocated);
        };
        if input.channel_count() != config.channels || output.channel_count() != config.channels
        {
            return ProcessStatus::Failed(EngineFault::MalformedBuffer);
        }
        if frames == 0 {
            return ProcessStatus::Ok;
        }

        let mut energy = 0.0f32;
        for c in 0..config.channels {
            for &sample in &input.channel(c)[..frames] {
                if !sample.is_finite() {
                    return ProcessStatus::Failed(EngineFault::NonFiniteInput);
                }
                energy += sample * sample;
            }
        }
        let rms = (energy / (frames * config.channels) as f32).sqrt();

        self.track_floor(rms, frames, config.sample_rate);
        self.confidence = self.speech_confidence(rms);

        let threshold = params.get_or(SPEECH_THRESHOLD, 0.95);
        let attack_ms = params.get_or(GATE_ATTACK, 100.0);

        let open = if self.confidence >= threshold {
            self.hold_remaining = (attack_ms * config.sample_rate as f32 / 1000.0) as usize;
            true
        } else if self.hold_remaining > 0 {
            self.hold_remaining = self.hold_remaining.saturating_sub(frames);
            true
        } else {
            false
        };

        // Last frame lands exactly on the target gain
        let start = self.gain;
        let target = if open { 1.0 } else { CLOSED_GAIN };
        for c in 0..config.channels {
            let source = &input.channel(c)[..frames];
            let dest = &mut output.channel_mut(c)[..frames];
            for (i, (out, &sample)) in dest.iter_mut().zip(source).enumerate() {
                let t = (i + 1) as f32 / frames as f32;
                *out = sample * (start + (target - start) * t);
            }
        }
        self.gain = target;

        ProcessStatus::Ok
    }

    fn deallocate(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::params::ParameterStore;

    const HOP: usize = 480;

    fn gate() -> VoiceGate {
        let mut gate = VoiceGate::new();
        gate.allocate(EngineConfig {
            max_frames: HOP,
            channels: 1,
            sample_rate: 48000,
        })
        .unwrap();
        gate
    }

    fn run(gate: &mut VoiceGate, level: f32, params: &ParameterSnapshot) -> AudioBuffer {
        let input = AudioBuffer::from_channels(&[&[level; HOP]]);
        let mut output = AudioBuffer::new(1, HOP);
        assert_eq!(
            gate.process(&input, &mut output, HOP, params),
            ProcessStatus::Ok
        );
        output
    }

    #[test]
    fn test_unallocated_fails() {
        let mut gate = VoiceGate::new();
        let input = AudioBuffer::new(1, 4);
        let mut output = AudioBuffer::new(1, 4);
        assert_eq!(
            gate.process(&input, &mut output, 4, &ParameterSnapshot::default()),
            ProcessStatus::Failed(EngineFault::NotAllocated)
        );
    }

    #[test]
    fn test_noise_stays_gated() {
        let params = ParameterStore::denoise().unwrap().snapshot();
        let mut gate = gate();
        for _ in 0..5 {
            let output = run(&mut gate, 0.001, &params);
            assert!(output.is_silent());
        }
        assert!(gate.confidence() < 0.95);
    }

    #[test]
    fn test_speech_opens_then_holds_then_closes() {
        let params = ParameterStore::denoise().unwrap().snapshot();
        let mut gate = gate();
        for _ in 0..3 {
            run(&mut gate, 0.001, &params);
        }

        // Loud burst: first buffer ramps up, second passes at unity
        let ramp = run(&mut gate, 0.5, &params);
        assert!(ramp.channel(0)[0] < 0.5);
        assert_eq!(ramp.channel(0)[HOP - 1], 0.5);
        let open = run(&mut gate, 0.5, &params);
        assert!(open.channel(0).iter().all(|&s| s == 0.5));
        assert!(gate.confidence() > 0.99);

        // Default 100ms attack holds the gate open for ten hops of noise
        for _ in 0..10 {
            let held = run(&mut gate, 0.001, &params);
            assert!(held.channel(0).iter().all(|&s| s == 0.001));
        }
        run(&mut gate, 0.001, &params);
        let closed = run(&mut gate, 0.001, &params);
        assert!(closed.is_silent());
    }

    #[test]
    fn test_zero_attack_closes_immediately() {
        let store = ParameterStore::denoise().unwrap();
        store.set_value(GATE_ATTACK, 0.0).unwrap();
        let params = store.snapshot();
        let mut gate = gate();
        run(&mut gate, 0.001, &params);
        run(&mut gate, 0.5, &params);
        run(&mut gate, 0.001, &params);
        let closed = run(&mut gate, 0.001, &params);
        assert!(closed.is_silent());
    }

    #[test]
    fn test_zero_threshold_passes_everything() {
        let store = ParameterStore::denoise().unwrap();
        store.set_value(SPEECH_THRESHOLD, 0.0).unwrap();
        let params = store.snapshot();
        let mut gate = gate();
        run(&mut gate, 0.01, &params);
        let output = run(&mut gate, 0.01, &params);
        assert!(output.channel(0).iter().all(|&s| s == 0.01));
    }

    #[test]
    fn test_non_finite_input_is_fault() {
        let mut gate = gate();
        let mut input = AudioBuffer::new(1, HOP);
        input.channel_mut(0)[10] = f32::INFINITY;
        let mut output = AudioBuffer::new(1, HOP);
        assert_eq!(
            gate.process(&input, &mut output, HOP, &ParameterSnapshot::default()),
            ProcessStatus::Failed(EngineFault::NonFiniteInput)
        );
    }

    #[test]
    fn test_reallocation_clears_history() {
        let params = ParameterStore::denoise().unwrap().snapshot();
        let mut gate = gate();
        run(&mut gate, 0.001, &params);
        run(&mut gate, 0.5, &params);
        assert!(gate.confidence() > 0.5);

        gate.deallocate();
        gate.allocate(EngineConfig {
            max_frames: HOP,
            channels: 1,
            sample_rate: 48000,
        })
        .unwrap();
        assert_eq!(gate.confidence(), 0.0);
        assert_eq!(gate.noise_floor(), 0.0);
    }
}
