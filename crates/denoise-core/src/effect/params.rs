//! Parameter table shared between the control surface and the render path
//!
//! Every parameter lives in its own atomic cell (an `f32` stored as bits).
//! Control-rate writers clamp, store with `Release` and bump a publish epoch;
//! the render path copies all cells into a [`ParameterSnapshot`] with
//! `Acquire` loads. No locks, no allocation on the read side.
//!
//! Individual values are never torn. Cross-parameter atomicity is not
//! provided: a snapshot taken during two back-to-back writes may observe the
//! first write without the second.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::error::{EffectError, EffectResult};

/// Stable numeric identity of a parameter
pub type ParamAddress = u64;

/// Maximum parameters a snapshot can carry
pub const MAX_PARAMETERS: usize = 16;

/// Address of the speech confidence threshold
pub const SPEECH_THRESHOLD: ParamAddress = 0;

/// Address of the gate attack (hold) time
pub const GATE_ATTACK: ParamAddress = 1;

/// Display unit of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamUnit {
    /// Fraction in [0, 1], shown with two decimals
    Percent,
    Milliseconds,
    Decibels,
    Generic,
}

impl ParamUnit {
    /// Short suffix for display ("ms", "dB", …)
    pub fn label(&self) -> &'static str {
        match self {
            ParamUnit::Percent => "",
            ParamUnit::Milliseconds => "ms",
            ParamUnit::Decibels => "dB",
            ParamUnit::Generic => "",
        }
    }

    /// Format a value for this unit
    pub fn format(&self, value: f32) -> String {
        match self {
            ParamUnit::Percent => format!("{:.2}", value),
            ParamUnit::Milliseconds => format!("{:.0}", value),
            ParamUnit::Decibels => format!("{:.1}", value),
            ParamUnit::Generic => format!("{:.3}", value),
        }
    }
}

/// Description of one tunable control
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Stable address used by the render path and the surface dispatch
    pub address: ParamAddress,
    /// Identifier used in presets and on the control panel
    pub identifier: String,
    /// Optional short name accepted by lookups
    pub alias: Option<String>,
    /// Parameter name for display
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: ParamUnit,
}

impl ParamInfo {
    /// Create a new parameter info with a 0.0-1.0 generic range
    pub fn new(
        address: ParamAddress,
        identifier: impl Into<String>,
        name: impl Into<String>,
        default: f32,
    ) -> Self {
        Self {
            address,
            identifier: identifier.into(),
            alias: None,
            name: name.into(),
            min: 0.0,
            max: 1.0,
            default,
            unit: ParamUnit::Generic,
        }
    }

    /// Set the value range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the display unit
    pub fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Set a short lookup alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Clamp a value into this parameter's range
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Whether `name` matches the identifier or alias (case-insensitive)
    pub fn matches(&self, name: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(name)
            || self
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(name))
    }
}

/// The parameter set exposed by the denoise effect
pub fn denoise_parameters() -> Vec<ParamInfo> {
    vec![
        ParamInfo::new(
            SPEECH_THRESHOLD,
            "speechConfidenceThresholdPct",
            "Speech Confidence Threshold",
            0.95,
        )
        .with_range(0.0, 1.0)
        .with_unit(ParamUnit::Percent)
        .with_alias("threshold"),
        // 100ms = ten 480-sample model hops at 48kHz
        ParamInfo::new(GATE_ATTACK, "gateAttackDelay", "Noise Gate Attack", 100.0)
            .with_range(0.0, 5000.0)
            .with_unit(ParamUnit::Milliseconds)
            .with_alias("attack"),
    ]
}

/// Point-in-time copy of every parameter value
///
/// Plain `Copy` data sized for [`MAX_PARAMETERS`], so taking one on the
/// render thread is a handful of atomic loads into the stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    addresses: [ParamAddress; MAX_PARAMETERS],
    values: [f32; MAX_PARAMETERS],
    len: usize,
    /// Bypass flag at the time of the snapshot
    pub bypassed: bool,
    /// Publish epoch observed (number of writes published so far)
    pub epoch: u64,
}

impl ParameterSnapshot {
    /// Value of the parameter at `address`, if present
    #[inline]
    pub fn get(&self, address: ParamAddress) -> Option<f32> {
        self.addresses[..self.len]
            .iter()
            .position(|&a| a == address)
            .map(|index| self.values[index])
    }

    /// Value at `address` or `fallback` when absent
    #[inline]
    pub fn get_or(&self, address: ParamAddress, fallback: f32) -> f32 {
        self.get(address).unwrap_or(fallback)
    }

    /// Number of parameters captured
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over `(address, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ParamAddress, f32)> + '_ {
        self.addresses[..self.len]
            .iter()
            .copied()
            .zip(self.values[..self.len].iter().copied())
    }
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            addresses: [0; MAX_PARAMETERS],
            values: [0.0; MAX_PARAMETERS],
            len: 0,
            bypassed: false,
            epoch: 0,
        }
    }
}

/// Named set of parameter values keyed by identifier
///
/// Only the shape and capture/apply on a store are provided; storing
/// presets is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub name: String,
    pub values: BTreeMap<String, f32>,
}

/// Read/write/format capability set dispatched by parameter address
pub trait ParameterSurface: Send + Sync {
    /// Descriptions of every parameter, in address order
    fn parameters(&self) -> &[ParamInfo];

    /// Current canonical value
    fn value(&self, address: ParamAddress) -> EffectResult<f32>;

    /// Write a value (clamped); returns what was stored
    fn set_value(&self, address: ParamAddress, value: f32) -> EffectResult<f32>;

    /// Human-readable value (`None` formats the current value)
    fn format_value(&self, address: ParamAddress, value: Option<f32>) -> EffectResult<String>;
}

/// Canonical parameter values of one effect node
///
/// Created once with the node and shared via `Arc` between the node's
/// render bridge and control-side holders.
pub struct ParameterStore {
    infos: Vec<ParamInfo>,
    values: Box<[AtomicU32]>,
    epoch: AtomicU64,
    bypassed: AtomicBool,
}

impl ParameterStore {
    /// Create a store from parameter descriptions
    ///
    /// Addresses must be unique and fit in a snapshot. Defaults outside
    /// their range are clamped.
    pub fn new(mut infos: Vec<ParamInfo>) -> EffectResult<Self> {
        if infos.len() > MAX_PARAMETERS {
            return Err(EffectError::TooManyParameters {
                count: infos.len(),
                max: MAX_PARAMETERS,
            });
        }
        infos.sort_by_key(|info| info.address);
        if let Some(pair) = infos.windows(2).find(|w| w[0].address == w[1].address) {
            return Err(EffectError::InvalidParameter(format!(
                "duplicate address {} ('{}' and '{}')",
                pair[0].address, pair[0].identifier, pair[1].identifier
            )));
        }
        if let Some(info) = infos.iter().find(|info| !(info.min <= info.max)) {
            return Err(EffectError::InvalidParameter(format!(
                "'{}' has an empty range [{}, {}]",
                info.identifier, info.min, info.max
            )));
        }

        let values = infos
            .iter()
            .map(|info| AtomicU32::new(info.clamp(info.default).to_bits()))
            .collect();

        Ok(Self {
            infos,
            values,
            epoch: AtomicU64::new(0),
            bypassed: AtomicBool::new(false),
        })
    }

    /// Store holding [`denoise_parameters`] at their defaults
    pub fn denoise() -> EffectResult<Self> {
        Self::new(denoise_parameters())
    }

    fn index_of(&self, address: ParamAddress) -> EffectResult<usize> {
        self.infos
            .iter()
            .position(|info| info.address == address)
            .ok_or_else(|| EffectError::unknown_address(address))
    }

    /// Description of the parameter at `address`
    pub fn info(&self, address: ParamAddress) -> EffectResult<&ParamInfo> {
        self.index_of(address).map(|index| &self.infos[index])
    }

    /// Resolve an identifier or alias to an address
    pub fn address_of(&self, name: &str) -> EffectResult<ParamAddress> {
        self.infos
            .iter()
            .find(|info| info.matches(name))
            .map(|info| info.address)
            .ok_or_else(|| EffectError::InvalidParameter(format!("unknown parameter '{}'", name)))
    }

    /// All parameter descriptions, in address order
    pub fn parameters(&self) -> &[ParamInfo] {
        &self.infos
    }

    /// Current canonical value
    pub fn value(&self, address: ParamAddress) -> EffectResult<f32> {
        let index = self.index_of(address)?;
        Ok(f32::from_bits(self.values[index].load(Ordering::Acquire)))
    }

    /// Write a parameter value from the control thread
    ///
    /// Out-of-range values are clamped; NaN is ignored. Returns the value
    /// now stored. Any render that starts after this returns sees it.
    pub fn set_value(&self, address: ParamAddress, value: f32) -> EffectResult<f32> {
        let index = self.index_of(address)?;
        let cell = &self.values[index];
        if value.is_nan() {
            log::debug!(
                "Ignoring NaN write to '{}'",
                self.infos[index].identifier
            );
            return Ok(f32::from_bits(cell.load(Ordering::Acquire)));
        }

        let clamped = self.infos[index].clamp(value);
        cell.store(clamped.to_bits(), Ordering::Release);
        self.epoch.fetch_add(1, Ordering::Release);
        Ok(clamped)
    }

    /// Format a value for display (`None` formats the current value)
    pub fn format_value(&self, address: ParamAddress, value: Option<f32>) -> EffectResult<String> {
        let info = self.info(address)?;
        let value = match value {
            Some(value) => value,
            None => self.value(address)?,
        };
        Ok(info.unit.format(value))
    }

    /// Copy every value for the render path
    ///
    /// Real-time safe: atomic loads into a stack value only.
    #[inline]
    pub fn snapshot(&self) -> ParameterSnapshot {
        let mut snapshot = ParameterSnapshot {
            epoch: self.epoch.load(Ordering::Acquire),
            bypassed: self.bypassed.load(Ordering::Acquire),
            len: self.infos.len(),
            ..Default::default()
        };
        for (index, (info, cell)) in self.infos.iter().zip(self.values.iter()).enumerate() {
            snapshot.addresses[index] = info.address;
            snapshot.values[index] = f32::from_bits(cell.load(Ordering::Acquire));
        }
        snapshot
    }

    /// Number of writes published so far
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Route input straight to output instead of through the engine
    pub fn set_bypass(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::Release);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    /// Restore every parameter to its default
    pub fn reset_to_defaults(&self) {
        for (info, cell) in self.infos.iter().zip(self.values.iter()) {
            cell.store(info.clamp(info.default).to_bits(), Ordering::Release);
        }
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Capture the current values as a named preset
    pub fn capture_preset(&self, name: impl Into<String>) -> Preset {
        let values = self
            .infos
            .iter()
            .zip(self.values.iter())
            .map(|(info, cell)| {
                (
                    info.identifier.clone(),
                    f32::from_bits(cell.load(Ordering::Acquire)),
                )
            })
            .collect();
        Preset {
            name: name.into(),
            values,
        }
    }

    /// Apply a preset's values; returns how many parameters were written
    ///
    /// Entries naming unknown parameters are skipped with a warning.
    pub fn apply_preset(&self, preset: &Preset) -> usize {
        let mut applied = 0;
        for (identifier, &value) in &preset.values {
            match self.address_of(identifier) {
                Ok(address) => {
                    if self.set_value(address, value).is_ok() {
                        applied += 1;
                    }
                }
                Err(_) => log::warn!(
                    "Preset '{}': skipping unknown parameter '{}'",
                    preset.name,
                    identifier
                ),
            }
        }
        log::debug!("Applied preset '{}' ({} values)", preset.name, applied);
        applied
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (info, cell) in self.infos.iter().zip(self.values.iter()) {
            map.entry(
                &info.identifier,
                &f32::from_bits(cell.load(Ordering::Relaxed)),
            );
        }
        map.finish()
    }
}

impl ParameterSurface for ParameterStore {
    fn parameters(&self) -> &[ParamInfo] {
        ParameterStore::parameters(self)
    }

    fn value(&self, address: ParamAddress) -> EffectResult<f32> {
        ParameterStore::value(self, address)
    }

    fn set_value(&self, address: ParamAddress, value: f32) -> EffectResult<f32> {
        ParameterStore::set_value(self, address, value)
    }

    fn format_value(&self, address: ParamAddress, value: Option<f32>) -> EffectResult<String> {
        ParameterStore::format_value(self, address, value)
    }
}
