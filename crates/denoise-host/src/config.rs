//! Host configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/denoise-host/config.yaml

use std::path::PathBuf;

use denoise_core::audio::AudioConfig;
use denoise_core::effect::Preset;
use denoise_core::graph::ComponentDescriptor;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Devices, sample rate and buffer size
    pub audio: AudioConfig,
    /// Effect slot behaviour
    pub effect: EffectConfig,
    /// Presets saved from the control panel
    pub presets: Vec<Preset>,
}

impl HostConfig {
    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Insert or replace a preset by name
    pub fn store_preset(&mut self, preset: Preset) {
        match self
            .presets
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&preset.name))
        {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }
}

/// Effect section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Attach the denoiser as soon as audio is running
    pub enabled_on_start: bool,
    /// Build the component on an isolated worker
    pub out_of_process: bool,
    /// Component descriptor as `type/subtype/manufacturer`
    pub component: String,
    /// Preset applied to a freshly attached effect
    pub initial_preset: Option<String>,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            out_of_process: true,
            component: ComponentDescriptor::DENOISE.to_string(),
            initial_preset: None,
        }
    }
}

impl EffectConfig {
    /// Parsed component descriptor
    pub fn descriptor(&self) -> Result<ComponentDescriptor, String> {
        self.component.parse()
    }
}

/// Returns: ~/.config/denoise-host/config.yaml
pub fn default_config_path() -> PathBuf {
    denoise_core::config::default_config_path("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn preset(name: &str, threshold: f32) -> Preset {
        Preset {
            name: name.to_string(),
            values: BTreeMap::from([("speechConfidenceThresholdPct".to_string(), threshold)]),
        }
    }

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert!(config.effect.enabled_on_start);
        assert!(config.effect.out_of_process);
        assert_eq!(config.effect.descriptor().unwrap(), ComponentDescriptor::DENOISE);
        assert!(config.presets.is_empty());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "effect:\n  enabled_on_start: false\n  initial_preset: podcast\n";
        let config: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.effect.enabled_on_start);
        assert!(config.effect.out_of_process);
        assert_eq!(config.effect.initial_preset.as_deref(), Some("podcast"));
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_store_preset_replaces_by_name() {
        let mut config = HostConfig::default();
        config.store_preset(preset("Podcast", 0.8));
        config.store_preset(preset("studio", 0.5));
        config.store_preset(preset("podcast", 0.7));

        assert_eq!(config.presets.len(), 2);
        assert_eq!(
            config.preset("PODCAST").unwrap().values["speechConfidenceThresholdPct"],
            0.7
        );
        assert!(config.preset("stage").is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = HostConfig::default();
        config.effect.initial_preset = Some("studio".to_string());
        config.store_preset(preset("studio", 0.5));
        denoise_core::config::save_config(&config, &path).unwrap();

        let loaded: HostConfig = denoise_core::config::load_config(&path);
        assert_eq!(loaded, config);
    }
}
