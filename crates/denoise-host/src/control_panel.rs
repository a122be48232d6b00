//! Terminal control panel
//!
//! Parses one command per line and drives the effect slot through the
//! [`GraphManager`]. Mistyped commands and bad parameter values are printed
//! and the panel keeps running; only output failures end the session.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use denoise_core::audio::{get_available_devices, Direction, StreamStats};
use denoise_core::config::save_config;
use denoise_core::effect::{ParamInfo, ParameterStore, Preset};
use denoise_core::graph::{ComponentDescriptor, GraphAtomics, GraphEvent, GraphManager};

use crate::config::HostConfig;

const HELP: &str = "\
Commands:
  enable                  attach the denoiser
  disable                 detach it; audio passes through unprocessed
  toggle                  enable or disable
  bypass on|off           keep the effect attached but skip processing
  set <param> <value>     change a parameter (out-of-range values are clamped)
  get [param]             show one or every parameter value
  params                  list parameters with ranges and defaults
  status                  effect, render and stream state
  devices                 list audio devices
  preset save|load <name> store or recall parameter values
  help                    show this text
  quit                    exit";

/// One control panel command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Enable,
    Disable,
    Toggle,
    Bypass(bool),
    Set { param: String, value: f32 },
    Get(Option<String>),
    Params,
    Status,
    Devices,
    PresetSave(String),
    PresetLoad(String),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err("empty command".to_string());
        };

        let command = match (verb.to_ascii_lowercase().as_str(), args) {
            ("enable", []) => Command::Enable,
            ("disable", []) => Command::Disable,
            ("toggle", []) => Command::Toggle,
            ("bypass", [state]) => match state.to_ascii_lowercase().as_str() {
                "on" => Command::Bypass(true),
                "off" => Command::Bypass(false),
                other => return Err(format!("bypass expects on|off, got '{}'", other)),
            },
            ("set", [param, value]) => Command::Set {
                param: param.to_string(),
                value: value
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", value))?,
            },
            ("get", []) => Command::Get(None),
            ("get", [param]) => Command::Get(Some(param.to_string())),
            ("params", []) => Command::Params,
            ("status", []) => Command::Status,
            ("devices", []) => Command::Devices,
            ("preset", [action, name]) => match action.to_ascii_lowercase().as_str() {
                "save" => Command::PresetSave(name.to_string()),
                "load" => Command::PresetLoad(name.to_string()),
                other => return Err(format!("preset expects save|load, got '{}'", other)),
            },
            ("help", _) | ("?", _) => Command::Help,
            ("quit", []) | ("exit", []) => Command::Quit,
            (other, _) => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(command)
    }
}

/// Whether the session continues after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Control surface state around the graph manager
pub struct ControlPanel {
    manager: GraphManager,
    config: HostConfig,
    config_path: PathBuf,
    descriptor: ComponentDescriptor,
    graph_atomics: Option<Arc<GraphAtomics>>,
    stream_stats: Option<Arc<StreamStats>>,
    /// Values carried over from the last detached effect
    restore: Option<Preset>,
}

impl ControlPanel {
    pub fn new(manager: GraphManager, config: HostConfig, config_path: PathBuf) -> Result<Self> {
        let descriptor = config
            .effect
            .descriptor()
            .map_err(|e| anyhow::anyhow!("Invalid effect component: {}", e))?;
        Ok(Self {
            manager,
            config,
            config_path,
            descriptor,
            graph_atomics: None,
            stream_stats: None,
            restore: None,
        })
    }

    pub fn with_graph_atomics(mut self, atomics: Arc<GraphAtomics>) -> Self {
        self.graph_atomics = Some(atomics);
        self
    }

    pub fn with_stream_stats(mut self, stats: Arc<StreamStats>) -> Self {
        self.stream_stats = Some(stats);
        self
    }

    pub fn manager(&self) -> &GraphManager {
        &self.manager
    }

    /// Run one command
    pub fn execute(&mut self, command: Command, out: &mut dyn Write) -> Result<Flow> {
        log::debug!("Control panel command: {:?}", command);
        match command {
            Command::Enable => self.enable(out)?,
            Command::Disable => self.disable(out)?,
            Command::Toggle => {
                if self.manager.is_enabled() || self.manager.pending_count() > 0 {
                    self.disable(out)?
                } else {
                    self.enable(out)?
                }
            }
            Command::Bypass(bypassed) => {
                if let Some(params) = self.parameters(out)? {
                    params.set_bypass(bypassed);
                    writeln!(out, "Bypass {}", if bypassed { "on" } else { "off" })?;
                }
            }
            Command::Set { param, value } => self.set(&param, value, out)?,
            Command::Get(param) => self.get(param.as_deref(), out)?,
            Command::Params => self.list_params(out)?,
            Command::Status => self.status(out)?,
            Command::Devices => list_devices(out)?,
            Command::PresetSave(name) => self.save_preset(&name, out)?,
            Command::PresetLoad(name) => self.load_preset(&name, out)?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Report finished instantiations and render faults without blocking
    pub fn poll(&mut self, out: &mut dyn Write) -> Result<()> {
        for event in self.manager.poll() {
            self.report(event, out)?;
        }
        Ok(())
    }

    /// Block until pending instantiations finish, then report them
    pub fn settle(&mut self, out: &mut dyn Write) -> Result<()> {
        for event in self.manager.wait_pending() {
            self.report(event, out)?;
        }
        Ok(())
    }

    fn report(&mut self, event: GraphEvent, out: &mut dyn Write) -> Result<()> {
        match event {
            GraphEvent::Attached { name, deferred, .. } => {
                self.restore_values(out)?;
                if deferred {
                    writeln!(
                        out,
                        "Denoise enabled: {} (applies once the audio thread catches up)",
                        name
                    )?;
                } else {
                    writeln!(out, "Denoise enabled: {}", name)?;
                }
            }
            GraphEvent::Failed { error, .. } => {
                writeln!(
                    out,
                    "Could not enable denoise: {} (audio passes through unprocessed)",
                    error
                )?;
            }
            GraphEvent::Stale { generation } => {
                log::debug!("Dropped superseded effect (generation {})", generation);
            }
            GraphEvent::Committed => log::debug!("Deferred graph change applied"),
            GraphEvent::EngineFailures { new, last, .. } => match last {
                Some(fault) => writeln!(out, "Warning: {} buffers silenced ({})", new, fault)?,
                None => writeln!(out, "Warning: {} buffers silenced", new)?,
            },
        }
        Ok(())
    }

    /// Apply carried-over values, or the configured initial preset
    fn restore_values(&mut self, out: &mut dyn Write) -> Result<()> {
        let Some(params) = self.manager.parameters().cloned() else {
            return Ok(());
        };
        if let Some(values) = self.restore.take() {
            params.apply_preset(&values);
            return Ok(());
        }
        if let Some(name) = self.config.effect.initial_preset.clone() {
            match self.config.preset(&name) {
                Some(preset) => {
                    let applied = params.apply_preset(preset);
                    writeln!(out, "Applied preset '{}' ({} values)", preset.name, applied)?;
                }
                None => log::warn!("Initial preset '{}' not found", name),
            }
        }
        Ok(())
    }

    fn enable(&mut self, out: &mut dyn Write) -> Result<()> {
        if self.manager.is_enabled() {
            writeln!(out, "Denoise is already enabled")?;
            return Ok(());
        }
        if self.manager.pending_count() > 0 {
            writeln!(out, "Denoise is already loading")?;
            return Ok(());
        }
        match self
            .manager
            .request_effect(&self.descriptor, self.config.effect.out_of_process)
        {
            Ok(_) => writeln!(out, "Loading denoise effect...")?,
            Err(e) => writeln!(
                out,
                "Could not enable denoise: {} (audio passes through unprocessed)",
                e
            )?,
        }
        Ok(())
    }

    fn disable(&mut self, out: &mut dyn Write) -> Result<()> {
        let was_loading = self.manager.pending_count() > 0;
        let values = self
            .manager
            .parameters()
            .map(|params| params.capture_preset("session"));

        match self.manager.detach() {
            Ok(true) => {
                self.restore = values;
                if self.manager.has_uncommitted_changes() {
                    writeln!(out, "Denoise disabled (applies once the audio thread catches up)")?;
                } else {
                    writeln!(out, "Denoise disabled")?;
                }
            }
            Ok(false) if was_loading => writeln!(out, "Cancelled loading denoise effect")?,
            Ok(false) => writeln!(out, "Denoise is not enabled")?,
            Err(e) => writeln!(out, "Could not disable denoise: {}", e)?,
        }
        Ok(())
    }

    /// Parameters of the active effect, or a notice when there is none
    fn parameters(&self, out: &mut dyn Write) -> Result<Option<Arc<ParameterStore>>> {
        let params = self.manager.parameters().cloned();
        if params.is_none() {
            writeln!(out, "Denoise is not enabled")?;
        }
        Ok(params)
    }

    fn set(&mut self, param: &str, value: f32, out: &mut dyn Write) -> Result<()> {
        let Some(params) = self.parameters(out)? else {
            return Ok(());
        };
        let stored = params
            .address_of(param)
            .and_then(|address| Ok((params.info(address)?.clone(), params.set_value(address, value)?)));
        match stored {
            Ok((info, stored)) => {
                write!(out, "{} = {}", info.identifier, describe(&params, &info, stored))?;
                if stored != value && !value.is_nan() {
                    write!(out, " (clamped from {})", value)?;
                }
                writeln!(out)?;
            }
            Err(e) => writeln!(out, "{}", e)?,
        }
        Ok(())
    }

    fn get(&self, param: Option<&str>, out: &mut dyn Write) -> Result<()> {
        let Some(params) = self.parameters(out)? else {
            return Ok(());
        };
        let infos: Vec<ParamInfo> = match param {
            Some(name) => match params.address_of(name).and_then(|a| params.info(a).cloned()) {
                Ok(info) => vec![info],
                Err(e) => {
                    writeln!(out, "{}", e)?;
                    return Ok(());
                }
            },
            None => params.parameters().to_vec(),
        };
        for info in &infos {
            let value = params.value(info.address)?;
            writeln!(out, "{} = {}", info.identifier, describe(&params, info, value))?;
        }
        Ok(())
    }

    fn list_params(&self, out: &mut dyn Write) -> Result<()> {
        let Some(params) = self.parameters(out)? else {
            return Ok(());
        };
        for info in params.parameters() {
            let alias = info
                .alias
                .as_deref()
                .map(|a| format!(" ({})", a))
                .unwrap_or_default();
            writeln!(
                out,
                "{}{}: {} [{} .. {}] default {}",
                info.identifier,
                alias,
                info.name,
                describe(&params, info, info.min),
                describe(&params, info, info.max),
                describe(&params, info, info.default),
            )?;
        }
        Ok(())
    }

    fn status(&self, out: &mut dyn Write) -> Result<()> {
        match self.manager.active() {
            Some(active) => {
                writeln!(
                    out,
                    "Effect: '{}' {} (generation {}, latency {} samples)",
                    active.name, active.id, active.generation, active.latency_samples
                )?;
                writeln!(
                    out,
                    "Bypass: {}",
                    if active.parameters().is_bypassed() { "on" } else { "off" }
                )?;
                let stats = active.stats();
                write!(
                    out,
                    "Render: {} buffers, {} silenced",
                    stats.rendered(),
                    stats.failures()
                )?;
                if let Some(fault) = stats.last_fault() {
                    write!(out, " (last: {})", fault)?;
                }
                writeln!(out)?;
            }
            None if self.manager.pending_count() > 0 => writeln!(out, "Effect: loading")?,
            None => writeln!(out, "Effect: disabled (passthrough)")?,
        }
        if self.manager.has_uncommitted_changes() {
            writeln!(out, "Graph: changes waiting for the audio thread")?;
        }
        if let Some(atomics) = &self.graph_atomics {
            writeln!(
                out,
                "Graph: route {}, {} commits applied",
                atomics.route(),
                atomics.commits_applied()
            )?;
        }
        if let Some(stats) = &self.stream_stats {
            writeln!(
                out,
                "Stream: {} callbacks, {} underrun frames, {} dropped input samples",
                stats.callbacks(),
                stats.underruns(),
                stats.overruns()
            )?;
        }
        Ok(())
    }

    fn save_preset(&mut self, name: &str, out: &mut dyn Write) -> Result<()> {
        let Some(params) = self.parameters(out)? else {
            return Ok(());
        };
        self.config.store_preset(params.capture_preset(name));
        match save_config(&self.config, &self.config_path) {
            Ok(()) => writeln!(out, "Saved preset '{}'", name)?,
            Err(e) => writeln!(out, "Could not save preset '{}': {:#}", name, e)?,
        }
        Ok(())
    }

    fn load_preset(&mut self, name: &str, out: &mut dyn Write) -> Result<()> {
        let Some(preset) = self.config.preset(name).cloned() else {
            writeln!(out, "No preset named '{}'", name)?;
            return Ok(());
        };
        let Some(params) = self.parameters(out)? else {
            return Ok(());
        };
        let applied = params.apply_preset(&preset);
        writeln!(out, "Loaded preset '{}' ({} values)", preset.name, applied)?;
        Ok(())
    }
}

/// Formatted value with its unit label
fn describe(params: &ParameterStore, info: &ParamInfo, value: f32) -> String {
    let text = params
        .format_value(info.address, Some(value))
        .unwrap_or_else(|_| value.to_string());
    match info.unit.label() {
        "" => text,
        unit => format!("{} {}", text, unit),
    }
}

/// Print input and output devices
pub fn list_devices(out: &mut dyn Write) -> Result<()> {
    for direction in [Direction::Input, Direction::Output] {
        writeln!(out, "{} devices:", direction)?;
        let devices = get_available_devices(direction);
        if devices.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for device in devices {
            writeln!(out, "  {} - {} ch, rates {:?}", device, device.max_channels, device.sample_rates)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use denoise_core::effect::{EffectNode, GATE_ATTACK, SPEECH_THRESHOLD};
    use denoise_core::graph::{BundledRegistry, GraphRenderer, LiveGraph, GRAPH_COMMAND_CAPACITY};
    use denoise_core::StreamFormat;

    struct Session {
        panel: ControlPanel,
        _renderer: GraphRenderer,
        _dir: tempfile::TempDir,
    }

    impl Session {
        fn new(config: HostConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let format = StreamFormat::mono(48000);
            let (graph, renderer) = LiveGraph::new(format, format, 480);
            let atomics = graph.atomics().clone();
            let manager = GraphManager::new(
                Box::new(graph),
                Arc::new(BundledRegistry::with_builtin()),
            );
            let panel = ControlPanel::new(manager, config, dir.path().join("config.yaml"))
                .unwrap()
                .with_graph_atomics(atomics);
            Self {
                panel,
                _renderer: renderer,
                _dir: dir,
            }
        }

        fn run(&mut self, line: &str) -> String {
            let mut text = self.run_unsettled(line);
            let mut out = Vec::new();
            self.panel.settle(&mut out).unwrap();
            text.push_str(&String::from_utf8(out).unwrap());
            text
        }

        /// Execute without waiting for instantiations to finish
        fn run_unsettled(&mut self, line: &str) -> String {
            let mut out = Vec::new();
            let command: Command = line.parse().unwrap();
            assert_eq!(
                self.panel.execute(command, &mut out).unwrap(),
                Flow::Continue
            );
            String::from_utf8(out).unwrap()
        }

        fn value(&self, address: u64) -> f32 {
            self.panel.manager().parameters().unwrap().value(address).unwrap()
        }
    }

    fn in_process() -> HostConfig {
        let mut config = HostConfig::default();
        config.effect.out_of_process = false;
        config
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "set threshold 0.5".parse::<Command>(),
            Ok(Command::Set {
                param: "threshold".to_string(),
                value: 0.5
            })
        );
        assert_eq!("BYPASS on".parse::<Command>(), Ok(Command::Bypass(true)));
        assert_eq!("get".parse::<Command>(), Ok(Command::Get(None)));
        assert_eq!(
            "preset load podcast".parse::<Command>(),
            Ok(Command::PresetLoad("podcast".to_string()))
        );
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));

        assert!("bypass maybe".parse::<Command>().is_err());
        assert!("set threshold loud".parse::<Command>().is_err());
        assert!("set threshold".parse::<Command>().is_err());
        assert!("frobnicate".parse::<Command>().is_err());
        assert!("   ".parse::<Command>().is_err());
    }

    #[test]
    fn test_enable_and_clamped_set() {
        let mut session = Session::new(in_process());
        let text = session.run("enable");
        assert!(text.contains("Denoise enabled"), "{}", text);

        let text = session.run("set threshold 1.5");
        assert!(text.contains("1.00"), "{}", text);
        assert!(text.contains("clamped"), "{}", text);
        assert_eq!(session.value(SPEECH_THRESHOLD), 1.0);

        let text = session.run("get attack");
        assert!(text.contains("gateAttackDelay = 100 ms"), "{}", text);
    }

    #[test]
    fn test_parameter_errors_do_not_end_session() {
        let mut session = Session::new(in_process());
        assert!(session.run("set threshold 0.5").contains("not enabled"));

        session.run("enable");
        let text = session.run("set loudness 3");
        assert!(text.contains("Invalid parameter"), "{}", text);
        assert_eq!(session.value(SPEECH_THRESHOLD), 0.95);
    }

    #[test]
    fn test_values_survive_toggle() {
        let mut session = Session::new(in_process());
        session.run("enable");
        session.run("set attack 250");

        assert!(session.run("toggle").contains("Denoise disabled"));
        assert!(session.panel.manager().parameters().is_none());

        session.run("toggle");
        assert_eq!(session.value(GATE_ATTACK), 250.0);
    }

    #[test]
    fn test_preset_save_and_load() {
        let mut session = Session::new(in_process());
        session.run("enable");
        session.run("set threshold 0.6");
        assert!(session.run("preset save podcast").contains("Saved"));
        assert!(session.panel.config_path.exists());

        session.run("set threshold 0.9");
        assert!(session.run("preset load podcast").contains("2 values"));
        assert_eq!(session.value(SPEECH_THRESHOLD), 0.6);
        assert!(session.run("preset load stage").contains("No preset"));
    }

    #[test]
    fn test_initial_preset_applied_on_attach() {
        let mut config = in_process();
        config.store_preset(Preset {
            name: "quiet-room".to_string(),
            values: [("gateAttackDelay".to_string(), 40.0)].into_iter().collect(),
        });
        config.effect.initial_preset = Some("quiet-room".to_string());

        let mut session = Session::new(config);
        let text = session.run("enable");
        assert!(text.contains("Applied preset 'quiet-room'"), "{}", text);
        assert_eq!(session.value(GATE_ATTACK), 40.0);
    }

    #[test]
    fn test_missing_component_keeps_passthrough() {
        let mut config = in_process();
        config.effect.component = "aufx/nope/ACME".to_string();
        let mut session = Session::new(config);

        let text = session.run("enable");
        assert!(text.contains("Could not enable denoise"), "{}", text);
        assert!(session.run("status").contains("passthrough"));
    }

    #[test]
    fn test_bypass_and_status() {
        let mut session = Session::new(in_process());
        session.run("enable");
        assert!(session.run("bypass on").contains("Bypass on"));
        let text = session.run("status");
        assert!(text.contains("Bypass: on"), "{}", text);
        assert!(text.contains("Voice Denoise"), "{}", text);
    }

    #[test]
    fn test_enable_after_cancelled_load() {
        let mut session = Session::new(in_process());
        assert!(session.run_unsettled("enable").contains("Loading"));
        assert!(session.run_unsettled("disable").contains("Cancelled"));

        let text = session.run_unsettled("enable");
        assert!(text.contains("Loading denoise effect"), "{}", text);
        let text = session.run("status");
        assert!(text.contains("Denoise enabled"), "{}", text);
        assert!(session.panel.manager().is_enabled());
    }

    #[test]
    fn test_enable_with_full_command_queue_restores_values() {
        let mut session = Session::new(in_process());
        session.run("enable");
        session.run("set attack 250");
        session.run("disable");

        // Renderer never runs, so every commit stays queued; two are in already
        let manager = &mut session.panel.manager;
        for _ in 0..(GRAPH_COMMAND_CAPACITY - 2) / 2 {
            manager.attach(EffectNode::denoiser().unwrap()).unwrap();
            manager.detach().unwrap();
        }
        assert!(!manager.has_uncommitted_changes());

        let text = session.run("enable");
        assert!(text.contains("Denoise enabled"), "{}", text);
        assert!(text.contains("catches up"), "{}", text);
        assert!(!text.contains("Could not enable"), "{}", text);
        assert_eq!(session.value(GATE_ATTACK), 250.0);
        assert!(session.panel.manager().has_uncommitted_changes());
    }
}
