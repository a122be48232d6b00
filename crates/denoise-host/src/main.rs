//! Denoise Host - live microphone noise suppression
//!
//! Entry point for the terminal host. It:
//! 1. Loads the YAML config
//! 2. Starts the capture and playback streams with the live graph between them
//! 3. Attaches the denoiser if configured to
//! 4. Runs the control panel on stdin until `quit` or end of input
//!
//! ## Command line flags
//!
//! - `--config <path>`: use a config file other than the default location
//! - `--list-devices`: print audio devices and exit

mod config;
mod control_panel;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, RecvTimeoutError};
use denoise_core::audio::start_audio_system;
use denoise_core::config::load_config;
use denoise_core::graph::{BundledRegistry, GraphManager};

use config::HostConfig;
use control_panel::{Command, ControlPanel, Flow};

/// How often the control loop polls for finished work
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    log::info!("denoise-host starting up");
    let config: HostConfig = load_config(&config_path);

    let mut stdout = std::io::stdout();
    if args.iter().any(|arg| arg == "--list-devices") {
        return control_panel::list_devices(&mut stdout);
    }

    let audio = start_audio_system(&config.audio).context("Failed to start audio")?;
    let handle = audio.handle;
    println!(
        "Audio running: input {}, output {}, {} frames (~{:.1}ms)",
        handle.input_format(),
        handle.output_format(),
        handle.buffer_size(),
        handle.latency_ms()
    );

    let graph_atomics = audio.graph.atomics().clone();
    let manager = GraphManager::new(
        Box::new(audio.graph),
        Arc::new(BundledRegistry::with_builtin()),
    );
    let enable_on_start = config.effect.enabled_on_start;
    let mut panel = ControlPanel::new(manager, config, config_path)?
        .with_graph_atomics(graph_atomics)
        .with_stream_stats(handle.stats().clone());

    if enable_on_start {
        panel.execute(Command::Enable, &mut stdout)?;
        panel.settle(&mut stdout)?;
    }
    println!("Type 'help' for commands.");

    let lines = spawn_stdin_reader();
    prompt(&mut stdout)?;
    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    match line.parse::<Command>() {
                        Ok(command) => {
                            if panel.execute(command, &mut stdout)? == Flow::Quit {
                                break;
                            }
                        }
                        Err(e) => println!("{}", e),
                    }
                }
                prompt(&mut stdout)?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        panel.poll(&mut stdout)?;
    }

    log::info!(
        "Shutting down ({} effect enabled)",
        if panel.manager().is_enabled() { "with" } else { "without" }
    );
    drop(panel);
    drop(handle);
    Ok(())
}

/// Forward stdin lines to the control loop
fn spawn_stdin_reader() -> channel::Receiver<String> {
    let (tx, rx) = channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("denoise-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("Failed to start stdin reader: {}", e);
    }
    rx
}

fn prompt(out: &mut impl Write) -> Result<()> {
    write!(out, "denoise> ")?;
    out.flush()?;
    Ok(())
}
