//! Audio device enumeration
//!
//! Lists capture and playback devices from every available audio host so
//! the control panel can offer input and output pickers.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Stream direction of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&host_id| host_name(host_id) == name)
        .and_then(|host_id| cpal::host_from_id(host_id).ok())
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction, e);
            None
        }
    }
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g., "ALSA", "CoreAudio")
    pub host: String,
    pub direction: Direction,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

/// All devices of one direction from every host
///
/// Sorted default devices first, then by host and name.
pub fn get_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_name_str = host_name(host_id);
        let default_device_name = default_of(&host, direction).and_then(|d| d.name().ok());

        let Some(devices) = devices_of(&host, direction) else {
            continue;
        };

        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };

            let configs: Vec<_> = match direction {
                Direction::Input => device.supported_input_configs().map(|c| c.collect::<Vec<_>>()),
                Direction::Output => device.supported_output_configs().map(|c| c.collect::<Vec<_>>()),
            }
            .unwrap_or_default();
            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for config in &configs {
                max_channels = max_channels.max(config.channels());
                for rate in [16000, 44100, 48000, 88200, 96000] {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                is_default: default_device_name.as_ref() == Some(&name),
                name,
                host: host_name_str.clone(),
                direction,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} audio {} devices",
        all_devices.len(),
        direction
    );
    Ok(all_devices)
}

/// Devices for a picker; enumeration failures yield an empty list
pub fn get_available_devices(direction: Direction) -> Vec<AudioDevice> {
    match get_devices(direction) {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate audio devices: {}", e);
            Vec::new()
        }
    }
}

/// Find a device by its ID
///
/// Uses the host named in the ID if available, otherwise searches all hosts.
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return devices_of(&host, direction)
            .and_then(|devices| devices.into_iter().find(matches))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| devices_of(&host, direction))
        .flat_map(|devices| devices.into_iter())
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// The default host's default device for `direction`
pub fn get_cpal_default_device(direction: Direction) -> AudioResult<cpal::Device> {
    default_of(&cpal::default_host(), direction)
        .ok_or_else(|| AudioError::NoDefaultDevice(format!("No default {} device", direction)))
}

/// Configured device, or the default when none is configured
pub fn resolve_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device_by_id(id, direction),
        None => get_cpal_default_device(direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Depends on the machine; only checks that enumeration does not panic
        for direction in [Direction::Input, Direction::Output] {
            match get_devices(direction) {
                Ok(devices) => {
                    for device in &devices {
                        assert_eq!(device.direction, direction);
                        println!("  - {} ({} ch)", device, device.max_channels);
                    }
                }
                Err(AudioError::NoDevices(_)) => {
                    println!("No {} devices available (expected in CI)", direction);
                }
                Err(e) => println!("Error enumerating devices: {}", e),
            }
        }
    }

    #[test]
    fn test_missing_device_is_reported() {
        let id = DeviceId::with_host("definitely-not-a-device", "NoSuchHost");
        assert!(find_device_by_id(&id, Direction::Input).is_err());
    }
}
