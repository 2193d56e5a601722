use std::{path::Path, path::PathBuf, time::Duration};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The highest threshold the firmware accepts.
pub const MAX_THRESHOLD: u16 = 1023;

/// Which device the server should talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePort {
    /// A tty/COM port.
    /// Likely "/dev/ttyACMx" or "COMx".
    Tty(String),

    /// An in-process emulation of the pad firmware.
    /// Useful when no hardware is around.
    Mock,
}

/// How to reach the device, and how patient to be with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// The device to open.
    pub port: DevicePort,

    /// Baud rate of the serial port.
    pub baud: u32,

    /// How long a single read may block before yielding an empty line.
    pub read_timeout_ms: u64,

    /// How long to wait before retrying a failed open, or a write without a device.
    pub reconnect_backoff_ms: u64,

    /// How long the writer waits for a command before checking for shutdown.
    pub queue_poll_ms: u64,

    /// Pause after each sensor frame, limiting how often values are requested.
    pub values_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: DevicePort::Tty("/dev/ttyACM0".into()),
            baud: 115_200,
            read_timeout_ms: 1000,
            reconnect_backoff_ms: 1000,
            queue_poll_ms: 100,
            values_interval_ms: 10,
        }
    }
}

impl DeviceConfig {
    pub(crate) fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub(crate) fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub(crate) fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub(crate) fn values_interval(&self) -> Duration {
        Duration::from_millis(self.values_interval_ms)
    }
}

/// The sensors on the pad.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// How many sensors the firmware reports.
    pub count: usize,

    /// Maps logical sensor index to the device's sensor index.
    /// Must be a permutation of `0..count`.
    /// Empty means identity.
    pub order: Vec<usize>,

    /// The threshold every sensor of the default profile starts with.
    pub default_threshold: u16,

    /// The image of the default profile.
    pub default_image: Option<String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            count: 8,
            order: vec![],
            default_threshold: 1000,
            default_image: Some("default.gif".into()),
        }
    }
}

impl SensorConfig {
    /// The sensor order with the identity filled in if none was given.
    pub fn resolved_order(&self) -> Vec<usize> {
        if self.order.is_empty() {
            (0..self.count).collect()
        } else {
            self.order.clone()
        }
    }

    /// How many commands may wait for the device at once.
    /// Room for a full set of thresholds plus some headroom.
    pub fn queue_capacity(&self) -> usize {
        self.count + 10
    }
}

/// The configuration used for running the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The device connection.
    pub device: DeviceConfig,

    /// The sensor layout and defaults.
    pub sensors: SensorConfig,

    /// Where profiles are persisted, one JSON record per line.
    pub profiles_path: PathBuf,

    /// Where profile images live.
    pub images_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            sensors: SensorConfig::default(),
            profiles_path: "profiles.txt".into(),
            images_dir: "images".into(),
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Could not parse configuration: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: DeviceConfig {
                port: DevicePort::Tty("/dev/ttyACM0".into()),
                ..Default::default()
            },
            sensors: SensorConfig {
                order: vec![0, 1, 2, 3, 7, 6, 5, 4],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap_or_else(|e| format!("Could not serialize configuration: {e}"))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|e| {
            Error::BadConfig(format!("Could not read {:?}: {e}", p.as_ref()))
        })?;

        Self::deserialize(&s)
    }

    fn check_sensor_count(&self) -> Result<(), Error> {
        if self.sensors.count == 0 {
            return Err(Error::BadConfig("The sensor count must be at least 1".into()));
        }

        Ok(())
    }

    fn check_sensor_order(&self) -> Result<(), Error> {
        if self.sensors.order.is_empty() {
            return Ok(());
        }

        let count = self.sensors.count;
        let order = &self.sensors.order;

        if order.len() != count {
            return Err(Error::BadConfig(format!(
                "The sensor order has {} entries but there are {count} sensors",
                order.len()
            )));
        }

        let out_of_range = order.iter().filter(|&&i| i >= count).collect::<Vec<_>>();
        if !out_of_range.is_empty() {
            return Err(Error::BadConfig(format!(
                "The sensor order must only use indices below {count}. Out of range: {out_of_range:?}"
            )));
        }

        let duplicates = order.iter().duplicates().collect::<Vec<_>>();
        if !duplicates.is_empty() {
            return Err(Error::BadConfig(format!(
                "The sensor order must be a permutation. Duplicates: {duplicates:?}"
            )));
        }

        Ok(())
    }

    fn check_default_threshold(&self) -> Result<(), Error> {
        if self.sensors.default_threshold > MAX_THRESHOLD {
            return Err(Error::BadConfig(format!(
                "The default threshold {} is above the maximum of {MAX_THRESHOLD}",
                self.sensors.default_threshold
            )));
        }

        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.check_sensor_count()?;
        self.check_sensor_order()?;
        self.check_default_threshold()?;

        Ok(())
    }
}
