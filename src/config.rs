/*
 * This file is part of cpldmon.
 *
 * Copyright (C) 2025 cpldmon contributors
 *
 * cpldmon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * cpldmon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with cpldmon. If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cm_core::bus::RetryPolicy;
use cm_core::constants::{bus, cache, paths, thermal};
use cm_error::{CpldError, Result};

/// Overrides the configuration file location
pub const CONFIG_ENV: &str = "CPLDMON_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_attempts() -> u32 { bus::RETRY_ATTEMPTS }
fn default_delay_ms() -> u64 { bus::RETRY_DELAY.as_millis() as u64 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// One temperature sensor and its warning threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    pub name: String,
    pub bus: u32,
    pub address: u16,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_resolution")]
    pub resolution: u8,
    /// Warning threshold in milli-degrees Celsius
    #[serde(default = "default_high_warning")]
    pub high_warning_mc: i32,
    /// hwmon device name of the sensor, when the kernel's choice is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwmon: Option<String>,
}

fn default_driver() -> String { thermal::SENSOR_DRIVER.to_string() }
fn default_resolution() -> u8 { thermal::DEFAULT_RESOLUTION }
fn default_high_warning() -> i32 { 45_000 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ThermalConfig {
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
    #[serde(default = "default_sample_time_ms")]
    pub sample_time_ms: u64,
}

fn default_sensors() -> Vec<SensorConfig> {
    [
        ("Main Board 0x48", 14, 0x48),
        ("CPU Board 0x4B", 24, 0x4B),
        ("Fan Board 0x4A", 25, 0x4A),
    ]
    .into_iter()
    .map(|(name, bus, address)| SensorConfig {
        name: name.to_string(),
        bus,
        address,
        driver: default_driver(),
        resolution: default_resolution(),
        high_warning_mc: default_high_warning(),
        hwmon: None,
    })
    .collect()
}

fn default_sample_time_ms() -> u64 { thermal::DEFAULT_SAMPLE_TIME.as_millis() as u64 }

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            sensors: default_sensors(),
            sample_time_ms: default_sample_time_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bus")]
    pub i2c_bus: u32,
    #[serde(default = "default_cpld_address")]
    pub cpld_address: u16,
    /// Claim the CPLD address even if a kernel driver is bound to it
    #[serde(default)]
    pub force_address: bool,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub thermal: ThermalConfig,
}

fn default_bus() -> u32 { bus::DEFAULT_BUS }
fn default_cpld_address() -> u16 { bus::DEFAULT_CPLD_ADDRESS }
fn default_staleness_ms() -> u64 { cache::STALENESS_WINDOW.as_millis() as u64 }
fn default_sysfs_root() -> PathBuf { PathBuf::from(paths::SYSFS_ROOT) }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            i2c_bus: default_bus(),
            cpld_address: default_cpld_address(),
            force_address: false,
            retry: RetryConfig::default(),
            staleness_ms: default_staleness_ms(),
            sysfs_root: default_sysfs_root(),
            poll_interval_ms: default_poll_interval_ms(),
            log_level: default_log_level(),
            thermal: ThermalConfig::default(),
        }
    }
}

impl Config {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sample_time(&self) -> Duration {
        Duration::from_millis(self.thermal.sample_time_ms)
    }

    /// Parse and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| CpldError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Load `path`, or the defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpld_address > bus::MAX_ADDRESS {
            return Err(CpldError::invalid_config(
                "cpld_address",
                format!("0x{:x} is not a 7-bit address", self.cpld_address),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(CpldError::invalid_config("retry.attempts", "must be at least 1"));
        }
        if self.staleness_ms == 0 {
            return Err(CpldError::invalid_config("staleness_ms", "must be non-zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(CpldError::invalid_config("poll_interval_ms", "must be non-zero"));
        }
        if self.thermal.sample_time_ms == 0 {
            return Err(CpldError::invalid_config("thermal.sample_time_ms", "must be non-zero"));
        }
        if self.log_level.trim().is_empty() {
            return Err(CpldError::invalid_config("log_level", "must not be empty"));
        }

        let mut seen = HashSet::new();
        for sensor in &self.thermal.sensors {
            if sensor.address > bus::MAX_ADDRESS {
                return Err(CpldError::invalid_config(
                    "thermal.sensors",
                    format!("{}: 0x{:x} is not a 7-bit address", sensor.name, sensor.address),
                ));
            }
            if !(9..=12).contains(&sensor.resolution) {
                return Err(CpldError::invalid_config(
                    "thermal.sensors",
                    format!("{}: resolution {} not in 9..=12", sensor.name, sensor.resolution),
                ));
            }
            if let Some(name) = &sensor.hwmon {
                if name.is_empty() || name.contains('/') || name.starts_with('.') {
                    return Err(CpldError::invalid_config(
                        "thermal.sensors",
                        format!("{}: {:?} is not a hwmon device name", sensor.name, name),
                    ));
                }
            }
            if !seen.insert((sensor.bus, sensor.address)) {
                return Err(CpldError::invalid_config(
                    "thermal.sensors",
                    format!("duplicate sensor {}-{:04x}", sensor.bus, sensor.address),
                ));
            }
        }
        Ok(())
    }
}

/// Configuration path: `$CPLDMON_CONFIG` if set, else the system default
pub fn config_path() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(paths::CONFIG_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.i2c_bus, 3);
        assert_eq!(cfg.cpld_address, 0x60);
        assert_eq!(cfg.retry.policy(), RetryPolicy::default());
        assert_eq!(cfg.staleness(), Duration::from_millis(1500));
        assert_eq!(cfg.thermal.sensors.len(), 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_object_gets_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let file = write_config(r#"{ "i2c_bus": 7, "retry": { "attempts": 3 } }"#);
        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.i2c_bus, 7);
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.delay_ms, 60);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_config(r#"{ "i2c_buss": 7 }"#);
        assert!(matches!(Config::from_file(file.path()), Err(CpldError::JsonParse(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/cpldmon/config.json")).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/cpldmon/config.json")),
            Err(CpldError::FileRead { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut cfg = Config::default();
        cfg.retry.attempts = 0;
        assert!(matches!(cfg.validate(), Err(CpldError::InvalidConfig { ref field, .. }) if field == "retry.attempts"));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut cfg = Config::default();
        cfg.cpld_address = 0x80;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.thermal.sensors[0].address = 0xFF;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_sensor() {
        let mut cfg = Config::default();
        let dup = cfg.thermal.sensors[1].clone();
        cfg.thermal.sensors.push(dup);
        assert!(matches!(cfg.validate(), Err(CpldError::InvalidConfig { ref reason, .. }) if reason.contains("duplicate")));
    }

    #[test]
    fn test_sensor_hwmon_name() {
        let file = write_config(
            r#"{"thermal": {"sensors": [{"name": "a", "bus": 14, "address": 72, "hwmon": "hwmon4"}]}}"#,
        );
        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.thermal.sensors[0].hwmon.as_deref(), Some("hwmon4"));
        assert_eq!(Config::default().thermal.sensors[0].hwmon, None);

        let mut cfg = Config::default();
        cfg.thermal.sensors[0].hwmon = Some("../hwmon1".to_string());
        assert!(cfg.validate().is_err());
        cfg.thermal.sensors[0].hwmon = Some(String::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut cfg = Config::default();
        cfg.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.staleness_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_rejected_on_load() {
        let file = write_config(r#"{ "retry": { "attempts": 0 } }"#);
        assert!(matches!(Config::load(file.path()), Err(CpldError::InvalidConfig { .. })));
    }

    #[test]
    #[serial]
    fn test_config_path_env_override() {
        env::set_var(CONFIG_ENV, "/tmp/cpldmon-test.json");
        assert_eq!(config_path(), PathBuf::from("/tmp/cpldmon-test.json"));
        env::remove_var(CONFIG_ENV);
    }

    #[test]
    #[serial]
    fn test_config_path_default() {
        env::remove_var(CONFIG_ENV);
        assert_eq!(config_path(), PathBuf::from("/etc/cpldmon/config.json"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = Config::default();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
