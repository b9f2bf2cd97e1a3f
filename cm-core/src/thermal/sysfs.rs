//! Published temperature reader over sysfs
//!
//! Reads `temp1_input` of an I2C sensor through its hwmon directory:
//! `<root>/bus/i2c/devices/<bus>-<addr:04x>/hwmon/hwmon<i>/temp1_input`.
//! Reading the file makes the sensor driver sample the chip, so this is the
//! fallback when the in-process sample has gone stale. A sensor whose hwmon
//! device name is known is read from that directory; otherwise indices
//! `0..10` are probed.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::PublishedTemperature;
use crate::constants::{paths, thermal};
use crate::error::{CpldError, Result};

#[derive(Debug, Clone)]
pub struct SysfsTemperatureReader {
    root: PathBuf,
    known: HashMap<(u32, u16), String>,
}

impl Default for SysfsTemperatureReader {
    fn default() -> Self {
        Self::new(paths::SYSFS_ROOT)
    }
}

impl SysfsTemperatureReader {
    /// Reader rooted at `root` (normally `/sys`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: HashMap::new(),
        }
    }

    /// Remember the hwmon device name (e.g. `hwmon4`) of the sensor at
    /// `bus`/`address`
    pub fn with_hwmon_name(mut self, bus: u32, address: u16, name: impl Into<String>) -> Self {
        self.known.insert((bus, address), name.into());
        self
    }

    pub fn hwmon_name(&self, bus: u32, address: u16) -> Option<&str> {
        self.known.get(&(bus, address)).map(String::as_str)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// hwmon directory of the device at `bus`/`address`
    pub fn device_hwmon_dir(&self, bus: u32, address: u16) -> PathBuf {
        self.root
            .join("bus/i2c/devices")
            .join(format!("{}-{:04x}", bus, address))
            .join("hwmon")
    }

    /// `temp1_input` under the known hwmon name if it exists, else the
    /// first `hwmon<i>/temp1_input` probing i in 0..10
    pub fn resolve(&self, bus: u32, address: u16) -> Option<PathBuf> {
        let dir = self.device_hwmon_dir(bus, address);
        if let Some(name) = self.hwmon_name(bus, address) {
            let path = dir.join(name).join("temp1_input");
            if path.is_file() {
                return Some(path);
            }
            debug!("{} missing, probing hwmon indices", path.display());
        }
        (0..thermal::MAX_HWMON_INDEX)
            .map(|i| dir.join(format!("hwmon{}", i)).join("temp1_input"))
            .find(|p| p.is_file())
    }
}

impl PublishedTemperature for SysfsTemperatureReader {
    fn read_published(&self, bus: u32, address: u16) -> Result<i32> {
        let path = self.resolve(bus, address).ok_or_else(|| CpldError::SensorRead {
            bus,
            address,
            reason: format!("no temp1_input under {}", self.device_hwmon_dir(bus, address).display()),
        })?;
        debug!("Reading published temperature from {}", path.display());

        let raw = read_trimmed(&path).map_err(|source| CpldError::FileRead {
            path: path.clone(),
            source,
        })?;
        // Only the leading integer counts, like "%d"
        let digits: String = raw
            .char_indices()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
            .map(|(_, c)| c)
            .collect();
        digits.parse::<i32>().map_err(|_| CpldError::SensorRead {
            bus,
            address,
            reason: format!("unparsable temp1_input {:?}", raw),
        })
    }
}

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim().to_string())
}
