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

//! Builds a [`Platform`] from the configuration, on real or simulated buses

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use cm_core::bus::{BusTransport, I2cDevAdapter, SimulatedBus, SmbusAdapter};
use cm_core::clock::{Clock, SystemClock};
use cm_core::thermal::{Lm75Sensor, SysfsTemperatureReader, TemperatureAggregator, TEMP_REGISTER};
use cm_core::Platform;
use cm_error::Result;

use crate::config::Config;

/// Temperature reported by every simulated sensor, in whole degrees
pub const SIMULATED_TEMP_C: u8 = 35;

/// A platform and, in simulation, the buses behind it
pub struct App {
    pub config: Config,
    pub platform: Platform,
    pub simulated: HashMap<u32, Arc<SimulatedBus>>,
}

impl App {
    /// Open the configured adapter and attach the CPLD
    pub fn open(config: Config) -> Result<Self> {
        let adapter: Arc<dyn SmbusAdapter> =
            Arc::new(I2cDevAdapter::open(config.i2c_bus, config.force_address)?);
        info!("Using /dev/i2c-{} for the CPLD at 0x{:02x}", config.i2c_bus, config.cpld_address);
        Self::build(config, adapter, Arc::new(SystemClock), HashMap::new())
    }

    /// In-process AS4630-54PE: the CPLD on the configured bus and an LM75
    /// on each sensor bus
    pub fn simulated(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut buses: HashMap<u32, Arc<SimulatedBus>> = HashMap::new();
        let cpld_bus = Arc::new(SimulatedBus::as4630_54pe(config.cpld_address));
        buses.insert(config.i2c_bus, cpld_bus.clone());

        for sensor in &config.thermal.sensors {
            let bus = buses
                .entry(sensor.bus)
                .or_insert_with(|| Arc::new(SimulatedBus::new()))
                .clone();
            bus.set_register(sensor.address, TEMP_REGISTER, SIMULATED_TEMP_C);
        }
        info!("Simulating AS4630-54PE on {} bus(es)", buses.len());

        Self::build(config, cpld_bus, clock, buses)
    }

    fn build(
        config: Config,
        adapter: Arc<dyn SmbusAdapter>,
        clock: Arc<dyn Clock>,
        simulated: HashMap<u32, Arc<SimulatedBus>>,
    ) -> Result<Self> {
        let policy = config.retry.policy();
        let transport = Arc::new(BusTransport::new(adapter, clock.clone(), policy));

        let mut reader = SysfsTemperatureReader::new(config.sysfs_root.clone());
        for sc in &config.thermal.sensors {
            if let Some(name) = &sc.hwmon {
                reader = reader.with_hwmon_name(sc.bus, sc.address, name.clone());
            }
        }
        let fallback = Arc::new(reader);
        let thermal = TemperatureAggregator::new(fallback, clock.clone());
        for sc in &config.thermal.sensors {
            let mut sensor = Lm75Sensor::new(sc.bus, sc.address, sc.name.clone())
                .with_driver(sc.driver.clone())
                .with_resolution(sc.resolution)?
                .with_sample_time(config.sample_time());
            // Real sensors belong to the kernel driver and are read through sysfs
            if let Some(bus) = simulated.get(&sc.bus) {
                let bus: Arc<dyn SmbusAdapter> = bus.clone();
                sensor = sensor.with_transport(Arc::new(BusTransport::new(bus, clock.clone(), policy)));
            }
            thermal.add_sensor(Arc::new(sensor));
        }

        let platform = Platform::new(transport, thermal, config.staleness());
        platform.attach(config.cpld_address)?;

        Ok(Self {
            config,
            platform,
            simulated,
        })
    }

    pub fn address(&self) -> u16 {
        self.config.cpld_address
    }

    /// Simulated bus carrying the CPLD, if simulating
    pub fn cpld_bus(&self) -> Option<&Arc<SimulatedBus>> {
        self.simulated.get(&self.config.i2c_bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::clock::ManualClock;
    use cm_core::AttrValue;

    #[test]
    fn test_simulated_platform() {
        let app = App::simulated(Config::default(), Arc::new(ManualClock::new())).unwrap();
        assert_eq!(app.platform.registry().addresses(), vec![0x60]);
        assert_eq!(app.simulated.len(), 4);
        assert!(app.cpld_bus().is_some());
        assert_eq!(app.platform.show(0x60, "version").unwrap(), AttrValue::Int(0x0B));
    }

    #[test]
    fn test_simulated_sensors_sample_over_bus() {
        let sysfs = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.sysfs_root = sysfs.path().to_path_buf();
        let app = App::simulated(cfg, Arc::new(ManualClock::new())).unwrap();
        // Nothing sampled yet and no sysfs tree: incomplete
        assert_eq!(app.platform.thermal().aggregate(), i32::MAX);

        app.platform.thermal().sample_all();
        assert_eq!(app.platform.thermal().aggregate(), 3 * 35_000);
    }

    #[test]
    fn test_configured_hwmon_name_used_before_first_sample() {
        use crate::test_utils::test_utils::create_mock_temp_input;

        let sysfs = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.sysfs_root = sysfs.path().to_path_buf();
        cfg.thermal.sensors[0].hwmon = Some("hwmon15".to_string());
        for (i, sc) in cfg.thermal.sensors.iter().enumerate() {
            create_mock_temp_input(sysfs.path(), sc.bus, sc.address, 1, 20_000 + i as i32);
        }
        create_mock_temp_input(sysfs.path(), 14, 0x48, 15, 50_000);

        let app = App::simulated(cfg, Arc::new(ManualClock::new())).unwrap();
        let readings = app.platform.thermal().readings();
        assert_eq!(readings[0].millicelsius, 50_000);
        assert!(!readings[0].cached);
        assert_eq!(app.platform.thermal().aggregate(), 50_000 + 20_001 + 20_002);
    }

    #[test]
    fn test_open_missing_adapter() {
        let mut cfg = Config::default();
        cfg.i2c_bus = 250;
        assert!(App::open(cfg).is_err());
    }
}
