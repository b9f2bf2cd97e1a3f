//! System temperature aggregation
//!
//! The system temperature is the sum of the three LM75 sensors at 0x48,
//! 0x4A and 0x4B. Each sensor is read from its own sample when fresh, or
//! through the published (sysfs) value when due. If any of the three cannot
//! be read the result is [`thermal::UNAVAILABLE`].

mod lm75;
mod sysfs;

pub use lm75::{raw_to_millicelsius, Lm75Sensor, TEMP_REGISTER};
pub use sysfs::SysfsTemperatureReader;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::constants::thermal;
use crate::error::{CpldError, Result};

/// Out-of-band temperature read, used when a sensor's own sample is stale
#[cfg_attr(test, mockall::automock)]
pub trait PublishedTemperature: Send + Sync {
    /// Temperature of the sensor at `bus`/`address` in milli-degrees Celsius
    fn read_published(&self, bus: u32, address: u16) -> Result<i32>;
}

/// One sensor contribution to the system temperature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemperatureReading {
    pub bus: u32,
    pub address: u16,
    pub name: String,
    pub millicelsius: i32,
    /// true when taken from the sensor's own sample, false for the fallback
    pub cached: bool,
}

pub struct TemperatureAggregator {
    sensors: RwLock<Vec<Arc<Lm75Sensor>>>,
    fallback: Arc<dyn PublishedTemperature>,
    clock: Arc<dyn Clock>,
}

impl TemperatureAggregator {
    pub fn new(fallback: Arc<dyn PublishedTemperature>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sensors: RwLock::new(Vec::new()),
            fallback,
            clock,
        }
    }

    /// Make a sensor known to the aggregator. Sensors outside the
    /// whitelist are kept but never summed.
    pub fn add_sensor(&self, sensor: Arc<Lm75Sensor>) {
        debug!(
            "Known sensor {} ({} at {}-{:04x})",
            sensor.name(),
            sensor.driver(),
            sensor.bus(),
            sensor.address()
        );
        self.sensors.write().push(sensor);
    }

    pub fn sensors(&self) -> Vec<Arc<Lm75Sensor>> {
        self.sensors.read().clone()
    }

    /// Whether `sensor` takes part in the system temperature
    pub fn is_aggregated(sensor: &Lm75Sensor) -> bool {
        sensor.driver() == thermal::SENSOR_DRIVER
            && thermal::SENSOR_ADDRESSES.contains(&sensor.address())
    }

    /// Sample every sensor that has a bus attached. Failures are logged and
    /// leave the old sample in place.
    pub fn sample_all(&self) {
        for sensor in self.sensors() {
            if let Err(e) = sensor.sample(self.clock.as_ref()) {
                debug!("Sampling {} failed: {}", sensor.name(), e);
            }
        }
    }

    /// Readings of the aggregated sensors that could be read
    pub fn readings(&self) -> Vec<TemperatureReading> {
        let sensors = self.sensors();
        let mut readings = Vec::with_capacity(thermal::REQUIRED_SENSORS);

        for sensor in sensors.iter().filter(|s| Self::is_aggregated(s)) {
            let now = self.clock.now();
            let (value, cached) = match sensor.cached_millicelsius(now) {
                Some(mc) => (mc, true),
                None => match self.fallback.read_published(sensor.bus(), sensor.address()) {
                    Ok(mc) => (mc, false),
                    Err(e) => {
                        debug!("No temperature from {}: {}", sensor.name(), e);
                        continue;
                    }
                },
            };
            readings.push(TemperatureReading {
                bus: sensor.bus(),
                address: sensor.address(),
                name: sensor.name().to_string(),
                millicelsius: value,
                cached,
            });
        }
        readings
    }

    /// Sum of the three sensors, or an error naming how many were found
    pub fn try_aggregate(&self) -> Result<i32> {
        sum_readings(&self.readings())
    }

    /// Sum of the three sensors, or [`thermal::UNAVAILABLE`]
    pub fn aggregate(&self) -> i32 {
        self.try_aggregate().unwrap_or(thermal::UNAVAILABLE)
    }
}

/// System temperature from already collected readings. Exactly
/// [`thermal::REQUIRED_SENSORS`] readings are needed, and a sum that would
/// overflow or collide with [`thermal::UNAVAILABLE`] is rejected.
pub fn sum_readings(readings: &[TemperatureReading]) -> Result<i32> {
    if readings.len() != thermal::REQUIRED_SENSORS {
        warn!(
            "Only {} of {} temperature sensors found",
            readings.len(),
            thermal::REQUIRED_SENSORS
        );
        return Err(CpldError::SensorIncomplete {
            found: readings.len(),
            required: thermal::REQUIRED_SENSORS,
        });
    }

    let sum = readings
        .iter()
        .try_fold(0i32, |sum, r| sum.checked_add(r.millicelsius))
        .filter(|sum| *sum != thermal::UNAVAILABLE);
    sum.ok_or_else(|| {
        let wide: i64 = readings.iter().map(|r| i64::from(r.millicelsius)).sum();
        warn!("System temperature sum {} is not representable", wide);
        CpldError::out_of_range(
            "sys_temp",
            wide,
            i64::from(i32::MIN),
            i64::from(thermal::UNAVAILABLE) - 1,
        )
    })
}
