//! LM75-class temperature sensor
//!
//! Keeps the last raw sample of the temperature register with its time.
//! The sample is considered stale once `sample_time` has passed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::bus::BusTransport;
use crate::clock::Clock;
use crate::constants::thermal;
use crate::error::{CpldError, Result};

/// Temperature register
pub const TEMP_REGISTER: u8 = 0x00;

/// Convert a raw temperature register to milli-degrees Celsius.
///
/// `resolution` is the number of significant bits (9 to 12), left aligned
/// in the 16-bit two's complement register.
pub fn raw_to_millicelsius(raw: i16, resolution: u8) -> i32 {
    let resolution = resolution.clamp(9, 12);
    ((i32::from(raw) >> (16 - resolution)) * 1000) >> (resolution - 8)
}

#[derive(Debug, Default)]
struct Sample {
    raw: i16,
    last_updated: Option<Instant>,
}

pub struct Lm75Sensor {
    bus: u32,
    address: u16,
    name: String,
    driver: String,
    resolution: u8,
    sample_time: Duration,
    transport: Option<Arc<BusTransport>>,
    sample: Mutex<Sample>,
}

impl Lm75Sensor {
    pub fn new(bus: u32, address: u16, name: impl Into<String>) -> Self {
        Self {
            bus,
            address,
            name: name.into(),
            driver: thermal::SENSOR_DRIVER.to_string(),
            resolution: thermal::DEFAULT_RESOLUTION,
            sample_time: thermal::DEFAULT_SAMPLE_TIME,
            transport: None,
            sample: Mutex::new(Sample::default()),
        }
    }

    /// Name of the driver bound to the sensor
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_resolution(mut self, resolution: u8) -> Result<Self> {
        if !(9..=12).contains(&resolution) {
            return Err(CpldError::out_of_range("resolution", i64::from(resolution), 9, 12));
        }
        self.resolution = resolution;
        Ok(self)
    }

    pub fn with_sample_time(mut self, sample_time: Duration) -> Self {
        self.sample_time = sample_time;
        self
    }

    /// Bus the sensor can be sampled on directly
    pub fn with_transport(mut self, transport: Arc<BusTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn resolution(&self) -> u8 {
        self.resolution
    }

    pub fn sample_time(&self) -> Duration {
        self.sample_time
    }

    /// Store a raw register value sampled at `at`
    pub fn record_sample(&self, raw: i16, at: Instant) {
        let mut sample = self.sample.lock();
        sample.raw = raw;
        sample.last_updated = Some(at);
    }

    /// Whether the cached sample is older than the sample interval, or
    /// there has never been one
    pub fn is_due(&self, now: Instant) -> bool {
        match self.sample.lock().last_updated {
            Some(at) => now.saturating_duration_since(at) > self.sample_time,
            None => true,
        }
    }

    /// Cached reading in milli-degrees, `None` when due
    pub fn cached_millicelsius(&self, now: Instant) -> Option<i32> {
        let sample = self.sample.lock();
        match sample.last_updated {
            Some(at) if now.saturating_duration_since(at) <= self.sample_time => {
                Some(raw_to_millicelsius(sample.raw, self.resolution))
            }
            _ => None,
        }
    }

    /// Sample the chip over its bus, if one was attached.
    ///
    /// Only the high byte of the register is read (byte-data transaction),
    /// giving whole-degree precision.
    pub fn sample(&self, clock: &dyn Clock) -> Result<Option<i32>> {
        let transport = match &self.transport {
            Some(t) => t,
            None => return Ok(None),
        };
        let msb = transport.read(self.address, TEMP_REGISTER)?;
        let raw = i16::from_be_bytes([msb, 0]);
        self.record_sample(raw, clock.now());
        debug!(
            "Sampled {} ({}-{:04x}): raw 0x{:04x}",
            self.name, self.bus, self.address, raw as u16
        );
        Ok(Some(raw_to_millicelsius(raw, self.resolution)))
    }
}
