//! Platform wiring
//!
//! [`Platform`] owns the client registry and the temperature aggregator and
//! resolves `(address, attribute)` requests against them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::attributes::{self, AttrValue};
use crate::bus::BusTransport;
use crate::cpld::{CpldDevice, FanReading, PortReading};
use crate::error::Result;
use crate::registry::ClientRegistry;
use crate::constants::thermal;
use crate::thermal::{sum_readings, TemperatureAggregator, TemperatureReading};

/// Everything known about one CPLD at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub address: u16,
    pub version: u8,
    pub duty_cycle_percentage: u32,
    pub fans: Vec<FanReading>,
    pub ports: Vec<PortReading>,
    pub temperatures: Vec<TemperatureReading>,
    /// Sum of the three sensors, i32::MAX when incomplete
    pub sys_temp: i32,
}

pub struct Platform {
    transport: Arc<BusTransport>,
    registry: ClientRegistry,
    thermal: TemperatureAggregator,
    staleness: Duration,
}

impl Platform {
    pub fn new(transport: Arc<BusTransport>, thermal: TemperatureAggregator, staleness: Duration) -> Self {
        Self {
            transport,
            registry: ClientRegistry::new(),
            thermal,
            staleness,
        }
    }

    pub fn transport(&self) -> &Arc<BusTransport> {
        &self.transport
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn thermal(&self) -> &TemperatureAggregator {
        &self.thermal
    }

    /// Create and register a CPLD client at `address`
    pub fn attach(&self, address: u16) -> Result<Arc<CpldDevice>> {
        let device = Arc::new(CpldDevice::new(address, self.transport.clone(), self.staleness));
        self.registry.register(device.clone())?;
        info!("Attached AS4630-54PE CPLD at 0x{:02x}", address);
        Ok(device)
    }

    pub fn detach(&self, address: u16) -> Result<()> {
        self.registry.unregister(address)?;
        info!("Detached CPLD at 0x{:02x}", address);
        Ok(())
    }

    pub fn show(&self, address: u16, name: &str) -> Result<AttrValue> {
        let attr = attributes::find(name)?;
        let device = self.registry.lookup(address)?;
        attr.show(&device, &self.thermal)
    }

    pub fn store(&self, address: u16, name: &str, input: &str) -> Result<()> {
        let attr = attributes::find(name)?;
        let device = self.registry.lookup(address)?;
        attr.store(&device, input)
    }

    pub fn snapshot(&self, address: u16) -> Result<Snapshot> {
        let device = self.registry.lookup(address)?;
        let temperatures = self.thermal.readings();
        Ok(Snapshot {
            address,
            version: device.version()?,
            duty_cycle_percentage: device.duty_cycle_percentage()?,
            fans: device.fans()?,
            ports: device.ports()?,
            sys_temp: sum_readings(&temperatures).unwrap_or(thermal::UNAVAILABLE),
            temperatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{RetryPolicy, SimulatedBus};
    use crate::clock::ManualClock;
    use crate::constants::{cache, thermal};
    use crate::error::CpldError;
    use crate::thermal::{Lm75Sensor, MockPublishedTemperature};

    fn platform() -> (Arc<SimulatedBus>, Platform) {
        let bus = Arc::new(SimulatedBus::as4630_54pe(0x60));
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(BusTransport::new(bus.clone(), clock.clone(), RetryPolicy::default()));
        let mut fallback = MockPublishedTemperature::new();
        fallback.expect_read_published().returning(|_, _| Ok(40_000));
        let temps = TemperatureAggregator::new(Arc::new(fallback), clock);
        for (bus_nr, address) in [(14, 0x48), (24, 0x4B), (25, 0x4A)] {
            temps.add_sensor(Arc::new(Lm75Sensor::new(bus_nr, address, format!("0x{:02X}", address))));
        }
        (bus, Platform::new(transport, temps, cache::STALENESS_WINDOW))
    }

    #[test]
    fn test_show_and_store_by_address() {
        let (bus, platform) = platform();
        platform.attach(0x60).unwrap();

        assert_eq!(platform.show(0x60, "sys_temp").unwrap(), AttrValue::Int(120_000));
        platform.store(0x60, "fan_duty_cycle_percentage", "100").unwrap();
        assert_eq!(bus.register(0x60, 0x1B), Some(16));

        assert!(matches!(platform.show(0x61, "version"), Err(CpldError::UnknownAddress(0x61))));
        assert!(matches!(platform.show(0x60, "bogus"), Err(CpldError::UnknownAttribute(_))));
    }

    #[test]
    fn test_attach_twice() {
        let (_bus, platform) = platform();
        platform.attach(0x60).unwrap();
        assert!(matches!(platform.attach(0x60), Err(CpldError::AddressInUse(0x60))));
        platform.detach(0x60).unwrap();
        platform.attach(0x60).unwrap();
    }

    #[test]
    fn test_snapshot() {
        let (_bus, platform) = platform();
        platform.attach(0x60).unwrap();

        let snap = platform.snapshot(0x60).unwrap();
        assert_eq!(snap.version, 0x0B);
        assert_eq!(snap.duty_cycle_percentage, 50);
        assert_eq!(snap.fans.len(), 3);
        assert_eq!(snap.ports.len(), 6);
        assert_eq!(snap.temperatures.len(), thermal::REQUIRED_SENSORS);
        assert_eq!(snap.sys_temp, 120_000);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["fans"][0]["rpm"], 60 * 114);
        assert!(json["ports"][5].get("rx_los").is_none());
    }

    #[test]
    fn test_snapshot_reads_each_sensor_once() {
        use std::sync::atomic::{AtomicI32, Ordering};

        let bus = Arc::new(SimulatedBus::as4630_54pe(0x60));
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(BusTransport::new(bus, clock.clone(), RetryPolicy::default()));
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        let mut fallback = MockPublishedTemperature::new();
        // Every read returns a different value
        fallback
            .expect_read_published()
            .times(3)
            .returning(move |_, _| Ok(30_000 + 1_000 * counter.fetch_add(1, Ordering::SeqCst)));
        let temps = TemperatureAggregator::new(Arc::new(fallback), clock);
        for (bus_nr, address) in [(14, 0x48), (24, 0x4B), (25, 0x4A)] {
            temps.add_sensor(Arc::new(Lm75Sensor::new(bus_nr, address, format!("0x{:02X}", address))));
        }
        let platform = Platform::new(transport, temps, cache::STALENESS_WINDOW);
        platform.attach(0x60).unwrap();

        let snap = platform.snapshot(0x60).unwrap();
        let total: i32 = snap.temperatures.iter().map(|t| t.millicelsius).sum();
        assert_eq!(snap.sys_temp, total);
        assert_eq!(snap.sys_temp, 93_000);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
