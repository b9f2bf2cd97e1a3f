//! AS4630-54PE system CPLD client
//!
//! Fan attributes are decoded from a cached snapshot of the fan registers.
//! Port attributes and the version are read live from the device. Every
//! access, cached or live, happens under the device mutex, so a refresh and
//! the decode that follows it, or a read-modify-write, are never interleaved
//! with another caller.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::bitfield::{self, BitKind};
use crate::bus::BusTransport;
use crate::cache::RegisterCache;
use crate::constants::{fan, port, registers};
use crate::error::{CpldError, Result};

/// Decoded state of one fan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanReading {
    pub id: u8,
    pub present: bool,
    /// true when the direction bit is set
    pub direction: bool,
    pub rpm: u32,
    pub fault: bool,
    pub speed_percent: u32,
}

/// Decoded state of one transceiver port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortReading {
    pub port: u8,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_los: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_fault: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_disable: Option<bool>,
}

pub struct CpldDevice {
    address: u16,
    transport: Arc<BusTransport>,
    cache: Mutex<RegisterCache>,
}

impl CpldDevice {
    pub fn new(address: u16, transport: Arc<BusTransport>, staleness: Duration) -> Self {
        Self {
            address,
            transport,
            cache: Mutex::new(RegisterCache::new(&registers::FAN_CACHE, staleness)),
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn transport(&self) -> &Arc<BusTransport> {
        &self.transport
    }

    /// Refresh the fan snapshot if it is stale. Returns its validity.
    pub fn refresh(&self) -> bool {
        self.cache.lock().refresh(&self.transport, self.address)
    }

    pub fn is_valid(&self) -> bool {
        self.cache.lock().is_valid()
    }

    /// Run `decode` against a fresh fan snapshot, holding the device lock
    fn with_fan_cache<T>(&self, decode: impl FnOnce(&RegisterCache) -> Result<T>) -> Result<T> {
        let mut cache = self.cache.lock();
        if !cache.refresh(&self.transport, self.address) {
            return Err(CpldError::CacheInvalid {
                address: self.address,
            });
        }
        decode(&cache)
    }

    fn fan_bit(&self, kind: BitKind, id: u8) -> Result<bool> {
        let field = bitfield::field(kind, id)?;
        self.with_fan_cache(|cache| Ok(field.decode(cache.value(self.address, field.register)?)))
    }

    fn speed_register(id: u8) -> Result<u8> {
        if id == 0 || id > fan::COUNT {
            return Err(CpldError::UnknownChannel {
                kind: "fan".to_string(),
                index: id,
            });
        }
        Ok(registers::FAN_SPEED[usize::from(id - 1)])
    }

    pub fn fan_present(&self, id: u8) -> Result<bool> {
        self.fan_bit(BitKind::FanPresent, id)
    }

    pub fn fan_direction(&self, id: u8) -> Result<bool> {
        self.fan_bit(BitKind::FanDirection, id)
    }

    pub fn fan_speed_rpm(&self, id: u8) -> Result<u32> {
        let register = Self::speed_register(id)?;
        self.with_fan_cache(|cache| Ok(bitfield::rpm_from_reg(cache.value(self.address, register)?)))
    }

    /// A fan is faulty when its front tachometer reads zero
    pub fn fan_fault(&self, id: u8) -> Result<bool> {
        let register = Self::speed_register(id)?;
        self.with_fan_cache(|cache| {
            Ok(bitfield::fan_fault_from_reg(cache.value(self.address, register)?))
        })
    }

    pub fn duty_cycle_percentage(&self) -> Result<u32> {
        self.with_fan_cache(|cache| {
            Ok(bitfield::duty_cycle_from_reg(
                cache.value(self.address, registers::FAN_PWM_1)?,
            ))
        })
    }

    /// Set the duty cycle of both fan controllers
    pub fn set_duty_cycle(&self, percent: i64) -> Result<()> {
        let value = bitfield::duty_cycle_to_reg(percent)?;
        let mut cache = self.cache.lock();
        // The snapshot no longer matches the hardware, even on partial failure
        cache.invalidate();
        self.transport.write(self.address, registers::FAN_PWM_1, value)?;
        self.transport.write(self.address, registers::FAN_PWM_2, value)?;
        debug!("0x{:02x} duty cycle set to {}% (0x{:02x})", self.address, percent, value);
        Ok(())
    }

    /// Every fan decoded from one snapshot
    pub fn fans(&self) -> Result<Vec<FanReading>> {
        self.with_fan_cache(|cache| {
            (1..=fan::COUNT)
                .map(|id| {
                    let present = bitfield::field(BitKind::FanPresent, id)?;
                    let direction = bitfield::field(BitKind::FanDirection, id)?;
                    let status = cache.value(self.address, registers::FAN_STATUS)?;
                    let raw = cache.value(self.address, Self::speed_register(id)?)?;
                    let is_present = present.decode(status);
                    let rpm = bitfield::rpm_from_reg(raw);
                    Ok(FanReading {
                        id,
                        present: is_present,
                        direction: direction.decode(status),
                        rpm,
                        fault: bitfield::fan_fault_from_reg(raw),
                        speed_percent: if is_present { bitfield::speed_percent(rpm) } else { 0 },
                    })
                })
                .collect()
        })
    }

    fn port_bit(&self, kind: BitKind, port: u8) -> Result<bool> {
        let field = bitfield::field(kind, port)?;
        let _guard = self.cache.lock();
        let raw = self.transport.read(self.address, field.register)?;
        Ok(field.decode(raw))
    }

    pub fn module_present(&self, port: u8) -> Result<bool> {
        self.port_bit(BitKind::ModulePresent, port)
    }

    pub fn rx_los(&self, port: u8) -> Result<bool> {
        self.port_bit(BitKind::ModuleRxLos, port)
    }

    pub fn tx_fault(&self, port: u8) -> Result<bool> {
        self.port_bit(BitKind::ModuleTxFault, port)
    }

    pub fn tx_disable(&self, port: u8) -> Result<bool> {
        self.port_bit(BitKind::ModuleTxDisable, port)
    }

    /// Read-modify-write of a transmit-disable line. A failed read leaves
    /// the register untouched.
    ///
    /// The line reads active high but is written active low: disabling
    /// clears the bit, enabling sets it.
    pub fn set_tx_disable(&self, port: u8, disable: bool) -> Result<()> {
        let field = bitfield::field(BitKind::ModuleTxDisable, port)?;
        let _guard = self.cache.lock();
        let current = self.transport.read(self.address, field.register)?;
        let updated = field.encode(current, !disable);
        if updated != current {
            self.transport.write(self.address, field.register, updated)?;
        }
        debug!(
            "0x{:02x} port {} tx_disable={} (0x{:02x} -> 0x{:02x})",
            self.address, port, disable, current, updated
        );
        Ok(())
    }

    /// Every port, reading each shared register once
    pub fn ports(&self) -> Result<Vec<PortReading>> {
        let _guard = self.cache.lock();
        let mut raw = std::collections::HashMap::new();
        for register in [registers::SFP_49_50, registers::SFP_51_52, registers::QSFP_53_54] {
            raw.insert(register, self.transport.read(self.address, register)?);
        }

        let decode = |kind: BitKind, port: u8| {
            bitfield::lookup(kind, port).map(|f| f.decode(raw.get(&f.register).copied().unwrap_or(0)))
        };

        (port::FIRST..=port::LAST)
            .map(|p| {
                Ok(PortReading {
                    port: p,
                    present: decode(BitKind::ModulePresent, p).ok_or(CpldError::UnknownChannel {
                        kind: BitKind::ModulePresent.name().to_string(),
                        index: p,
                    })?,
                    rx_los: decode(BitKind::ModuleRxLos, p),
                    tx_fault: decode(BitKind::ModuleTxFault, p),
                    tx_disable: decode(BitKind::ModuleTxDisable, p),
                })
            })
            .collect()
    }

    /// CPLD firmware version, read live
    pub fn version(&self) -> Result<u8> {
        self.read_register(registers::VERSION)
    }

    /// Raw register read under the device lock
    pub fn read_register(&self, register: u8) -> Result<u8> {
        let _guard = self.cache.lock();
        self.transport.read(self.address, register)
    }

    /// Raw register write under the device lock. Writing a cached register
    /// invalidates the snapshot.
    pub fn write_register(&self, register: u8, value: u8) -> Result<()> {
        let mut cache = self.cache.lock();
        if cache.registers().contains(&register) {
            cache.invalidate();
        }
        self.transport.write(self.address, register, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{RetryPolicy, SimulatedBus};
    use crate::clock::ManualClock;
    use crate::constants::cache;
    use std::thread;

    const ADDR: u16 = 0x60;

    fn setup() -> (Arc<SimulatedBus>, Arc<ManualClock>, Arc<CpldDevice>) {
        let bus = Arc::new(SimulatedBus::as4630_54pe(ADDR));
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(BusTransport::new(
            bus.clone(),
            clock.clone(),
            RetryPolicy::default(),
        ));
        let device = Arc::new(CpldDevice::new(ADDR, transport, cache::STALENESS_WINDOW));
        (bus, clock, device)
    }

    #[test]
    fn test_fan_presence_from_status() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::FAN_STATUS, 0b0000_0010);

        assert!(device.fan_present(1).unwrap());
        assert!(!device.fan_present(2).unwrap());
        assert!(device.fan_present(3).unwrap());
        assert!(matches!(
            device.fan_present(4),
            Err(CpldError::UnknownChannel { index: 4, .. })
        ));
    }

    #[test]
    fn test_fan_direction() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::FAN_STATUS, 0b0010_0000);
        assert!(!device.fan_direction(1).unwrap());
        assert!(device.fan_direction(2).unwrap());
    }

    #[test]
    fn test_fan_speed_and_fault() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::FAN_SPEED[1], 0);

        assert_eq!(device.fan_speed_rpm(1).unwrap(), 60 * 114);
        assert!(!device.fan_fault(1).unwrap());
        assert_eq!(device.fan_speed_rpm(2).unwrap(), 0);
        assert!(device.fan_fault(2).unwrap());
        assert!(device.fan_speed_rpm(0).is_err());
    }

    #[test]
    fn test_duty_cycle_write_then_read() {
        let (bus, _clock, device) = setup();
        assert_eq!(device.duty_cycle_percentage().unwrap(), 50);

        device.set_duty_cycle(75).unwrap();
        assert_eq!(bus.register(ADDR, registers::FAN_PWM_1), Some(12));
        assert_eq!(bus.register(ADDR, registers::FAN_PWM_2), Some(12));
        // The write invalidated the snapshot, so the new value is visible at once
        assert_eq!(device.duty_cycle_percentage().unwrap(), 75);
    }

    #[test]
    fn test_duty_cycle_out_of_range_touches_nothing() {
        let (bus, _clock, device) = setup();
        assert!(matches!(device.set_duty_cycle(101), Err(CpldError::OutOfRange { .. })));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_cache_invalid_is_reported() {
        let (bus, _clock, device) = setup();
        bus.fail_register_always(ADDR, registers::FAN_SPEED[2]);

        assert!(matches!(
            device.fan_present(1),
            Err(CpldError::CacheInvalid { address: ADDR })
        ));
        assert!(!device.is_valid());

        bus.clear_failures();
        assert!(device.fan_present(1).unwrap());
        assert!(device.is_valid());
    }

    #[test]
    fn test_concurrent_refresh_reads_bus_once() {
        let (bus, _clock, device) = setup();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let device = device.clone();
                thread::spawn(move || device.fan_speed_rpm(1 + (i % 3) as u8).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bus.read_count(), registers::FAN_CACHE.len() as u64);
    }

    #[test]
    fn test_stale_snapshot_is_refreshed() {
        let (bus, clock, device) = setup();
        assert_eq!(device.fan_speed_rpm(1).unwrap(), 60 * 114);

        bus.set_register(ADDR, registers::FAN_SPEED[0], 100);
        assert_eq!(device.fan_speed_rpm(1).unwrap(), 60 * 114);

        clock.advance(Duration::from_millis(1501));
        assert_eq!(device.fan_speed_rpm(1).unwrap(), 100 * 114);
    }

    #[test]
    fn test_port_bits_read_live() {
        let (bus, _clock, device) = setup();
        assert!(!device.module_present(49).unwrap());

        // Port 49 inserted (bit 6 low), rx-los raised on port 50
        bus.set_register(ADDR, registers::SFP_49_50, 0x05);
        assert!(device.module_present(49).unwrap());
        assert!(!device.module_present(50).unwrap());
        assert!(device.rx_los(50).unwrap());
        assert!(!device.tx_fault(49).unwrap());

        bus.set_register(ADDR, registers::QSFP_53_54, 0x01);
        assert!(!device.module_present(53).unwrap());
        assert!(device.module_present(54).unwrap());
        assert!(device.rx_los(53).is_err());
    }

    #[test]
    fn test_tx_disable_read_modify_write() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::SFP_51_52, 0xCC);

        device.set_tx_disable(51, true).unwrap();
        assert_eq!(bus.register(ADDR, registers::SFP_51_52), Some(0x4C));
        assert!(!device.tx_disable(51).unwrap());
        assert!(device.tx_disable(52).unwrap());

        device.set_tx_disable(52, true).unwrap();
        device.set_tx_disable(51, false).unwrap();
        assert_eq!(bus.register(ADDR, registers::SFP_51_52), Some(0xC4));
    }

    #[test]
    fn test_tx_disable_clears_bit_on_disable() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::SFP_49_50, 0xC4);

        device.set_tx_disable(49, true).unwrap();
        assert_eq!(bus.register(ADDR, registers::SFP_49_50), Some(0x44));

        // Already disabled: no write
        let writes = bus.write_count();
        device.set_tx_disable(49, true).unwrap();
        assert_eq!(bus.write_count(), writes);

        device.set_tx_disable(49, false).unwrap();
        assert_eq!(bus.register(ADDR, registers::SFP_49_50), Some(0xC4));
    }

    #[test]
    fn test_tx_disable_failed_read_leaves_register() {
        let (bus, _clock, device) = setup();
        bus.fail_register(ADDR, registers::SFP_49_50, 10);

        assert!(device.set_tx_disable(49, true).unwrap_err().is_bus_error());
        assert_eq!(bus.register(ADDR, registers::SFP_49_50), Some(0x44));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_tx_disable_rejected_on_qsfp() {
        let (_bus, _clock, device) = setup();
        assert!(matches!(
            device.set_tx_disable(53, true),
            Err(CpldError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn test_snapshots() {
        let (bus, _clock, device) = setup();
        bus.set_register(ADDR, registers::FAN_STATUS, 0b0000_0100);
        bus.set_register(ADDR, registers::SFP_49_50, 0x04);

        let fans = device.fans().unwrap();
        assert_eq!(fans.len(), 3);
        assert_eq!(fans[0].rpm, 60 * 114);
        assert_eq!(fans[0].speed_percent, 52);
        assert!(!fans[2].present);
        assert_eq!(fans[2].speed_percent, 0);

        let ports = device.ports().unwrap();
        assert_eq!(ports.len(), 6);
        assert!(ports[0].present);
        assert!(!ports[1].present);
        assert_eq!(ports[4].rx_los, None);
    }

    #[test]
    fn test_version_and_raw_access() {
        let (bus, _clock, device) = setup();
        assert_eq!(device.version().unwrap(), 0x0B);

        device.write_register(0x30, 0xAA).unwrap();
        assert_eq!(bus.register(ADDR, 0x30), Some(0xAA));
        assert_eq!(device.read_register(0x30).unwrap(), 0xAA);
    }

    #[test]
    fn test_raw_write_to_cached_register_invalidates() {
        let (_bus, _clock, device) = setup();
        assert_eq!(device.duty_cycle_percentage().unwrap(), 50);
        device.write_register(registers::FAN_PWM_1, 16).unwrap();
        assert_eq!(device.duty_cycle_percentage().unwrap(), 100);
    }
}
