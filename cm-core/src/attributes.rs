//! Named attribute table
//!
//! Every attribute the CPLD client exposes, with its access mode and how it
//! maps onto the device. The table is built once and looked up by name.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::Serialize;

use crate::constants::{fan, port, registers};
use crate::cpld::CpldDevice;
use crate::error::{CpldError, Result};
use crate::thermal::TemperatureAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(&self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    pub fn writable(&self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::ReadOnly => write!(f, "ro"),
            Access::WriteOnly => write!(f, "wo"),
            Access::ReadWrite => write!(f, "rw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrId {
    ModulePresent(u8),
    ModuleRxLos(u8),
    ModuleTxFault(u8),
    ModuleTxDisable(u8),
    FanPresent(u8),
    FanFault(u8),
    FanDirection(u8),
    FanSpeedRpm(u8),
    FanDutyCycle,
    SysTemp,
    Version,
    Access,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    pub name: String,
    pub access: Access,
    #[serde(skip)]
    pub id: AttrId,
}

/// Value shown for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            AttrValue::Int(v) => write!(f, "{}", v),
        }
    }
}

lazy_static! {
    static ref ATTRIBUTES: Vec<Attribute> = build_table();
    static ref BY_NAME: HashMap<String, usize> = ATTRIBUTES
        .iter()
        .enumerate()
        .map(|(i, attr)| (attr.name.clone(), i))
        .collect();
}

fn build_table() -> Vec<Attribute> {
    let mut table = Vec::new();
    let mut add = |name: String, access: Access, id: AttrId| {
        table.push(Attribute { name, access, id });
    };

    for p in port::FIRST..=port::LAST {
        add(format!("module_present_{}", p), Access::ReadOnly, AttrId::ModulePresent(p));
    }
    for p in port::FIRST..=port::LAST_SFP {
        add(format!("module_rx_los_{}", p), Access::ReadOnly, AttrId::ModuleRxLos(p));
        add(format!("module_tx_fault_{}", p), Access::ReadOnly, AttrId::ModuleTxFault(p));
        add(format!("module_tx_disable_{}", p), Access::ReadWrite, AttrId::ModuleTxDisable(p));
    }
    for id in 1..=fan::COUNT {
        add(format!("fan_present_{}", id), Access::ReadOnly, AttrId::FanPresent(id));
        add(format!("fan_fault_{}", id), Access::ReadOnly, AttrId::FanFault(id));
        add(format!("fan_speed_rpm_{}", id), Access::ReadOnly, AttrId::FanSpeedRpm(id));
        add(format!("fan_direction_{}", id), Access::ReadOnly, AttrId::FanDirection(id));
        add(format!("fan{}_input", id), Access::ReadOnly, AttrId::FanSpeedRpm(id));
    }
    add("fan_duty_cycle_percentage".into(), Access::ReadWrite, AttrId::FanDutyCycle);
    add("sys_temp".into(), Access::ReadOnly, AttrId::SysTemp);
    add("version".into(), Access::ReadOnly, AttrId::Version);
    add("access".into(), Access::WriteOnly, AttrId::Access);

    table
}

/// Every attribute, in a stable order
pub fn all() -> &'static [Attribute] {
    &ATTRIBUTES
}

pub fn find(name: &str) -> Result<&'static Attribute> {
    BY_NAME
        .get(name)
        .map(|i| &ATTRIBUTES[*i])
        .ok_or_else(|| CpldError::UnknownAttribute(name.to_string()))
}

impl Attribute {
    pub fn show(&self, device: &CpldDevice, temps: &TemperatureAggregator) -> Result<AttrValue> {
        if !self.access.readable() {
            return Err(CpldError::WriteOnly(self.name.clone()));
        }
        let value = match self.id {
            AttrId::ModulePresent(p) => AttrValue::Bool(device.module_present(p)?),
            AttrId::ModuleRxLos(p) => AttrValue::Bool(device.rx_los(p)?),
            AttrId::ModuleTxFault(p) => AttrValue::Bool(device.tx_fault(p)?),
            AttrId::ModuleTxDisable(p) => AttrValue::Bool(device.tx_disable(p)?),
            AttrId::FanPresent(id) => AttrValue::Bool(device.fan_present(id)?),
            AttrId::FanFault(id) => AttrValue::Bool(device.fan_fault(id)?),
            AttrId::FanDirection(id) => AttrValue::Bool(device.fan_direction(id)?),
            AttrId::FanSpeedRpm(id) => AttrValue::Int(i64::from(device.fan_speed_rpm(id)?)),
            AttrId::FanDutyCycle => AttrValue::Int(i64::from(device.duty_cycle_percentage()?)),
            AttrId::SysTemp => AttrValue::Int(i64::from(temps.aggregate())),
            AttrId::Version => AttrValue::Int(i64::from(device.version()?)),
            AttrId::Access => return Err(CpldError::WriteOnly(self.name.clone())),
        };
        Ok(value)
    }

    pub fn store(&self, device: &CpldDevice, input: &str) -> Result<()> {
        if !self.access.writable() {
            return Err(CpldError::ReadOnly(self.name.clone()));
        }
        match self.id {
            AttrId::ModuleTxDisable(p) => {
                let value = parse_int(&self.name, input)?;
                device.set_tx_disable(p, value != 0)
            }
            AttrId::FanDutyCycle => {
                let value = parse_int(&self.name, input)?;
                device.set_duty_cycle(value)
            }
            AttrId::Access => {
                let (register, value) = parse_access(input)?;
                device.write_register(register, value)
            }
            _ => Err(CpldError::ReadOnly(self.name.clone())),
        }
    }
}

/// Decimal integer, surrounding whitespace ignored
pub fn parse_int(attribute: &str, input: &str) -> Result<i64> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|e| CpldError::invalid_input(attribute, format!("{:?}: {}", input.trim(), e)))
}

/// `"0x<reg> 0x<value>"`, both at most 0xFF
pub fn parse_access(input: &str) -> Result<(u8, u8)> {
    let fields: Vec<&str> = input.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(CpldError::invalid_input(
            "access",
            format!("expected \"0x<reg> 0x<value>\", got {:?}", input.trim()),
        ));
    }

    let hex = |field: &str, token: &str| -> Result<u8> {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .ok_or_else(|| CpldError::invalid_input("access", format!("{} {:?} lacks 0x prefix", field, token)))?;
        let value = u32::from_str_radix(digits, 16)
            .map_err(|e| CpldError::invalid_input("access", format!("{} {:?}: {}", field, token, e)))?;
        u8::try_from(value).map_err(|_| CpldError::out_of_range(field, i64::from(value), 0, 0xFF))
    };

    let register = hex("register", fields[0])?;
    let value = hex("value", fields[1])?;
    Ok((register, value))
}

/// Registers the attribute surface reads, for diagnostics
pub fn registers_of(attr: &Attribute) -> Vec<u8> {
    match attr.id {
        AttrId::ModulePresent(p) if p > port::LAST_SFP => vec![registers::QSFP_53_54],
        AttrId::ModulePresent(p)
        | AttrId::ModuleRxLos(p)
        | AttrId::ModuleTxFault(p)
        | AttrId::ModuleTxDisable(p) => {
            if p <= 50 {
                vec![registers::SFP_49_50]
            } else {
                vec![registers::SFP_51_52]
            }
        }
        AttrId::FanPresent(_) | AttrId::FanDirection(_) => vec![registers::FAN_STATUS],
        AttrId::FanFault(id) | AttrId::FanSpeedRpm(id) => registers::FAN_SPEED
            .get(usize::from(id.saturating_sub(1)))
            .copied()
            .into_iter()
            .collect(),
        AttrId::FanDutyCycle => vec![registers::FAN_PWM_1, registers::FAN_PWM_2],
        AttrId::Version => vec![registers::VERSION],
        AttrId::SysTemp | AttrId::Access => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusTransport, RetryPolicy, SimulatedBus};
    use crate::clock::ManualClock;
    use crate::constants::cache;
    use crate::thermal::MockPublishedTemperature;
    use std::sync::Arc;

    fn setup() -> (Arc<SimulatedBus>, CpldDevice, TemperatureAggregator) {
        let bus = Arc::new(SimulatedBus::as4630_54pe(0x60));
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(BusTransport::new(bus.clone(), clock.clone(), RetryPolicy::default()));
        let device = CpldDevice::new(0x60, transport, cache::STALENESS_WINDOW);
        let mut fallback = MockPublishedTemperature::new();
        fallback.expect_read_published().returning(|_, _| Ok(30_000));
        let temps = TemperatureAggregator::new(Arc::new(fallback), clock);
        (bus, device, temps)
    }

    #[test]
    fn test_table_contents() {
        // 6 presence, 4 x 3 SFP lines, 3 x 5 fan, duty, sys_temp, version, access
        assert_eq!(all().len(), 6 + 12 + 15 + 4);
        assert_eq!(find("module_tx_disable_52").unwrap().access, Access::ReadWrite);
        assert_eq!(find("access").unwrap().access, Access::WriteOnly);
        assert_eq!(find("fan2_input").unwrap().id, AttrId::FanSpeedRpm(2));
        assert!(matches!(find("module_rx_los_53"), Err(CpldError::UnknownAttribute(_))));
        assert!(find("fan_present_4").is_err());
    }

    #[test]
    fn test_show_values() {
        let (_bus, device, temps) = setup();
        let show = |name: &str| find(name).unwrap().show(&device, &temps).unwrap().to_string();

        assert_eq!(show("fan_present_1"), "1");
        assert_eq!(show("fan_speed_rpm_2"), (61 * 114).to_string());
        assert_eq!(show("fan3_input"), (62 * 114).to_string());
        assert_eq!(show("fan_duty_cycle_percentage"), "50");
        assert_eq!(show("module_present_49"), "0");
        assert_eq!(show("version"), "11");
        // No sensors known
        assert_eq!(show("sys_temp"), i32::MAX.to_string());
    }

    #[test]
    fn test_store_duty_cycle() {
        let (bus, device, temps) = setup();
        let attr = find("fan_duty_cycle_percentage").unwrap();

        attr.store(&device, "25\n").unwrap();
        assert_eq!(bus.register(0x60, registers::FAN_PWM_2), Some(4));
        assert_eq!(attr.show(&device, &temps).unwrap(), AttrValue::Int(25));

        assert!(matches!(attr.store(&device, "150"), Err(CpldError::OutOfRange { .. })));
        assert!(matches!(attr.store(&device, "fast"), Err(CpldError::InvalidInput { .. })));
    }

    #[test]
    fn test_store_tx_disable() {
        let (bus, device, temps) = setup();
        let attr = find("module_tx_disable_50").unwrap();

        attr.store(&device, "0").unwrap();
        assert_eq!(bus.register(0x60, registers::SFP_49_50), Some(0x4C));
        assert_eq!(attr.show(&device, &temps).unwrap(), AttrValue::Bool(true));
        attr.store(&device, "1").unwrap();
        assert_eq!(bus.register(0x60, registers::SFP_49_50), Some(0x44));
        assert_eq!(attr.show(&device, &temps).unwrap(), AttrValue::Bool(false));
    }

    #[test]
    fn test_access_modes_enforced() {
        let (_bus, device, temps) = setup();
        assert!(matches!(
            find("fan_present_1").unwrap().store(&device, "1"),
            Err(CpldError::ReadOnly(_))
        ));
        assert!(matches!(
            find("access").unwrap().show(&device, &temps),
            Err(CpldError::WriteOnly(_))
        ));
    }

    #[test]
    fn test_access_attribute() {
        let (bus, device, _temps) = setup();
        find("access").unwrap().store(&device, "0x30 0x5a").unwrap();
        assert_eq!(bus.register(0x60, 0x30), Some(0x5A));
    }

    #[test]
    fn test_parse_access() {
        assert_eq!(parse_access("0x1A 0xFF").unwrap(), (0x1A, 0xFF));
        assert_eq!(parse_access("  0X05\t0x80\n").unwrap(), (0x05, 0x80));
        assert!(matches!(parse_access("0x100 0x01"), Err(CpldError::OutOfRange { value: 256, .. })));
        assert!(matches!(parse_access("0x01 0x1FF"), Err(CpldError::OutOfRange { .. })));
        assert!(matches!(parse_access("0x01"), Err(CpldError::InvalidInput { .. })));
        assert!(matches!(parse_access("1A FF"), Err(CpldError::InvalidInput { .. })));
        assert!(matches!(parse_access("0xzz 0x01"), Err(CpldError::InvalidInput { .. })));
    }

    #[test]
    fn test_bool_display() {
        assert_eq!(AttrValue::Bool(true).to_string(), "1");
        assert_eq!(AttrValue::Bool(false).to_string(), "0");
        assert_eq!(serde_json::to_string(&AttrValue::Int(-5)).unwrap(), "-5");
    }

    #[test]
    fn test_registers_of() {
        assert_eq!(registers_of(find("module_present_54").unwrap()), vec![0x21]);
        assert_eq!(registers_of(find("module_rx_los_51").unwrap()), vec![0x06]);
        assert_eq!(registers_of(find("fan_fault_3").unwrap()), vec![0x8A]);
        assert!(registers_of(find("sys_temp").unwrap()).is_empty());
    }
}
