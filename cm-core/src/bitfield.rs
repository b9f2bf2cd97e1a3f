//! Bit layout of the CPLD status and control registers
//!
//! Every single-bit attribute is described by a [`BitField`]: the register
//! holding it, the mask of its bit and whether the line is active low. The
//! table keyed by `(BitKind, channel)` is built once and is the only place
//! the layout is written down.
//!
//! Port pairs share a register, so the bit position depends on which half
//! of the pair a port is:
//!
//! | register | port | rx-los | tx-fault | present | tx-disable |
//! |----------|------|--------|----------|---------|------------|
//! | 0x05     | 49   | 4      | 5        | 6 (inv) | 7          |
//! | 0x05     | 50   | 0      | 1        | 2 (inv) | 3          |
//! | 0x06     | 51   | 4      | 5        | 6 (inv) | 7          |
//! | 0x06     | 52   | 0      | 1        | 2 (inv) | 3          |
//! | 0x21     | 53   |        |          | 0 (inv) |            |
//! | 0x21     | 54   |        |          | 4 (inv) |            |
//!
//! tx-disable reads active high but is written active low, see
//! [`crate::cpld::CpldDevice::set_tx_disable`].
//!
//! Fans share register 0x87: presence at bit `fan - 1` (inverted) and
//! direction at bit `4 + fan - 1`.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;

use crate::constants::{fan, registers};
use crate::error::{CpldError, Result};

/// Electrical polarity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Polarity {
    /// Bit set means true
    Direct,
    /// Bit clear means true
    Inverted,
}

/// One bit of one register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub register: u8,
    pub mask: u8,
    pub polarity: Polarity,
}

impl BitField {
    pub const fn new(register: u8, bit: u8, polarity: Polarity) -> Self {
        Self {
            register,
            mask: 1 << bit,
            polarity,
        }
    }

    /// Logical value of this bit in `raw`
    pub fn decode(&self, raw: u8) -> bool {
        let set = raw & self.mask != 0;
        match self.polarity {
            Polarity::Direct => set,
            Polarity::Inverted => !set,
        }
    }

    /// `current` with this bit changed to represent `value`
    pub fn encode(&self, current: u8, value: bool) -> u8 {
        let set = match self.polarity {
            Polarity::Direct => value,
            Polarity::Inverted => !value,
        };
        if set {
            current | self.mask
        } else {
            current & !self.mask
        }
    }
}

/// Single-bit attribute families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BitKind {
    ModulePresent,
    ModuleRxLos,
    ModuleTxFault,
    ModuleTxDisable,
    FanPresent,
    FanDirection,
}

impl BitKind {
    pub fn name(&self) -> &'static str {
        match self {
            BitKind::ModulePresent => "module_present",
            BitKind::ModuleRxLos => "module_rx_los",
            BitKind::ModuleTxFault => "module_tx_fault",
            BitKind::ModuleTxDisable => "module_tx_disable",
            BitKind::FanPresent => "fan_present",
            BitKind::FanDirection => "fan_direction",
        }
    }
}

lazy_static! {
    static ref BIT_TABLE: HashMap<(BitKind, u8), BitField> = build_table();
}

fn build_table() -> HashMap<(BitKind, u8), BitField> {
    use BitKind::*;
    use Polarity::*;

    let mut table = HashMap::new();

    for (register, first) in [(registers::SFP_49_50, 49u8), (registers::SFP_51_52, 51u8)] {
        for (port, base) in [(first, 4u8), (first + 1, 0u8)] {
            table.insert((ModuleRxLos, port), BitField::new(register, base, Direct));
            table.insert((ModuleTxFault, port), BitField::new(register, base + 1, Direct));
            table.insert((ModulePresent, port), BitField::new(register, base + 2, Inverted));
            table.insert((ModuleTxDisable, port), BitField::new(register, base + 3, Direct));
        }
    }

    table.insert((ModulePresent, 53), BitField::new(registers::QSFP_53_54, 0, Inverted));
    table.insert((ModulePresent, 54), BitField::new(registers::QSFP_53_54, 4, Inverted));

    for id in 1..=fan::COUNT {
        let bit = id - 1;
        table.insert((FanPresent, id), BitField::new(registers::FAN_STATUS, bit, Inverted));
        table.insert((FanDirection, id), BitField::new(registers::FAN_STATUS, 4 + bit, Direct));
    }

    table
}

/// Layout of `kind` on `channel`, if the hardware has that line
pub fn lookup(kind: BitKind, channel: u8) -> Option<BitField> {
    BIT_TABLE.get(&(kind, channel)).copied()
}

/// Like [`lookup`], but a missing line is an error
pub fn field(kind: BitKind, channel: u8) -> Result<BitField> {
    lookup(kind, channel).ok_or_else(|| CpldError::UnknownChannel {
        kind: kind.name().to_string(),
        index: channel,
    })
}

/// Duty cycle percentage from a PWM register value, in 6.25% steps
pub fn duty_cycle_from_reg(raw: u8) -> u32 {
    u32::from(raw & fan::DUTY_CYCLE_MASK) * 625 / 100
}

/// PWM register value for a duty cycle percentage in 0..=100.
/// Off-grid percentages round down to the previous step.
pub fn duty_cycle_to_reg(percent: i64) -> Result<u8> {
    let max = i64::from(fan::MAX_DUTY_CYCLE);
    if !(0..=max).contains(&percent) {
        return Err(CpldError::out_of_range("fan_duty_cycle_percentage", percent, 0, max));
    }
    Ok((percent * 100 / 625) as u8)
}

/// Fan speed in RPM from a tachometer register value
pub fn rpm_from_reg(raw: u8) -> u32 {
    u32::from(raw) * fan::RPM_PER_COUNT
}

/// A fan is faulty when its tachometer reads zero
pub fn fan_fault_from_reg(raw: u8) -> bool {
    rpm_from_reg(raw) == 0
}

/// Speed as a percentage of full speed, capped at 100
pub fn speed_percent(rpm: u32) -> u32 {
    if rpm >= fan::MAX_RPM {
        100
    } else {
        rpm * 100 / fan::MAX_RPM
    }
}
