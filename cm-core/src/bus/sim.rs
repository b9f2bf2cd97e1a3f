//! In-process simulated bus
//!
//! Holds a 256-byte register file per device address. Failures can be
//! injected per register, and every attempted transaction is counted so
//! callers can check whether bus traffic happened.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{BusFault, SmbusAdapter};
use crate::constants::registers;

#[derive(Default)]
struct SimState {
    devices: HashMap<u16, [u8; 256]>,
    // (address, register) -> remaining failing attempts
    failures: HashMap<(u16, u8), u32>,
    fault: Option<BusFault>,
    reads: u64,
    writes: u64,
}

impl SimState {
    fn check_failure(&mut self, address: u16, register: u8) -> Result<(), BusFault> {
        if let Some(remaining) = self.failures.get_mut(&(address, register)) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(self.fault.clone().unwrap_or(BusFault::Nack));
            }
        }
        Ok(())
    }
}

/// Simulated SMBus segment
#[derive(Default)]
pub struct SimulatedBus {
    state: Mutex<SimState>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus carrying an AS4630-54PE CPLD at `cpld_address` with three fans
    /// present and spinning, and every SFP port empty.
    pub fn as4630_54pe(cpld_address: u16) -> Self {
        let bus = Self::new();
        bus.add_device(cpld_address);
        bus.set_register(cpld_address, registers::VERSION, 0x0B);
        // Presence bits clear, direction bits clear
        bus.set_register(cpld_address, registers::FAN_STATUS, 0x00);
        bus.set_register(cpld_address, registers::FAN_PWM_1, 0x08);
        bus.set_register(cpld_address, registers::FAN_PWM_2, 0x08);
        for (i, reg) in registers::FAN_SPEED.iter().enumerate() {
            bus.set_register(cpld_address, *reg, 60 + i as u8);
        }
        // Presence is active low: all ports empty
        bus.set_register(cpld_address, registers::SFP_49_50, 0x44);
        bus.set_register(cpld_address, registers::SFP_51_52, 0x44);
        bus.set_register(cpld_address, registers::QSFP_53_54, 0x11);
        bus
    }

    /// Make `address` respond, with every register reading zero
    pub fn add_device(&self, address: u16) {
        self.state.lock().devices.entry(address).or_insert([0; 256]);
    }

    /// Set a register value directly, without counting a transaction
    pub fn set_register(&self, address: u16, register: u8, value: u8) {
        let mut state = self.state.lock();
        let regs = state.devices.entry(address).or_insert([0; 256]);
        regs[register as usize] = value;
    }

    /// Peek at a register value without counting a transaction
    pub fn register(&self, address: u16, register: u8) -> Option<u8> {
        self.state
            .lock()
            .devices
            .get(&address)
            .map(|regs| regs[register as usize])
    }

    /// Fail the next `attempts` transactions touching `register`
    pub fn fail_register(&self, address: u16, register: u8, attempts: u32) {
        self.state.lock().failures.insert((address, register), attempts);
    }

    /// Fail every transaction touching `register` until cleared
    pub fn fail_register_always(&self, address: u16, register: u8) {
        self.fail_register(address, register, u32::MAX);
    }

    /// Fault reported by injected failures (NACK by default)
    pub fn set_fault(&self, fault: BusFault) {
        self.state.lock().fault = Some(fault);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Attempted read transactions so far
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    /// Attempted write transactions so far
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }
}

impl SmbusAdapter for SimulatedBus {
    fn read_byte_data(&self, address: u16, register: u8) -> Result<u8, BusFault> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.check_failure(address, register)?;
        state
            .devices
            .get(&address)
            .map(|regs| regs[register as usize])
            .ok_or(BusFault::Nack)
    }

    fn write_byte_data(&self, address: u16, register: u8, value: u8) -> Result<(), BusFault> {
        let mut state = self.state.lock();
        state.writes += 1;
        state.check_failure(address, register)?;
        let regs = state.devices.get_mut(&address).ok_or(BusFault::Nack)?;
        regs[register as usize] = value;
        Ok(())
    }
}
