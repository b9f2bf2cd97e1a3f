//! Register snapshot cache
//!
//! A [`RegisterCache`] holds the last values read from a fixed, ordered set
//! of registers. A refresh either reads every register successfully and
//! publishes the new snapshot, or marks the whole snapshot invalid. Partial
//! refreshes are never published.
//!
//! The cache has no lock of its own. It lives inside the owning device's
//! mutex, so refresh and the reads that follow happen under one acquisition.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::bus::BusTransport;
use crate::error::{CpldError, Result};

#[derive(Debug, Clone)]
pub struct RegisterCache {
    registers: Vec<u8>,
    values: Vec<u8>,
    valid: bool,
    last_updated: Option<Instant>,
    staleness: Duration,
}

impl RegisterCache {
    /// Track `registers`, refreshed in the given order
    pub fn new(registers: &[u8], staleness: Duration) -> Self {
        Self {
            registers: registers.to_vec(),
            values: vec![0; registers.len()],
            valid: false,
            last_updated: None,
            staleness,
        }
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn last_updated(&self) -> Option<Instant> {
        self.last_updated
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Whether the next refresh at `now` will touch the bus
    pub fn is_due(&self, now: Instant) -> bool {
        if !self.valid {
            return true;
        }
        match self.last_updated {
            Some(at) => now.saturating_duration_since(at) > self.staleness,
            None => true,
        }
    }

    /// Re-read every tracked register if the snapshot is stale or invalid.
    ///
    /// Returns the validity after the call. The first failed read abandons
    /// the pass and leaves the previous values in place, flagged invalid.
    pub fn refresh(&mut self, transport: &BusTransport, address: u16) -> bool {
        let now = transport.clock().now();
        if !self.is_due(now) {
            return true;
        }

        debug!("Refreshing {} registers of 0x{:02x}", self.registers.len(), address);
        self.valid = false;

        let mut scratch = self.values.clone();
        for (slot, register) in scratch.iter_mut().zip(self.registers.iter()) {
            match transport.read(address, *register) {
                Ok(value) => *slot = value,
                Err(e) => {
                    debug!("Refresh of 0x{:02x} aborted at reg 0x{:02x}: {}", address, register, e);
                    return false;
                }
            }
        }

        self.values = scratch;
        self.last_updated = Some(transport.clock().now());
        self.valid = true;
        true
    }

    /// Cached byte for `register`, valid or not. `None` if untracked.
    ///
    /// Callers must refresh and check [`is_valid`](Self::is_valid) first;
    /// a byte from an invalid snapshot is not a reading.
    pub fn get(&self, register: u8) -> Option<u8> {
        self.registers
            .iter()
            .position(|r| *r == register)
            .map(|i| self.values[i])
    }

    /// Cached byte for `register`, only from a valid snapshot
    pub fn value(&self, address: u16, register: u8) -> Result<u8> {
        if !self.valid {
            return Err(CpldError::CacheInvalid { address });
        }
        self.get(register)
            .ok_or(CpldError::UntrackedRegister { address, register })
    }

    /// Force the next refresh to hit the bus
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}
