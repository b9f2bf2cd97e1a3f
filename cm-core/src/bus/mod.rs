//! SMBus register access
//!
//! [`SmbusAdapter`] is a single-attempt byte-data read/write against one bus.
//! [`BusTransport`] wraps an adapter with the bounded retry every driver
//! access goes through: up to `attempts` tries, sleeping `delay` after each
//! failed one. Only single-byte transactions exist at this layer.

mod linux;
pub mod sim;

pub use linux::I2cDevAdapter;
pub use sim::SimulatedBus;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::constants::bus;
use crate::error::{CpldError, Result};

/// Why a single bus transaction failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusFault {
    /// The addressed device did not acknowledge
    Nack,
    /// The adapter gave up waiting for the bus
    Timeout,
    /// Any other adapter error
    Io(String),
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusFault::Nack => write!(f, "no acknowledge"),
            BusFault::Timeout => write!(f, "timeout"),
            BusFault::Io(reason) => write!(f, "{}", reason),
        }
    }
}

/// One attempt at a byte-data transaction
#[cfg_attr(test, mockall::automock)]
pub trait SmbusAdapter: Send + Sync {
    /// Read one byte from `register` of the device at `address`
    fn read_byte_data(&self, address: u16, register: u8) -> std::result::Result<u8, BusFault>;

    /// Write one byte to `register` of the device at `address`
    fn write_byte_data(
        &self,
        address: u16,
        register: u8,
        value: u8,
    ) -> std::result::Result<(), BusFault>;
}

/// Retry budget for one register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: bus::RETRY_ATTEMPTS,
            delay: bus::RETRY_DELAY,
        }
    }
}

/// Retrying register access shared by every device on one bus
pub struct BusTransport {
    adapter: Arc<dyn SmbusAdapter>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl BusTransport {
    pub fn new(adapter: Arc<dyn SmbusAdapter>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            adapter,
            clock,
            policy,
        }
    }

    /// Time source shared with the caches built on this transport
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Read one register, retrying on failure
    pub fn read(&self, address: u16, register: u8) -> Result<u8> {
        self.with_retry(address, register, || {
            self.adapter.read_byte_data(address, register)
        })
    }

    /// Write one register, retrying on failure
    pub fn write(&self, address: u16, register: u8, value: u8) -> Result<()> {
        self.with_retry(address, register, || {
            self.adapter.write_byte_data(address, register, value)
        })
    }

    fn with_retry<T>(
        &self,
        address: u16,
        register: u8,
        mut op: impl FnMut() -> std::result::Result<T, BusFault>,
    ) -> Result<T> {
        let attempts = self.policy.attempts.max(1);
        let mut last = BusFault::Nack;

        for attempt in 1..=attempts {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            "0x{:02x} reg 0x{:02x} succeeded on attempt {}",
                            address, register, attempt
                        );
                    }
                    return Ok(value);
                }
                Err(fault) => {
                    debug!(
                        "0x{:02x} reg 0x{:02x} attempt {}/{} failed: {}",
                        address, register, attempt, attempts, fault
                    );
                    last = fault;
                    self.clock.sleep(self.policy.delay);
                }
            }
        }

        warn!(
            "0x{:02x} reg 0x{:02x} failed after {} attempts: {}",
            address, register, attempts, last
        );
        Err(match last {
            BusFault::Nack => CpldError::BusNack { address, register, attempts },
            BusFault::Timeout => CpldError::BusTimeout { address, register, attempts },
            BusFault::Io(reason) => CpldError::BusIo { address, register, reason },
        })
    }
}
