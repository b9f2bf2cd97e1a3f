//! cpldmon Core Library
//!
//! Fan, transceiver port and thermal monitoring for the Accton AS4630-54PE
//! system CPLD over SMBus.
//!
//! # Features
//!
//! - **Bus Access**: Byte-data register reads and writes with bounded retry
//! - **Register Cache**: All-or-nothing snapshots of the fan registers with a staleness window
//! - **Bit Tables**: One static table of every status bit, its register and polarity
//! - **Thermal**: Sum of the three LM75 sensors, falling back to sysfs when a sample is stale
//! - **Registry**: Address-keyed clients with raw register access
//!
//! # Module Structure
//!
//! - `bus/` - Adapter trait, retrying transport, i2c-dev and simulated adapters
//! - `thermal/` - LM75 samples, sysfs fallback, aggregation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cm_core::{BusTransport, Platform, RetryPolicy, SimulatedBus, SystemClock};
//! use cm_core::{SysfsTemperatureReader, TemperatureAggregator};
//!
//! let bus = Arc::new(SimulatedBus::as4630_54pe(0x60));
//! let clock = Arc::new(SystemClock);
//! let transport = Arc::new(BusTransport::new(bus, clock.clone(), RetryPolicy::default()));
//! let thermal = TemperatureAggregator::new(Arc::new(SysfsTemperatureReader::default()), clock);
//! let platform = Platform::new(transport, thermal, cm_core::constants::cache::STALENESS_WINDOW);
//!
//! platform.attach(0x60).unwrap();
//! println!("{}", platform.show(0x60, "fan_speed_rpm_1").unwrap());
//! ```

// Grouped modules
pub mod bus;
pub mod thermal;

// Standalone modules
pub mod attributes;
pub mod bitfield;
pub mod cache;
pub mod clock;
pub mod constants;
pub mod cpld;
pub mod error;
pub mod platform;
pub mod registry;

// Re-export error types
pub use error::{CpldError, Result};

// Re-export bus types
pub use bus::{BusFault, BusTransport, I2cDevAdapter, RetryPolicy, SimulatedBus, SmbusAdapter};

// Re-export clock types
pub use clock::{Clock, ManualClock, SystemClock};

// Re-export device and registry types
pub use cache::RegisterCache;
pub use cpld::{CpldDevice, FanReading, PortReading};
pub use registry::ClientRegistry;

// Re-export bit layout and transforms
pub use bitfield::{
    duty_cycle_from_reg, duty_cycle_to_reg, fan_fault_from_reg, rpm_from_reg, speed_percent,
    BitField, BitKind, Polarity,
};

// Re-export attribute surface
pub use attributes::{Access, AttrValue, Attribute};

// Re-export thermal types
pub use thermal::{
    raw_to_millicelsius, sum_readings, Lm75Sensor, PublishedTemperature,
    SysfsTemperatureReader, TemperatureAggregator, TemperatureReading,
};

// Re-export platform wiring
pub use platform::{Platform, Snapshot};
