//! Constants and configuration values for cpldmon
//!
//! Centralizes the register map, bus timing and thermal whitelist of the
//! AS4630-54PE system CPLD. Other modules refer to these by name rather than
//! repeating the literals.

use std::time::Duration;

/// Bus access timing
pub mod bus {
    use super::Duration;

    /// Number of attempts for a single register read or write
    pub const RETRY_ATTEMPTS: u32 = 10;

    /// Delay between two attempts
    pub const RETRY_DELAY: Duration = Duration::from_millis(60);

    /// Largest valid 7-bit bus address
    pub const MAX_ADDRESS: u16 = 0x7F;

    /// Default bus number of the CPLD on AS4630-54PE
    pub const DEFAULT_BUS: u32 = 3;

    /// Default address of the system CPLD
    pub const DEFAULT_CPLD_ADDRESS: u16 = 0x60;
}

/// Register cache behaviour
pub mod cache {
    use super::Duration;

    /// Maximum age of the fan register snapshot before a refresh is forced
    pub const STALENESS_WINDOW: Duration = Duration::from_millis(1500);
}

/// CPLD register map
pub mod registers {
    /// CPLD firmware version
    pub const VERSION: u8 = 0x01;

    /// SFP status/control for ports 49 and 50
    pub const SFP_49_50: u8 = 0x05;

    /// SFP status/control for ports 51 and 52
    pub const SFP_51_52: u8 = 0x06;

    /// QSFP presence for ports 53 and 54
    pub const QSFP_53_54: u8 = 0x21;

    /// Fan presence (bits 0-2) and direction (bits 4-6)
    pub const FAN_STATUS: u8 = 0x87;

    /// Fan PWM, first controller
    pub const FAN_PWM_1: u8 = 0x1A;

    /// Fan PWM, second controller
    pub const FAN_PWM_2: u8 = 0x1B;

    /// Front fan tachometers, one per fan
    pub const FAN_SPEED: [u8; 3] = [0x88, 0x89, 0x8A];

    /// Fan fault latch
    pub const FAN_FAULT: u8 = 0x20;

    /// Registers tracked by the fan cache, in refresh order
    pub const FAN_CACHE: [u8; 7] = [
        FAN_STATUS,
        FAN_PWM_1,
        FAN_PWM_2,
        FAN_SPEED[0],
        FAN_SPEED[1],
        FAN_SPEED[2],
        FAN_FAULT,
    ];
}

/// Fan channel constants
pub mod fan {
    /// Number of fan channels, indexed 1..=COUNT
    pub const COUNT: u8 = 3;

    /// Duty cycle register field
    pub const DUTY_CYCLE_MASK: u8 = 0x1F;

    /// Maximum duty cycle percentage accepted on write
    pub const MAX_DUTY_CYCLE: u8 = 100;

    /// RPM per tachometer count (read value x 3.79 x 60 / 2)
    pub const RPM_PER_COUNT: u32 = 114;

    /// Full speed of the chassis fans, used for the speed percentage
    pub const MAX_RPM: u32 = 13000;
}

/// Transceiver port constants
pub mod port {
    /// First front-panel port handled by the CPLD
    pub const FIRST: u8 = 49;

    /// Last SFP port (with rx-los, tx-fault and tx-disable lines)
    pub const LAST_SFP: u8 = 52;

    /// Last QSFP port (presence only)
    pub const LAST: u8 = 54;
}

/// Thermal aggregation constants
pub mod thermal {
    /// Number of sensors that must be found for a valid sum
    pub const REQUIRED_SENSORS: usize = 3;

    /// Driver name of the aggregated sensors
    pub const SENSOR_DRIVER: &str = "lm75";

    /// Addresses of the aggregated sensors
    pub const SENSOR_ADDRESSES: [u16; 3] = [0x48, 0x4A, 0x4B];

    /// Returned by the aggregator when fewer than REQUIRED_SENSORS were read.
    /// Consumers must treat it as "temperature unavailable", never as a reading.
    pub const UNAVAILABLE: i32 = i32::MAX;

    /// Number of hwmon directories probed when resolving temp1_input
    pub const MAX_HWMON_INDEX: usize = 10;

    /// Default LM75 sample interval
    pub const DEFAULT_SAMPLE_TIME: std::time::Duration = std::time::Duration::from_millis(1500);

    /// Default LM75 resolution in bits
    pub const DEFAULT_RESOLUTION: u8 = 9;
}

/// System paths
pub mod paths {
    /// Default root of sysfs
    pub const SYSFS_ROOT: &str = "/sys";

    /// Device node prefix of i2c-dev adapters
    pub const I2C_DEV_PREFIX: &str = "/dev/i2c-";

    /// Default configuration file
    pub const CONFIG_FILE: &str = "/etc/cpldmon/config.json";
}
