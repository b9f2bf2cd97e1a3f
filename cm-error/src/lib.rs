//! Unified error handling for cpldmon
//!
//! This crate provides the single error type shared by the core library and
//! the command line front end. It uses thiserror for the Display and Error
//! trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using CpldError
pub type Result<T> = std::result::Result<T, CpldError>;

/// Unified error type for all cpldmon operations
#[derive(thiserror::Error, Debug)]
pub enum CpldError {
    // ============================================================================
    // Bus Errors
    // ============================================================================
    #[error("Bus timeout at 0x{address:02x} reg 0x{register:02x} after {attempts} attempts")]
    BusTimeout {
        address: u16,
        register: u8,
        attempts: u32,
    },

    #[error("Bus NACK at 0x{address:02x} reg 0x{register:02x} after {attempts} attempts")]
    BusNack {
        address: u16,
        register: u8,
        attempts: u32,
    },

    #[error("Bus I/O error at 0x{address:02x} reg 0x{register:02x}: {reason}")]
    BusIo {
        address: u16,
        register: u8,
        reason: String,
    },

    #[error("Failed to open bus adapter {path}: {source}")]
    AdapterOpen {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Register Cache Errors
    // ============================================================================
    #[error("Register cache of device 0x{address:02x} is invalid")]
    CacheInvalid {
        address: u16,
    },

    #[error("Register 0x{register:02x} is not tracked by device 0x{address:02x}")]
    UntrackedRegister {
        address: u16,
        register: u8,
    },

    // ============================================================================
    // Registry Errors
    // ============================================================================
    #[error("No device registered at address 0x{0:02x}")]
    UnknownAddress(u16),

    #[error("A device is already registered at address 0x{0:02x}")]
    AddressInUse(u16),

    // ============================================================================
    // Attribute and Validation Errors
    // ============================================================================
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute {0} is read-only")]
    ReadOnly(String),

    #[error("Attribute {0} is write-only")]
    WriteOnly(String),

    #[error("Invalid input for {attribute}: {reason}")]
    InvalidInput {
        attribute: String,
        reason: String,
    },

    #[error("Value {value} out of range for {field} (must be {min}-{max})")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("No {kind} channel with index {index}")]
    UnknownChannel {
        kind: String,
        index: u8,
    },

    // ============================================================================
    // Thermal Errors
    // ============================================================================
    #[error("Only {found} of {required} temperature sensors are available")]
    SensorIncomplete {
        found: usize,
        required: usize,
    },

    #[error("Failed to read temperature of sensor {bus}-{address:04x}: {reason}")]
    SensorRead {
        bus: u32,
        address: u16,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl CpldError {
    /// Create an invalid configuration error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error for a named attribute
    pub fn invalid_input(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Create an out of range error
    pub fn out_of_range(field: impl Into<String>, value: i64, min: i64, max: i64) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        }
    }

    /// True for failures reported by the bus after the retry budget ran out
    pub fn is_bus_error(&self) -> bool {
        matches!(
            self,
            Self::BusTimeout { .. } | Self::BusNack { .. } | Self::BusIo { .. }
        )
    }
}

// Allow converting from String to CpldError
impl From<String> for CpldError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to CpldError
impl From<&str> for CpldError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
