/*
 * This file is part of cpldmon.
 *
 * Copyright (C) 2025 cpldmon contributors
 *
 * cpldmon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * cpldmon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with cpldmon. If not, see <https://www.gnu.org/licenses/>.
 */

//! Command Line Interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cpldmon")]
#[command(version)]
#[command(about = "Fan, port and thermal monitor for the AS4630-54PE system CPLD")]
#[command(long_about = "Fan, port and thermal monitor for the AS4630-54PE system CPLD

Reads fan presence, direction, speed and fault, SFP/QSFP port status and
the LM75 system temperature over SMBus, and sets the fan duty cycle and
transmit-disable lines.

EXAMPLES:
    cpldmon list                                  List every attribute
    cpldmon show fan_speed_rpm_1                  Read one attribute
    cpldmon set fan_duty_cycle_percentage 75      Set both fan controllers
    cpldmon set module_tx_disable_49 1            Disable the port 49 laser
    cpldmon read 0x87                             Raw register read
    cpldmon dump --json                           Full snapshot as JSON
    cpldmon --simulate monitor                    Poll a simulated switch

ENVIRONMENT VARIABLES:
    RUST_LOG=debug         Override the configured log level
    CPLDMON_CONFIG=path    Configuration file location

FILES:
    /etc/cpldmon/config.json      Bus, address, retry and sensor settings")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: $CPLDMON_CONFIG or /etc/cpldmon/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run against an in-process simulated switch instead of /dev/i2c-N
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Log level or filter directive, overriding the configuration
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// CPLD address, overriding the configuration
    #[arg(long, global = true, value_parser = parse_address)]
    pub address: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the value of one attribute
    Show {
        /// Attribute name, e.g. fan_present_1
        attribute: String,
    },

    /// Store a value into a writable attribute
    Set {
        attribute: String,
        value: String,
    },

    /// List every attribute with its access mode and registers
    List,

    /// Print fans, ports and temperatures
    Dump {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Read one raw CPLD register
    Read {
        #[arg(value_parser = parse_byte)]
        register: u8,
    },

    /// Write one raw CPLD register
    Write {
        #[arg(value_parser = parse_byte)]
        register: u8,
        #[arg(value_parser = parse_byte)]
        value: u8,
    },

    /// Print each temperature sensor and the system temperature
    Temp,

    /// Poll until interrupted, warning on fan faults and hot sensors
    Monitor {
        /// Poll interval in milliseconds, overriding the configuration
        #[arg(long)]
        interval_ms: Option<u64>,

        /// One JSON object per poll
        #[arg(long)]
        json: bool,
    },
}

fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

/// Byte in hex (`0x1a`) or decimal
pub fn parse_byte(s: &str) -> Result<u8, String> {
    let v = parse_number(s)?;
    u8::try_from(v).map_err(|_| format!("{} does not fit in a byte", s))
}

/// 7-bit bus address in hex or decimal
pub fn parse_address(s: &str) -> Result<u16, String> {
    let v = parse_number(s)?;
    if v > u32::from(cm_core::constants::bus::MAX_ADDRESS) {
        return Err(format!("{} is not a 7-bit address", s));
    }
    Ok(v as u16)
}
