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

//! Subcommand handlers. Output goes to the given writer so the handlers can
//! be exercised without a terminal.

use std::io::Write;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use tracing::info;

use cm_core::attributes;
use cm_core::constants::thermal;
use cm_core::Snapshot;

use crate::app::App;
use crate::cli::Commands;
use crate::monitor::{Monitor, Tick};

pub fn execute(app: &App, command: &Commands, out: &mut dyn Write, stop: &AtomicBool) -> Result<()> {
    let address = app.address();
    let platform = &app.platform;

    match command {
        Commands::Show { attribute } => {
            if attribute == "sys_temp" {
                platform.thermal().sample_all();
            }
            let value = platform
                .show(address, attribute)
                .with_context(|| format!("reading {}", attribute))?;
            writeln!(out, "{}", value)?;
        }
        Commands::Set { attribute, value } => {
            platform
                .store(address, attribute, value)
                .with_context(|| format!("writing {:?} to {}", value, attribute))?;
            info!("Stored {:?} into {}", value, attribute);
        }
        Commands::List => {
            for attr in attributes::all() {
                let regs: Vec<String> = attributes::registers_of(attr)
                    .iter()
                    .map(|r| format!("0x{:02x}", r))
                    .collect();
                writeln!(out, "{:<28} {}  {}", attr.name, attr.access, regs.join(","))?;
            }
        }
        Commands::Dump { json } => {
            platform.thermal().sample_all();
            let snap = platform
                .snapshot(address)
                .with_context(|| format!("reading CPLD 0x{:02x}", address))?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&snap)?)?;
            } else {
                write_snapshot(out, &snap)?;
            }
        }
        Commands::Read { register } => {
            let value = platform
                .registry()
                .read_register(address, *register)
                .with_context(|| format!("reading register 0x{:02x}", register))?;
            writeln!(out, "0x{:02x}", value)?;
        }
        Commands::Write { register, value } => {
            platform
                .registry()
                .write_register(address, *register, *value)
                .with_context(|| format!("writing 0x{:02x} to register 0x{:02x}", value, register))?;
            info!("Wrote 0x{:02x} to register 0x{:02x}", value, register);
        }
        Commands::Temp => {
            platform.thermal().sample_all();
            let readings = platform.thermal().readings();
            for r in &readings {
                writeln!(
                    out,
                    "{:<18} {}-{:04x}  {:>8.3} C  {}",
                    r.name,
                    r.bus,
                    r.address,
                    f64::from(r.millicelsius) / 1000.0,
                    if r.cached { "sample" } else { "sysfs" }
                )?;
            }
            write_sys_temp(out, platform.thermal().aggregate())?;
        }
        Commands::Monitor { interval_ms, json } => {
            let interval = interval_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| app.config.poll_interval());
            let mut monitor = Monitor::new(platform, address, &app.config.thermal.sensors);
            let mut failed: Option<std::io::Error> = None;
            monitor.run(interval, stop, |tick| {
                if failed.is_none() {
                    if let Err(e) = write_tick(out, tick, *json) {
                        failed = Some(e);
                    }
                }
            });
            if let Some(e) = failed {
                return Err(e).context("writing monitor output");
            }
        }
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn opt_flag(b: Option<bool>) -> &'static str {
    match b {
        Some(true) => "1",
        Some(false) => "0",
        None => "-",
    }
}

fn write_sys_temp(out: &mut dyn Write, sys_temp: i32) -> std::io::Result<()> {
    if sys_temp == thermal::UNAVAILABLE {
        writeln!(out, "sys_temp: unavailable")
    } else {
        writeln!(out, "sys_temp: {} mC", sys_temp)
    }
}

fn write_snapshot(out: &mut dyn Write, snap: &Snapshot) -> std::io::Result<()> {
    writeln!(out, "CPLD 0x{:02x}  version {}", snap.address, snap.version)?;
    writeln!(out, "duty cycle: {}%", snap.duty_cycle_percentage)?;
    writeln!(out)?;
    writeln!(out, "FAN  PRESENT  DIR  RPM     SPEED  FAULT")?;
    for f in &snap.fans {
        writeln!(
            out,
            "{:<4} {:<8} {:<4} {:<7} {:>4}%  {}",
            f.id,
            yes_no(f.present),
            u8::from(f.direction),
            f.rpm,
            f.speed_percent,
            yes_no(f.fault)
        )?;
    }
    writeln!(out)?;
    writeln!(out, "PORT PRESENT  RX_LOS TX_FAULT TX_DISABLE")?;
    for p in &snap.ports {
        writeln!(
            out,
            "{:<4} {:<8} {:<6} {:<8} {}",
            p.port,
            yes_no(p.present),
            opt_flag(p.rx_los),
            opt_flag(p.tx_fault),
            opt_flag(p.tx_disable)
        )?;
    }
    writeln!(out)?;
    for t in &snap.temperatures {
        writeln!(out, "{:<18} {:>8.3} C", t.name, f64::from(t.millicelsius) / 1000.0)?;
    }
    write_sys_temp(out, snap.sys_temp)
}

fn write_tick(out: &mut dyn Write, tick: &Tick, json: bool) -> std::io::Result<()> {
    if json {
        let line = serde_json::to_string(tick)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        return writeln!(out, "{}", line);
    }
    let fans = match &tick.fans {
        Some(fans) => fans
            .iter()
            .map(|f| format!("fan{}={}", f.id, if f.present { f.rpm.to_string() } else { "-".into() }))
            .collect::<Vec<_>>()
            .join(" "),
        None => "fans=?".to_string(),
    };
    let temp = if tick.sys_temp == thermal::UNAVAILABLE {
        "sys_temp=?".to_string()
    } else {
        format!("sys_temp={}", tick.sys_temp)
    };
    writeln!(out, "{} {}", fans, temp)?;
    for w in &tick.warnings {
        writeln!(out, "  warning: {}", w)?;
    }
    out.flush()
}
