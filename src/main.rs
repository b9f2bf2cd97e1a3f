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

use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use cm_core::clock::SystemClock;
use cpldmon::app::App;
use cpldmon::cli::Cli;
use cpldmon::config::{config_path, Config};
use cpldmon::handlers;
use cpldmon::logger;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // PHASE 1: configuration, then command line overrides
    let path = cli.config.clone().unwrap_or_else(config_path);
    let mut config = if cli.config.is_some() {
        Config::from_file(&path)
    } else {
        Config::load(&path)
    }
    .with_context(|| format!("loading configuration from {}", path.display()))?;

    if let Some(address) = cli.address {
        config.cpld_address = address;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate().context("invalid configuration")?;

    // PHASE 2: logging
    logger::init_logging(&config.log_level);
    info!("cpldmon {} starting", env!("CARGO_PKG_VERSION"));

    // PHASE 3: bus and platform
    if !cli.simulate && unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; /dev/i2c-{} may not be accessible", config.i2c_bus);
    }
    let app = if cli.simulate {
        App::simulated(config, Arc::new(SystemClock))
    } else {
        App::open(config)
    };
    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!("Could not set up the platform: {}", e);
            return Err(e).context("opening the CPLD");
        }
    };

    // PHASE 4: signals stop the monitor loop
    if let Err(e) = ctrlc::set_handler(|| {
        info!("SIGNAL: Received SIGINT/SIGTERM - stopping");
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let stdout = stdout();
    let mut out = stdout.lock();
    handlers::execute(&app, &cli.command, &mut out, &SHUTDOWN)?;
    out.flush()?;
    Ok(())
}
