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

use std::env;

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stderr,
}

/// Filter directive: `RUST_LOG` wins over the configured level
pub fn filter_directive(configured: &str) -> String {
    match env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => configured.to_string(),
    }
}

/// Journald when started by systemd with its stream attached, else stderr
pub fn preferred_target() -> LogTarget {
    if env::var_os("JOURNAL_STREAM").is_some() {
        LogTarget::Journald
    } else {
        LogTarget::Stderr
    }
}

fn init_stderr(directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directive))
        .try_init();
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(level: &str) -> LogTarget {
    let directive = filter_directive(level);

    let target = match preferred_target() {
        LogTarget::Journald => match tracing_journald::layer() {
            Ok(journald) => {
                use tracing_subscriber::prelude::*;
                let _ = tracing_subscriber::registry()
                    .with(journald)
                    .with(EnvFilter::new(&directive))
                    .try_init();
                LogTarget::Journald
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
                init_stderr(&directive);
                LogTarget::Stderr
            }
        },
        LogTarget::Stderr => {
            init_stderr(&directive);
            LogTarget::Stderr
        }
    };

    debug!("Logging to {:?} with filter {:?}", target, directive);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_rust_log_overrides_level() {
        env::set_var("RUST_LOG", "cm_core=trace");
        assert_eq!(filter_directive("info"), "cm_core=trace");
        env::remove_var("RUST_LOG");
        assert_eq!(filter_directive("warn"), "warn");
    }

    #[test]
    #[serial]
    fn test_target_follows_journal_stream() {
        env::remove_var("JOURNAL_STREAM");
        assert_eq!(preferred_target(), LogTarget::Stderr);
        env::set_var("JOURNAL_STREAM", "8:12345");
        assert_eq!(preferred_target(), LogTarget::Journald);
        env::remove_var("JOURNAL_STREAM");
    }

    #[test]
    #[serial]
    fn test_init_twice_is_harmless() {
        env::remove_var("JOURNAL_STREAM");
        assert_eq!(init_logging("debug"), LogTarget::Stderr);
        assert_eq!(init_logging("info"), LogTarget::Stderr);
    }
}
