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

//! Polling loop: samples sensors, decodes fans, warns on faults and on
//! temperatures crossing their thresholds

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use cm_core::constants::thermal;
use cm_core::{sum_readings, CpldError, FanReading, Platform, TemperatureReading};

use crate::config::SensorConfig;

/// Longest single sleep, so a stop request is noticed quickly
const STOP_POLL: Duration = Duration::from_millis(100);

/// Result of one poll
#[derive(Debug, Clone, Serialize)]
pub struct Tick {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fans: Option<Vec<FanReading>>,
    pub temperatures: Vec<TemperatureReading>,
    pub sys_temp: i32,
    pub warnings: Vec<String>,
}

pub struct Monitor<'a> {
    platform: &'a Platform,
    address: u16,
    thresholds: HashMap<(u32, u16), i32>,
    over_threshold: HashSet<(u32, u16)>,
    faulty_fans: HashSet<u8>,
}

impl<'a> Monitor<'a> {
    pub fn new(platform: &'a Platform, address: u16, sensors: &[SensorConfig]) -> Self {
        Self {
            platform,
            address,
            thresholds: sensors
                .iter()
                .map(|s| ((s.bus, s.address), s.high_warning_mc))
                .collect(),
            over_threshold: HashSet::new(),
            faulty_fans: HashSet::new(),
        }
    }

    /// Poll once. Warnings are raised on transitions only.
    pub fn tick(&mut self) -> Tick {
        let mut warnings = Vec::new();
        self.platform.thermal().sample_all();

        let fans = match self.platform.registry().lookup(self.address).and_then(|d| d.fans()) {
            Ok(fans) => {
                self.check_fans(&fans, &mut warnings);
                Some(fans)
            }
            Err(e) => {
                let msg = format!("Fan status of 0x{:02x} unavailable: {}", self.address, e);
                warn!("{}", msg);
                warnings.push(msg);
                None
            }
        };

        let temperatures = self.platform.thermal().readings();
        self.check_temperatures(&temperatures, &mut warnings);

        let sys_temp = match sum_readings(&temperatures) {
            Ok(sum) => sum,
            Err(CpldError::SensorIncomplete { found, required }) => {
                let msg = format!("System temperature unavailable: {} of {} sensors", found, required);
                warn!("{}", msg);
                warnings.push(msg);
                thermal::UNAVAILABLE
            }
            Err(e) => {
                let msg = format!("System temperature unavailable: {}", e);
                warn!("{}", msg);
                warnings.push(msg);
                thermal::UNAVAILABLE
            }
        };

        Tick {
            fans,
            temperatures,
            sys_temp,
            warnings,
        }
    }

    fn check_fans(&mut self, fans: &[FanReading], warnings: &mut Vec<String>) {
        for fan in fans {
            let faulty = fan.present && fan.fault;
            if faulty && self.faulty_fans.insert(fan.id) {
                let msg = format!("Fan {} stopped", fan.id);
                warn!("{}", msg);
                warnings.push(msg);
            } else if !faulty && self.faulty_fans.remove(&fan.id) {
                info!("Fan {} recovered ({} rpm)", fan.id, fan.rpm);
            }
        }
    }

    fn check_temperatures(&mut self, readings: &[TemperatureReading], warnings: &mut Vec<String>) {
        for r in readings {
            let key = (r.bus, r.address);
            let limit = match self.thresholds.get(&key) {
                Some(limit) => *limit,
                None => continue,
            };
            if r.millicelsius > limit {
                if self.over_threshold.insert(key) {
                    let msg = format!(
                        "{} at {:.1} C is above its {:.1} C warning threshold",
                        r.name,
                        f64::from(r.millicelsius) / 1000.0,
                        f64::from(limit) / 1000.0
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            } else if self.over_threshold.remove(&key) {
                info!("{} back below its warning threshold", r.name);
            }
        }
    }

    /// Poll every `interval` until `stop` is set, handing each tick to
    /// `on_tick`
    pub fn run(&mut self, interval: Duration, stop: &AtomicBool, mut on_tick: impl FnMut(&Tick)) {
        info!("Monitoring CPLD 0x{:02x} every {:?}", self.address, interval);
        while !stop.load(Ordering::SeqCst) {
            let tick = self.tick();
            on_tick(&tick);

            let deadline = Instant::now() + interval;
            while !stop.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep((deadline - now).min(STOP_POLL));
            }
        }
        debug!("Monitor stopped");
    }
}
