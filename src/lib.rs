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

//! cpldmon - monitor and control for the AS4630-54PE system CPLD
//!
//! The binary wires configuration, logging and the command line onto the
//! register, fan, port and thermal model in `cm-core`.

pub mod app;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod logger;
pub mod monitor;

#[cfg(test)]
pub mod test_utils;
