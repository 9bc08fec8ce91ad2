// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigFile, DemodConfigFile, ScannerConfigFile};
pub use logging::init_logging;
