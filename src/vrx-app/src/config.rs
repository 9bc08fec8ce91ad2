// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Base directories to search for configuration, in priority order:
/// current directory, the platform config directory, then `/etc`. Both the
/// combined `vrx.toml` and each binary's own flat file live at the same
/// three tiers, so this is the one place that knows the tier order.
fn search_roots() -> Vec<PathBuf> {
    let mut roots = vec![PathBuf::new()];
    if let Some(config_dir) = dirs::config_dir() {
        roots.push(config_dir.join("vrx"));
    }
    roots.push(PathBuf::from("/etc/vrx"));
    roots
}

/// Extract and deserialize a named section from a TOML file.
///
/// Returns `Ok(Some(cfg))` when the section is present and parses cleanly,
/// `Ok(None)` when the section is absent, or `Err` on I/O / parse failure.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Re-serialize the section then parse as T so all serde defaults apply.
    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

/// Trait for loading configuration files with default paths.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Config filename (e.g., "server.toml" or "client.toml")
    fn config_filename() -> &'static str;

    /// Section key inside a combined `vrx.toml` file, e.g. `"scanner"`.
    /// Return `None` (the default) to disable combined-file support.
    fn combined_key() -> Option<&'static str> {
        None
    }

    /// Load config from a specific file path.
    ///
    /// If `combined_key()` is set and the file contains that section header,
    /// only that section is deserialized.  Otherwise the whole file is used,
    /// preserving full backward compatibility with per-binary config files.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if let Some(key) = Self::combined_key() {
            // Peek at the file: if it contains our section, use that section.
            if let Ok(Some(cfg)) = load_section_from_file::<Self>(path, key) {
                return Ok(cfg);
            }
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Search default locations and load the first config found.
    ///
    /// At each tier (CWD, XDG, `/etc`, in that order) this tries the combined
    /// `vrx.toml` file's section first, then the per-binary flat file (e.g.
    /// `scanner.toml`), before moving to the next tier. A combined file that
    /// exists but lacks our section falls through to the flat file at the
    /// same tier rather than aborting the search.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for root in search_roots() {
            if let Some(key) = Self::combined_key() {
                let combined_path = root.join("vrx.toml");
                if combined_path.exists() {
                    if let Some(cfg) = load_section_from_file::<Self>(&combined_path, key)? {
                        return Ok((cfg, Some(combined_path)));
                    }
                }
            }

            let flat_path = root.join(Self::config_filename());
            if flat_path.exists() {
                let cfg = Self::load_from_file(&flat_path)?;
                return Ok((cfg, Some(flat_path)));
            }
        }
        Ok((Self::default(), None))
    }
}

/// `[scanner]` section of `vrx.toml` (§6). Every field is optional via
/// `#[serde(default)]` so a missing or partially specified file never
/// aborts startup (§7 rule 3).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScannerConfigFile {
    #[serde(default)]
    pub bands: Vec<BandConfig>,
    #[serde(default)]
    pub dwell_ms: Option<u64>,
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default)]
    pub channel_bw_hz: Option<f64>,
    #[serde(default)]
    pub min_snr_db: Option<f64>,
    #[serde(default)]
    pub dc_guard_hz: Option<f64>,
    #[serde(default)]
    pub alert_persistence: Option<AlertPersistence>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BandConfig {
    pub name: String,
    pub channels: Vec<u64>,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct AlertPersistence {
    pub hits: usize,
    pub window: usize,
}

impl Default for ScannerConfigFile {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            dwell_ms: None,
            sample_rate: None,
            channel_bw_hz: None,
            min_snr_db: None,
            dc_guard_hz: None,
            alert_persistence: None,
        }
    }
}

impl ConfigFile for ScannerConfigFile {
    fn config_filename() -> &'static str {
        "scanner.toml"
    }

    fn combined_key() -> Option<&'static str> {
        Some("scanner")
    }
}

impl ScannerConfigFile {
    /// Materialize a [`vrx_core`]-agnostic [`vrx_scanner::ScannerConfig`]-shaped
    /// value by applying the §6 defaults over whatever was present on disk.
    /// Kept here (rather than in `vrx-scanner`) so the config crate has no
    /// dependency on the DSP/scanner crates.
    pub fn dwell_ms_or_default(&self) -> u64 {
        self.dwell_ms.unwrap_or(15)
    }

    pub fn sample_rate_or_default(&self) -> f64 {
        self.sample_rate.unwrap_or(8_000_000.0)
    }

    pub fn channel_bw_hz_or_default(&self) -> f64 {
        self.channel_bw_hz.unwrap_or(8_000_000.0)
    }

    pub fn min_snr_db_or_default(&self) -> f64 {
        self.min_snr_db.unwrap_or(6.0)
    }

    pub fn dc_guard_hz_or_default(&self) -> f64 {
        self.dc_guard_hz.unwrap_or(50_000.0)
    }

    pub fn alert_hits_or_default(&self) -> usize {
        self.alert_persistence.map(|p| p.hits).unwrap_or(3)
    }

    pub fn alert_window_or_default(&self) -> usize {
        self.alert_persistence.map(|p| p.window).unwrap_or(5)
    }

    /// Channel list, defaulting to Raceband when no bands are configured.
    pub fn channels_hz_or_default(&self) -> Vec<u64> {
        if self.bands.is_empty() {
            vrx_core::RACEBAND_CHANNELS_HZ.to_vec()
        } else {
            self.bands.iter().flat_map(|b| b.channels.clone()).collect()
        }
    }
}

/// `[demod]` section of `vrx.toml` (§6), defaults taken from the reference
/// hardware capture configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DemodConfigFile {
    #[serde(default)]
    pub search_radius_hz: Option<u64>,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub target_rms: Option<f32>,
    #[serde(default)]
    pub lna_gain: Option<u8>,
    #[serde(default)]
    pub vga_gain: Option<u8>,
    #[serde(default)]
    pub amp_enabled: Option<bool>,
}

impl Default for DemodConfigFile {
    fn default() -> Self {
        Self {
            search_radius_hz: None,
            width: None,
            height: None,
            fps: None,
            target_rms: None,
            lna_gain: None,
            vga_gain: None,
            amp_enabled: None,
        }
    }
}

impl ConfigFile for DemodConfigFile {
    fn config_filename() -> &'static str {
        "demod.toml"
    }

    fn combined_key() -> Option<&'static str> {
        Some("demod")
    }
}

impl DemodConfigFile {
    pub fn search_radius_hz_or_default(&self) -> u64 {
        self.search_radius_hz.unwrap_or(5_000_000)
    }

    pub fn width_or_default(&self) -> usize {
        self.width.unwrap_or(320)
    }

    pub fn height_or_default(&self) -> usize {
        self.height.unwrap_or(240)
    }

    pub fn fps_or_default(&self) -> u32 {
        self.fps.unwrap_or(15)
    }

    pub fn target_rms_or_default(&self) -> f32 {
        self.target_rms.unwrap_or(0.25)
    }

    pub fn lna_gain_or_default(&self) -> u8 {
        self.lna_gain.unwrap_or(28)
    }

    pub fn vga_gain_or_default(&self) -> u8 {
        self.vga_gain.unwrap_or(16)
    }

    pub fn amp_enabled_or_default(&self) -> bool {
        self.amp_enabled.unwrap_or(true)
    }
}

#[cfg(test)]
mod schema_tests {
    use super::*;

    #[test]
    fn scanner_config_file_defaults_to_raceband() {
        let cfg = ScannerConfigFile::default();
        assert_eq!(cfg.channels_hz_or_default(), vrx_core::RACEBAND_CHANNELS_HZ.to_vec());
        assert_eq!(cfg.dwell_ms_or_default(), 15);
        assert_eq!(cfg.alert_hits_or_default(), 3);
        assert_eq!(cfg.alert_window_or_default(), 5);
    }

    #[test]
    fn demod_config_file_defaults_match_reference_hardware() {
        let cfg = DemodConfigFile::default();
        assert_eq!(cfg.search_radius_hz_or_default(), 5_000_000);
        assert_eq!(cfg.width_or_default(), 320);
        assert_eq!(cfg.height_or_default(), 240);
        assert_eq!(cfg.fps_or_default(), 15);
        assert!((cfg.target_rms_or_default() - 0.25).abs() < 1e-6);
        assert_eq!(cfg.lna_gain_or_default(), 28);
        assert_eq!(cfg.vga_gain_or_default(), 16);
        assert!(cfg.amp_enabled_or_default());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let toml_str = "dwell_ms = 20\n";
        let cfg: ScannerConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.dwell_ms_or_default(), 20);
        assert_eq!(cfg.min_snr_db_or_default(), 6.0);
    }
}
