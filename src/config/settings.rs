// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

const DEFAULT_DEBOUNCE: &str = "200ms";
const DEFAULT_SUPPRESSION: &str = "150ms";
const DEFAULT_MASTER_VOLUME: f64 = 100.0;
const DEFAULT_BACKEND: &str = "cpal";

/// Prefix of environment variables that override settings, e.g. `PADBOARD_DEBOUNCE=300ms`.
pub const ENV_PREFIX: &str = "PADBOARD";

/// The settings as they appear in YAML and the environment.
#[derive(Deserialize)]
struct RawSettings {
    debounce: String,
    suppression: String,
    master_volume: f64,
    backend: String,
}

/// Runtime settings of the board process, as opposed to the board itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How long the board file must be quiet before a change is reloaded.
    debounce: Duration,
    /// How long changes are ignored after the board saves its own file.
    suppression: Duration,
    /// Initial master volume, 0 to 100.
    master_volume: f64,
    /// Name of the audio backend.
    backend: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debounce: Duration::from_millis(200),
            suppression: Duration::from_millis(150),
            master_volume: DEFAULT_MASTER_VOLUME,
            backend: DEFAULT_BACKEND.to_string(),
        }
    }
}

impl Settings {
    /// Layers the built-in defaults, the optional YAML file and `PADBOARD_*` environment
    /// variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder()
            .set_default("debounce", DEFAULT_DEBOUNCE)?
            .set_default("suppression", DEFAULT_SUPPRESSION)?
            .set_default("master_volume", DEFAULT_MASTER_VOLUME)?
            .set_default("backend", DEFAULT_BACKEND)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let raw: RawSettings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(Settings {
            debounce: parse_duration(&raw.debounce)?,
            suppression: parse_duration(&raw.suppression)?,
            master_volume: raw.master_volume.clamp(0.0, 100.0),
            backend: raw.backend,
        })
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn suppression(&self) -> Duration {
        self.suppression
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Into::into)
        .map_err(|e| ConfigError::Duration(format!("{}: {}", value, e)))
}
