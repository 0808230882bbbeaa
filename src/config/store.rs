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

//! Loading and saving the board file.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{BoardConfig, ConfigError};

/// The name of the board file.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Returns the board file beside the running executable, or in the current directory when the
/// executable's location is unknown.
pub fn resolve_config_path() -> PathBuf {
    let dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_default();
    dir.join(CONFIG_FILE_NAME)
}

/// Loads the board file. This never fails: a missing file is replaced by the default board,
/// which is written out, and a broken file yields the default board without touching the file.
pub fn load(path: &Path) -> BoardConfig {
    match read(path) {
        Ok(config) => {
            info!(path = ?path, pads = config.pads().len(), "Loaded board config");
            config
        }
        Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            let config = BoardConfig::default();
            match save(path, &config) {
                Ok(()) => info!(path = ?path, "Wrote default board config"),
                Err(e) => warn!(path = ?path, err = %e, "Unable to write default board config"),
            }
            config
        }
        Err(e) => {
            warn!(path = ?path, err = %e, "Unable to load board config, using defaults");
            BoardConfig::default()
        }
    }
}

/// Reads and parses the board file.
pub fn read(path: &Path) -> Result<BoardConfig, ConfigError> {
    parse(&fs::read_to_string(path)?)
}

/// Parses a board document, which must be a JSON object. Fields that are absent take their
/// defaults.
pub fn parse(json: &str) -> Result<BoardConfig, ConfigError> {
    match serde_json::from_str::<Value>(json)? {
        value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
        Value::Null => Err(ConfigError::Invalid("document is null".to_string())),
        _ => Err(ConfigError::Invalid("document is not an object".to_string())),
    }
}

/// Writes the board file atomically: the new content goes to a temporary file in the same
/// directory, which then replaces the destination. A failed save leaves the old file intact.
pub fn save(path: &Path, config: &BoardConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path)?;

    debug!(path = ?path, "Saved board config");
    Ok(())
}
