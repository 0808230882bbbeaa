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

//! Pad-triggered playback sessions.
//!
//! This module provides:
//! - Sessions wrapping one backend handle each
//! - Cut (one voice per slot) and overlap (free layering) policies
//! - Reaping of sessions when the backend reports the end of playback

mod manager;
mod session;

use std::path::PathBuf;

pub use manager::SessionManager;
pub use session::{Session, SessionId};

use crate::audio::BackendError;

/// Errors reported to the caller of a trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Media not found: {}", .0.display())]
    MediaNotFound(PathBuf),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Converts the 0 to 100 master volume control into a gain.
pub fn master_volume_from_percent(percent: f64) -> f32 {
    (percent.clamp(0.0, 100.0) / 100.0) as f32
}

/// Computes the gain a pad plays at. A pad volume of zero or less means full volume.
pub fn effective_volume(pad_volume: f32, master_volume: f32) -> f32 {
    let pad_volume = if pad_volume <= 0.0 { 1.0 } else { pad_volume };
    (pad_volume * master_volume).clamp(0.0, 1.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_effective_volume() {
        assert_eq!(effective_volume(0.5, master_volume_from_percent(50.0)), 0.25);
        assert_eq!(effective_volume(0.0, 0.8), 0.8);
        assert_eq!(effective_volume(-1.0, 1.0), 1.0);
        assert_eq!(effective_volume(1.0, 2.0), 1.0);
        assert_eq!(effective_volume(0.9, 0.0), 0.0);
    }

    #[test]
    fn test_master_volume_from_percent() {
        assert_eq!(master_volume_from_percent(100.0), 1.0);
        assert_eq!(master_volume_from_percent(150.0), 1.0);
        assert_eq!(master_volume_from_percent(-5.0), 0.0);
    }
}
