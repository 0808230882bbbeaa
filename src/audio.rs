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

//! Playback backends.
//!
//! A backend opens a local file and hands back a [`Handle`] that can be started, stopped,
//! re-leveled and released. Each handle reports the end of its playback exactly once through
//! the [`EndCallback`] it was opened with, from whatever thread the backend runs it on.

use std::{fmt, path::Path, sync::Arc, time::Duration};

pub mod cpal;
pub mod decode;
pub mod mock;

/// How long a mock handle obtained by name plays before it finishes.
const MOCK_PLAY_TIME: Duration = Duration::from_secs(1);

/// How a playback ended on its own. User-initiated stops are not reported.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEnd {
    /// The media played through to the end.
    Finished,
    /// Decoding or the output stream failed.
    Failed(String),
}

/// Invoked once when a started handle reaches the end of its media or fails.
pub type EndCallback = Box<dyn FnOnce(PlaybackEnd) + Send + 'static>;

/// Errors raised by backends and their handles.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to decode {0}")]
    Decode(String),

    #[error("No audio output device available")]
    NoOutputDevice,

    #[error("Output stream error: {0}")]
    Stream(String),

    #[error("Handle has already been disposed")]
    Disposed,

    #[error("Unknown backend: {0}")]
    Unknown(String),
}

/// A native playback engine.
pub trait Backend: fmt::Display + Send + Sync {
    /// Opens the given file for playback. The handle does not make a sound until
    /// [`Handle::play`] is called, and `on_end` is never invoked before that.
    fn open(&self, path: &Path, on_end: EndCallback) -> Result<Box<dyn Handle>, BackendError>;
}

/// A controllable playback of one file.
pub trait Handle: Send {
    /// Begins playback. Blocking work (decoding, device setup) happens off the calling thread.
    fn play(&mut self) -> Result<(), BackendError>;

    /// Halts playback. Must be safe to call on a stopped or failed handle.
    fn stop(&mut self) -> Result<(), BackendError>;

    /// Sets the gain, 0.0 to 1.0.
    fn set_volume(&mut self, volume: f32);

    /// Releases native resources. Must be safe to call more than once.
    fn dispose(&mut self) -> Result<(), BackendError>;
}

/// Gets the backend with the given name.
pub fn get_backend(name: &str) -> Result<Arc<dyn Backend>, BackendError> {
    match name.trim().to_lowercase().as_str() {
        "cpal" | "default" => Ok(Arc::new(cpal::Backend::new()?)),
        name if name.starts_with("mock") => Ok(Arc::new(mock::Backend::with_auto_finish(
            name,
            MOCK_PLAY_TIME,
        ))),
        other => Err(BackendError::Unknown(other.to_string())),
    }
}
