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
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audio::{BackendError, Handle};
use crate::config::PadMode;

/// Global session ID counter.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one playback session for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocates a fresh id.
    pub fn next() -> SessionId {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One in-flight playback of a pad, owning exactly one backend handle.
pub struct Session {
    id: SessionId,
    /// The grid index of the pad that started this session.
    slot: usize,
    /// The pad's mode when the session was created.
    mode: PadMode,
    started_at: Instant,
    /// None once disposed.
    handle: Option<Box<dyn Handle>>,
    stopped: bool,
}

impl Session {
    /// Takes ownership of a freshly opened handle.
    pub fn new(id: SessionId, handle: Box<dyn Handle>, slot: usize, mode: PadMode) -> Session {
        Session {
            id,
            slot,
            mode,
            started_at: Instant::now(),
            handle: Some(handle),
            stopped: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn mode(&self) -> PadMode {
        self.mode
    }

    /// How long ago the session was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns true once the handle has been released.
    pub fn is_disposed(&self) -> bool {
        self.handle.is_none()
    }

    /// Begins playback at the given gain.
    pub fn start(&mut self, volume: f32) -> Result<(), BackendError> {
        let handle = self.handle.as_mut().ok_or(BackendError::Disposed)?;
        handle.set_volume(volume);
        handle.play()
    }

    /// Halts playback. Stopping twice, or stopping a disposed session, does nothing.
    pub fn stop(&mut self) -> Result<(), BackendError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        match self.handle.as_mut() {
            Some(handle) => handle.stop(),
            None => Ok(()),
        }
    }

    /// Releases the backend handle. The handle is dropped even if the backend reports an error.
    pub fn dispose(&mut self) -> Result<(), BackendError> {
        match self.handle.take() {
            Some(mut handle) => handle.dispose(),
            None => Ok(()),
        }
    }

    /// Stops and disposes, logging rather than returning failures.
    pub fn teardown(&mut self) {
        if let Err(e) = self.stop() {
            warn!(session = %self.id, slot = self.slot, err = %e, "Error stopping session");
        }
        if let Err(e) = self.dispose() {
            warn!(session = %self.id, slot = self.slot, err = %e, "Error disposing session");
        }
        debug!(
            session = %self.id,
            slot = self.slot,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Session torn down"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!(session = %self.id, err = %e, "Error disposing dropped session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("mode", &self.mode)
            .field("stopped", &self.stopped)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::audio::{mock, Backend as _};

    fn make_session(backend: &mock::Backend, slot: usize) -> Session {
        let handle = backend
            .open(Path::new("/tmp/pad.wav"), Box::new(|_| {}))
            .expect("open");
        Session::new(SessionId::next(), handle, slot, PadMode::Cut)
    }

    #[test]
    fn test_session_ids_are_unique() {
        let backend = mock::Backend::new("mock");
        let first = make_session(&backend, 0);
        let second = make_session(&backend, 0);
        assert_ne!(first.id(), second.id());
        assert!(first.id() < second.id());
    }

    #[test]
    fn test_start_sets_volume() {
        let backend = mock::Backend::new("mock");
        let mut session = make_session(&backend, 3);
        session.start(0.25).expect("start");

        let probe = backend.last_probe().expect("probe");
        assert!(probe.is_playing());
        assert_eq!(probe.volume(), 0.25);
        assert_eq!(session.slot(), 3);
        assert_eq!(session.mode(), PadMode::Cut);
    }

    #[test]
    fn test_elapsed_counts_from_creation() {
        let backend = mock::Backend::new("mock");
        let session = make_session(&backend, 0);
        std::thread::sleep(Duration::from_millis(20));
        assert!(session.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stop_and_dispose_are_idempotent() {
        let backend = mock::Backend::new("mock");
        let mut session = make_session(&backend, 0);
        session.start(1.0).expect("start");

        session.stop().expect("stop");
        session.stop().expect("second stop");
        session.dispose().expect("dispose");
        session.dispose().expect("second dispose");
        session.stop().expect("stop after dispose");

        let probe = backend.last_probe().expect("probe");
        assert_eq!(probe.stop_calls(), 1);
        assert_eq!(probe.dispose_calls(), 1);
        assert!(session.is_disposed());
        assert!(matches!(session.start(1.0), Err(BackendError::Disposed)));
    }

    #[test]
    fn test_teardown_disposes_after_failed_stop() {
        let backend = mock::Backend::new("mock");
        backend.fail_stops(true);
        let mut session = make_session(&backend, 0);
        session.start(1.0).expect("start");

        session.teardown();

        let probe = backend.last_probe().expect("probe");
        assert_eq!(probe.stop_calls(), 1);
        assert!(probe.is_disposed());
        assert!(session.is_disposed());
    }

    #[test]
    fn test_drop_disposes_handle() {
        let backend = mock::Backend::new("mock");
        {
            let mut session = make_session(&backend, 0);
            session.start(1.0).expect("start");
        }
        let probe = backend.last_probe().expect("probe");
        assert!(probe.is_disposed());
        assert_eq!(probe.dispose_calls(), 1);
    }
}
