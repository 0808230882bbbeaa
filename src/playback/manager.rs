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

//! Session manager that applies the cut/overlap policy and reaps finished sessions.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::session::{Session, SessionId};
use super::{effective_volume, TriggerError};
use crate::audio::{Backend, EndCallback, PlaybackEnd};
use crate::config::{Pad, PadMode};

/// Live sessions. Every access goes through the manager's single lock, and the lock is never
/// held across a backend call.
#[derive(Default)]
struct Registry {
    /// Free-running sessions, any number per slot.
    overlap: HashMap<SessionId, Session>,
    /// At most one session per slot.
    exclusive: HashMap<usize, Session>,
    /// Sessions that are starting and not yet registered.
    pending: HashSet<SessionId>,
    /// Pending sessions whose end arrived before they were registered.
    ended: HashSet<SessionId>,
}

impl Registry {
    /// Clears the pending mark. Returns true if the session already ended.
    fn settle(&mut self, id: SessionId) -> bool {
        self.pending.remove(&id);
        self.ended.remove(&id)
    }

    /// Registers an overlap session. Returns it back if it already ended.
    fn admit_overlap(&mut self, session: Session) -> Option<Session> {
        if self.settle(session.id()) {
            return Some(session);
        }
        self.overlap.insert(session.id(), session);
        None
    }

    /// Installs the slot's exclusive session. Returns the session that must be torn down: the
    /// new one if it already ended, otherwise whatever it displaced.
    fn admit_exclusive(&mut self, session: Session) -> Option<Session> {
        if self.settle(session.id()) {
            return Some(session);
        }
        self.exclusive.insert(session.slot(), session)
    }

    /// Removes the session an end notification refers to. A notification for a session that was
    /// already replaced or stopped finds nothing.
    fn take_ended(&mut self, id: SessionId, slot: usize) -> Option<Session> {
        if let Some(session) = self.overlap.remove(&id) {
            return Some(session);
        }
        if self
            .exclusive
            .get(&slot)
            .is_some_and(|session| session.id() == id)
        {
            return self.exclusive.remove(&slot);
        }
        if self.pending.contains(&id) {
            self.ended.insert(id);
        }
        None
    }

    fn drain(&mut self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.overlap.drain().map(|(_, s)| s).collect();
        sessions.extend(self.exclusive.drain().map(|(_, s)| s));
        sessions
    }
}

/// State shared with end callbacks.
struct Shared {
    registry: Mutex<Registry>,
}

impl Shared {
    /// Handles an end notification from the backend, on whatever thread it arrives.
    fn reap(&self, id: SessionId, slot: usize, end: PlaybackEnd) {
        let ended = self.registry.lock().take_ended(id, slot);

        match &end {
            PlaybackEnd::Finished => debug!(session = %id, slot, "Session finished"),
            PlaybackEnd::Failed(reason) => {
                warn!(session = %id, slot, reason = reason.as_str(), "Session failed")
            }
        }

        match ended {
            Some(mut session) => session.teardown(),
            None => debug!(session = %id, slot, "Session already reaped"),
        }
    }
}

/// Creates, tracks and tears down playback sessions for the pad board.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Creates a new session manager playing through the given backend.
    pub fn new(backend: Arc<dyn Backend>) -> SessionManager {
        info!(backend = %backend, "Session manager started");
        SessionManager {
            backend,
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Plays the pad at the given grid slot. Fails with [`TriggerError::MediaNotFound`] when the
    /// pad has no file or the file does not exist, in which case nothing is started.
    pub fn trigger(
        &self,
        pad: &Pad,
        slot: usize,
        master_volume: f32,
    ) -> Result<SessionId, TriggerError> {
        let path = match pad.file_path() {
            Some(path) if path.is_file() => path,
            Some(path) => return Err(TriggerError::MediaNotFound(path.to_path_buf())),
            None => return Err(TriggerError::MediaNotFound(PathBuf::new())),
        };
        let volume = effective_volume(pad.volume(), master_volume);

        match pad.mode() {
            PadMode::Cut => self.play_cut(path, slot, volume),
            PadMode::Overlap => self.play_overlap(path, slot, volume),
        }
    }

    /// Starts a new session that plays alongside everything else.
    pub fn play_overlap(
        &self,
        path: &Path,
        slot: usize,
        volume: f32,
    ) -> Result<SessionId, TriggerError> {
        let session = self.launch(path, slot, PadMode::Overlap, volume)?;
        let id = session.id();

        let ended = self.shared.registry.lock().admit_overlap(session);
        if let Some(mut ended) = ended {
            ended.teardown();
        }

        debug!(session = %id, slot, volume, path = ?path, "Overlap session triggered");
        Ok(id)
    }

    /// Silences the slot's current session, then starts its replacement.
    pub fn play_cut(
        &self,
        path: &Path,
        slot: usize,
        volume: f32,
    ) -> Result<SessionId, TriggerError> {
        let previous = self.shared.registry.lock().exclusive.remove(&slot);
        if let Some(mut previous) = previous {
            debug!(session = %previous.id(), slot, "Cutting previous session");
            previous.teardown();
        }

        let session = self.launch(path, slot, PadMode::Cut, volume)?;
        let id = session.id();

        let displaced = self.shared.registry.lock().admit_exclusive(session);
        if let Some(mut displaced) = displaced {
            displaced.teardown();
        }

        debug!(session = %id, slot, volume, path = ?path, "Cut session triggered");
        Ok(id)
    }

    /// Stops and disposes every session.
    pub fn stop_all(&self) {
        let sessions = self.shared.registry.lock().drain();

        let stopped = sessions.len();
        for mut session in sessions {
            session.teardown();
        }

        if stopped > 0 {
            info!(stopped, "All sessions stopped");
        }
    }

    /// Returns the number of live sessions.
    pub fn active_count(&self) -> usize {
        let registry = self.shared.registry.lock();
        registry.overlap.len() + registry.exclusive.len()
    }

    /// Returns the number of live overlap sessions.
    pub fn overlap_count(&self) -> usize {
        self.shared.registry.lock().overlap.len()
    }

    /// Returns the slot's exclusive session, if one is playing.
    pub fn exclusive_session(&self, slot: usize) -> Option<SessionId> {
        self.shared
            .registry
            .lock()
            .exclusive
            .get(&slot)
            .map(|session| session.id())
    }

    /// Returns true if the session is registered.
    pub fn is_live(&self, id: SessionId) -> bool {
        let registry = self.shared.registry.lock();
        registry.overlap.contains_key(&id)
            || registry.exclusive.values().any(|session| session.id() == id)
    }

    /// Opens and starts a session without registering it.
    fn launch(
        &self,
        path: &Path,
        slot: usize,
        mode: PadMode,
        volume: f32,
    ) -> Result<Session, TriggerError> {
        let id = SessionId::next();
        let handle = self.backend.open(path, self.end_callback(id, slot))?;
        let mut session = Session::new(id, handle, slot, mode);

        self.shared.registry.lock().pending.insert(id);
        if let Err(e) = session.start(volume) {
            self.shared.registry.lock().settle(id);
            session.teardown();
            return Err(e.into());
        }
        Ok(session)
    }

    fn end_callback(&self, id: SessionId, slot: usize) -> EndCallback {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move |end| {
            if let Some(shared) = shared.upgrade() {
                shared.reap(id, slot, end);
            }
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("SessionManager")
            .field("backend", &self.backend.to_string())
            .field("overlap_sessions", &registry.overlap.len())
            .field("exclusive_sessions", &registry.exclusive.len())
            .finish()
    }
}
