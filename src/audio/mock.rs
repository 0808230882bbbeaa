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
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{BackendError, EndCallback, PlaybackEnd};

/// Shared state of one mock handle, visible to tests through a [`Probe`].
struct HandleState {
    path: PathBuf,
    volume: Mutex<f32>,
    playing: AtomicBool,
    disposed: AtomicBool,
    stop_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
    fail_stop: bool,
    on_end: Mutex<Option<EndCallback>>,
}

impl HandleState {
    /// Fires the end callback at most once.
    fn end(&self, end: PlaybackEnd) -> bool {
        let callback = self.on_end.lock().take();
        match callback {
            Some(callback) => {
                self.playing.store(false, Ordering::SeqCst);
                callback(end);
                true
            }
            None => false,
        }
    }
}

/// A mock backend. Doesn't actually play anything, but tracks every handle it opens.
#[derive(Clone)]
pub struct Backend {
    name: String,
    handles: Arc<Mutex<Vec<Arc<HandleState>>>>,
    fail_stops: Arc<AtomicBool>,
    auto_finish: Option<Duration>,
}

impl Backend {
    /// Creates a mock backend whose handles play until a test ends them.
    pub fn new(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            handles: Arc::new(Mutex::new(Vec::new())),
            fail_stops: Arc::new(AtomicBool::new(false)),
            auto_finish: None,
        }
    }

    /// Creates a mock backend whose handles finish on their own after `duration`.
    pub fn with_auto_finish(name: &str, duration: Duration) -> Backend {
        Backend {
            auto_finish: Some(duration),
            ..Backend::new(name)
        }
    }

    /// Makes `stop` fail on handles opened from now on.
    pub fn fail_stops(&self, fail: bool) {
        self.fail_stops.store(fail, Ordering::SeqCst);
    }

    /// Returns probes for every handle opened so far, oldest first.
    pub fn probes(&self) -> Vec<Probe> {
        self.handles
            .lock()
            .iter()
            .map(|state| Probe {
                state: state.clone(),
            })
            .collect()
    }

    /// Returns the probe for the most recently opened handle.
    pub fn last_probe(&self) -> Option<Probe> {
        self.handles.lock().last().map(|state| Probe {
            state: state.clone(),
        })
    }

    /// Returns the number of handles opened so far.
    pub fn opened(&self) -> usize {
        self.handles.lock().len()
    }
}

impl super::Backend for Backend {
    fn open(
        &self,
        path: &Path,
        on_end: EndCallback,
    ) -> Result<Box<dyn super::Handle>, BackendError> {
        let state = Arc::new(HandleState {
            path: path.to_path_buf(),
            volume: Mutex::new(1.0),
            playing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
            fail_stop: self.fail_stops.load(Ordering::SeqCst),
            on_end: Mutex::new(Some(on_end)),
        });
        self.handles.lock().push(state.clone());
        debug!(backend = self.name, path = ?path, "Opened mock handle");

        Ok(Box::new(Handle {
            state,
            auto_finish: self.auto_finish,
        }))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A mock playback handle.
struct Handle {
    state: Arc<HandleState>,
    auto_finish: Option<Duration>,
}

impl super::Handle for Handle {
    fn play(&mut self) -> Result<(), BackendError> {
        if self.state.disposed.load(Ordering::SeqCst) {
            return Err(BackendError::Disposed);
        }
        self.state.playing.store(true, Ordering::SeqCst);
        info!(path = ?self.state.path, volume = *self.state.volume.lock(), "Playing (mock).");

        if let Some(duration) = self.auto_finish {
            let state = self.state.clone();
            thread::spawn(move || {
                thread::sleep(duration);
                if state.playing.load(Ordering::SeqCst) {
                    state.end(PlaybackEnd::Finished);
                }
            });
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.state.playing.store(false, Ordering::SeqCst);
        if self.state.fail_stop {
            return Err(BackendError::Stream("mock stop failure".to_string()));
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        *self.state.volume.lock() = volume;
    }

    fn dispose(&mut self) -> Result<(), BackendError> {
        self.state.dispose_calls.fetch_add(1, Ordering::SeqCst);
        self.state.playing.store(false, Ordering::SeqCst);
        self.state.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A test-side view of a mock handle.
#[derive(Clone)]
pub struct Probe {
    state: Arc<HandleState>,
}

impl Probe {
    /// Ends playback naturally if the handle is still playing.
    pub fn finish(&self) -> bool {
        if !self.state.playing.load(Ordering::SeqCst) {
            return false;
        }
        self.state.end(PlaybackEnd::Finished)
    }

    /// Reports a playback error if the handle is still playing.
    pub fn fail(&self, reason: &str) -> bool {
        if !self.state.playing.load(Ordering::SeqCst) {
            return false;
        }
        self.state.end(PlaybackEnd::Failed(reason.to_string()))
    }

    /// Delivers an end notification regardless of the handle's state, as a native engine may
    /// when its end races a stop.
    pub fn deliver(&self, end: PlaybackEnd) -> bool {
        self.state.end(end)
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    pub fn volume(&self) -> f32 {
        *self.state.volume.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.state.stop_calls.load(Ordering::SeqCst)
    }

    pub fn dispose_calls(&self) -> usize {
        self.state.dispose_calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;

    use super::*;
    use crate::audio::Backend as _;
    use crate::testutil::eventually;

    #[test]
    fn test_end_fires_once() {
        let backend = Backend::new("mock");
        let (tx, rx) = mpsc::channel();
        let mut handle = backend
            .open(
                Path::new("/tmp/kick.wav"),
                Box::new(move |end| tx.send(end).expect("send end")),
            )
            .expect("open");

        let probe = backend.last_probe().expect("probe");
        assert!(!probe.finish(), "handles that never played do not finish");

        handle.play().expect("play");
        assert!(probe.is_playing());
        assert!(probe.finish());
        assert!(!probe.finish());
        assert!(!probe.deliver(PlaybackEnd::Finished));
        assert_eq!(rx.try_recv(), Ok(PlaybackEnd::Finished));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_failure() {
        let backend = Backend::new("mock");
        backend.fail_stops(true);
        let mut handle = backend
            .open(Path::new("/tmp/snare.wav"), Box::new(|_| {}))
            .expect("open");
        handle.play().expect("play");
        assert!(handle.stop().is_err());
        assert!(handle.dispose().is_ok());

        let probe = backend.last_probe().expect("probe");
        assert_eq!(probe.stop_calls(), 1);
        assert!(probe.is_disposed());
        assert!(matches!(handle.play(), Err(BackendError::Disposed)));
    }

    #[test]
    fn test_auto_finish() {
        let backend = Backend::with_auto_finish("mock", Duration::from_millis(20));
        let (tx, rx) = mpsc::channel();
        let mut handle = backend
            .open(
                Path::new("/tmp/hat.wav"),
                Box::new(move |end| tx.send(end).expect("send end")),
            )
            .expect("open");
        handle.set_volume(0.5);
        handle.play().expect("play");

        let probe = backend.last_probe().expect("probe");
        assert_eq!(probe.volume(), 0.5);
        eventually(|| !probe.is_playing(), "Mock handle never finished");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)),
            Ok(PlaybackEnd::Finished)
        );
    }
}
