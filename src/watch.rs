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

//! Hot reload of the board file.
//!
//! The [`Supervisor`] turns raw filesystem events into reload requests. Bursts of events are
//! debounced into a single reload, and events that follow the board's own saves are ignored for
//! a short suppression window. The state machine runs on a dedicated thread that other threads
//! talk to only through a channel, and reloads leave that thread through a [`Dispatch`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, span, warn, Level};

/// Errors raised while starting the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Cannot watch {}: no parent directory", .0.display())]
    NoParent(PathBuf),

    #[error("Unable to start watch thread: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives reload requests. Implementations hand the request to the control context rather
/// than reloading on the supervisor thread.
pub trait Dispatch: Send + 'static {
    fn reload(&self);
}

impl<F> Dispatch for F
where
    F: Fn() + Send + 'static,
{
    fn reload(&self) {
        self()
    }
}

/// Debounce and suppression windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Quiet period required after the last change before reloading.
    pub debounce: Duration,
    /// Period after a self-save during which changes are ignored.
    pub suppression: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            debounce: Duration::from_millis(200),
            suppression: Duration::from_millis(150),
        }
    }
}

impl From<&crate::config::Settings> for Timing {
    fn from(settings: &crate::config::Settings) -> Self {
        Timing {
            debounce: settings.debounce(),
            suppression: settings.suppression(),
        }
    }
}

enum Command {
    Changed,
    ArmSuppression,
    Shutdown,
}

/// What the supervisor is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Idle,
    /// Ignoring changes until the deadline.
    Suppressed { until: Instant },
    /// A reload fires at the deadline unless another change pushes it back.
    DebouncePending { due: Instant },
}

impl WatchState {
    fn deadline(&self) -> Option<Instant> {
        match self {
            WatchState::Idle => None,
            WatchState::Suppressed { until } => Some(*until),
            WatchState::DebouncePending { due } => Some(*due),
        }
    }

    /// Arming always wins: a pending reload is discarded and the window restarts.
    fn arm(self, now: Instant, timing: &Timing) -> WatchState {
        WatchState::Suppressed {
            until: now + timing.suppression,
        }
    }

    fn changed(self, now: Instant, timing: &Timing) -> WatchState {
        match self {
            WatchState::Suppressed { .. } => self,
            WatchState::Idle | WatchState::DebouncePending { .. } => WatchState::DebouncePending {
                due: now + timing.debounce,
            },
        }
    }

    /// Advances past an expired deadline. Returns the next state and whether to reload.
    fn expire(self, now: Instant) -> (WatchState, bool) {
        match self {
            WatchState::Suppressed { until } if now >= until => (WatchState::Idle, false),
            WatchState::DebouncePending { due } if now >= due => (WatchState::Idle, true),
            state => (state, false),
        }
    }
}

/// Watches the board file and requests reloads.
pub struct Supervisor {
    commands: Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl Supervisor {
    /// Starts watching the given file. Only modify and create events for the file itself are
    /// considered; the directory is watched so that replace-by-rename saves are seen.
    pub fn start<D: Dispatch>(
        path: &Path,
        timing: Timing,
        dispatch: D,
    ) -> Result<Supervisor, WatchError> {
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatchError::NoParent(path.to_path_buf()))?;
        let dir = match path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
            Some(dir) => dir,
            None => return Err(WatchError::NoParent(path.to_path_buf())),
        };

        let mut supervisor = Supervisor::detached(timing, dispatch)?;

        let commands = supervisor.commands.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_change_to(&event, &file_name) => {
                    // The supervisor has shut down if this fails.
                    let _ = commands.send(Command::Changed);
                }
                Ok(_) => {}
                Err(e) => warn!(err = %e, "File watcher error"),
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        supervisor.watcher = Some(watcher);

        info!(
            path = ?path,
            debounce_ms = timing.debounce.as_millis() as u64,
            "Watching board config"
        );
        Ok(supervisor)
    }

    /// Starts the state machine without a filesystem watcher. Changes are fed in with
    /// [`Supervisor::notify_changed`].
    pub fn detached<D: Dispatch>(timing: Timing, dispatch: D) -> Result<Supervisor, WatchError> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || run(rx, timing, dispatch))?;

        Ok(Supervisor {
            commands,
            thread: Some(thread),
            watcher: None,
        })
    }

    /// Reports a raw change to the board file.
    pub fn notify_changed(&self) {
        if self.commands.send(Command::Changed).is_err() {
            debug!("Change reported after the supervisor stopped");
        }
    }

    /// Opens the suppression window. Call this immediately before saving the board file.
    pub fn arm_suppression(&self) {
        if self.commands.send(Command::ArmSuppression).is_err() {
            debug!("Suppression armed after the supervisor stopped");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Stop the watcher first so nothing queues behind the shutdown.
        self.watcher = None;
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Config watch thread panicked");
            }
        }
    }
}

fn is_change_to(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

fn run<D: Dispatch>(commands: Receiver<Command>, timing: Timing, dispatch: D) {
    let span = span!(Level::INFO, "config watch");
    let _enter = span.enter();

    let mut state = WatchState::Idle;
    loop {
        let command = match state.deadline() {
            Some(deadline) => match commands.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        let now = Instant::now();
        state = match command {
            Some(Command::Shutdown) => break,
            Some(Command::ArmSuppression) => state.arm(now, &timing),
            Some(Command::Changed) => {
                let next = state.changed(now, &timing);
                if next == state {
                    debug!("Ignoring change during suppression window");
                }
                next
            }
            None => {
                let (next, reload) = state.expire(now);
                if reload {
                    info!("Board config changed, requesting reload");
                    dispatch.reload();
                }
                next
            }
        };
    }

    debug!("Config watch stopped");
}
