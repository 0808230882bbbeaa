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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::board::{Board, BoardError};
use crate::playback::TriggerError;

pub mod keyboard;

/// Capacity of the event queue feeding the controller.
const EVENT_QUEUE: usize = 16;

/// Controller events that drive the board.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays the pad at the given 0-based slot.
    Trigger(usize),

    /// Stops every playing session.
    Stop,

    /// Rereads the board file. Sent by the config watcher, or by the user.
    Reload,

    /// Sets the master volume, 0 to 100.
    Volume(f64),

    /// Resizes the grid and restyles its buttons, then saves.
    Grid {
        rows: i32,
        cols: i32,
        font_size: Option<i32>,
        padding: Option<i32>,
    },

    /// Logs the state of every pad.
    Status,

    /// Stops everything and closes the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Creates the channel a controller reads events from.
pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel(EVENT_QUEUE)
}

/// Owns the board on a task of its own and applies events to it one at a time.
pub struct Controller {
    handle: JoinHandle<()>,
    events_tx: Sender<Event>,
}

impl Controller {
    /// Creates a new controller with the given driver. `events` must be the channel the board's
    /// watcher dispatches reloads to.
    pub fn new(
        board: Board,
        driver: Arc<dyn Driver>,
        events: (Sender<Event>, Receiver<Event>),
    ) -> Controller {
        let (events_tx, events_rx) = events;
        let driver_tx = events_tx.clone();
        Controller {
            handle: tokio::spawn(
                Controller::handle_events(board, driver, driver_tx, events_rx)
                    .instrument(span!(Level::INFO, "controller")),
            ),
            events_tx,
        }
    }

    /// Asks the controller to stop everything and exit.
    pub async fn quit(&self) {
        if self.events_tx.send(Event::Quit).await.is_err() {
            debug!("Controller already closed");
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver and the config watcher until told to quit or the driver
    /// goes away.
    async fn handle_events(
        mut board: Board,
        driver: Arc<dyn Driver>,
        events_tx: Sender<Event>,
        mut events_rx: Receiver<Event>,
    ) {
        let mut join_handle = driver.monitor_events(events_tx);
        let mut driver_done = false;

        info!(
            path = ?board.path(),
            pads = board.config().pads().len(),
            "Controller started."
        );

        loop {
            tokio::select! {
                biased;
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    debug!(event = ?event, "Received event.");
                    if event == Event::Quit {
                        break;
                    }
                    Controller::apply(&mut board, event);
                }
                result = &mut join_handle => {
                    driver_done = true;
                    match result {
                        Ok(Ok(())) => info!("Driver finished."),
                        Ok(Err(e)) => error!(err = %e, "Driver failed"),
                        Err(e) => error!(err = %e, "Error waiting for driver"),
                    }
                    break;
                }
            }
        }

        info!("Controller closing.");
        board.stop_all();
        // Unblocks a watcher that is waiting to dispatch a reload.
        drop(events_rx);
        drop(board);

        // A handle that already completed in the loop must not be polled again.
        if driver_done {
            return;
        }
        if join_handle.is_finished() {
            if let Ok(Err(e)) = join_handle.await {
                error!(err = %e, "Driver failed");
            }
        } else {
            join_handle.abort();
        }
    }

    fn apply(board: &mut Board, event: Event) {
        let result = match event {
            Event::Trigger(slot) => board.trigger(slot).map(|_| ()),
            Event::Stop => {
                board.stop_all();
                Ok(())
            }
            Event::Reload => {
                board.reload();
                Ok(())
            }
            Event::Volume(percent) => {
                board.set_master_volume(percent);
                Ok(())
            }
            Event::Grid {
                rows,
                cols,
                font_size,
                padding,
            } => board.apply_grid(rows, cols, font_size, padding),
            Event::Status => {
                info!(
                    active = board.sessions().active_count(),
                    overlapping = board.sessions().overlap_count(),
                    master_volume = board.master_volume(),
                    "Board status"
                );
                for line in board.describe() {
                    info!("{}", line);
                }
                Ok(())
            }
            Event::Quit => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(BoardError::Trigger(TriggerError::MediaNotFound(path))) => {
                warn!(path = ?path, "Pad file not found")
            }
            Err(e) => error!(err = %e, "Error applying event"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::audio::mock;
    use crate::config::{store, Pad, PadMode};
    use crate::playback::SessionManager;

    /// Sends a fixed list of events, then finishes.
    struct ScriptDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::task::spawn_blocking(move || {
                for event in events {
                    events_tx
                        .blocking_send(event)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
                Ok(())
            })
        }
    }

    fn board_with_pads(dir: &Path, backend: &mock::Backend) -> Board {
        let media = dir.join("kick.wav");
        fs::write(&media, b"RIFF").expect("write");

        let mut board = Board::new(
            &dir.join(store::CONFIG_FILE_NAME),
            SessionManager::new(Arc::new(backend.clone())),
            None,
            100.0,
        );
        board
            .set_pad(0, Pad::new(None, Some(media.clone()), PadMode::Cut, 1.0, None))
            .expect("set pad");
        board
            .set_pad(1, Pad::new(None, Some(media), PadMode::Overlap, 1.0, None))
            .expect("set pad");
        board
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = mock::Backend::new("mock");
        let board = board_with_pads(dir.path(), &backend);

        let driver = Arc::new(ScriptDriver {
            events: vec![
                Event::Trigger(0),
                Event::Trigger(0),
                Event::Volume(50.0),
                Event::Trigger(1),
                Event::Trigger(7),
                Event::Status,
                Event::Grid {
                    rows: 2,
                    cols: 2,
                    font_size: None,
                    padding: None,
                },
                Event::Quit,
            ],
        });
        let mut controller = Controller::new(board, driver, channel());
        controller.join().await.expect("controller");

        let probes = backend.probes();
        assert_eq!(probes.len(), 3);
        assert_eq!(probes[0].stop_calls(), 1, "cut pad retriggered");
        assert_eq!(probes[2].volume(), 0.5);
        // Quitting stops everything.
        assert!(probes.iter().all(|p| p.is_disposed()));

        let saved = store::read(&dir.path().join(store::CONFIG_FILE_NAME)).expect("read");
        assert_eq!(saved.pads().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = mock::Backend::new("mock");
        let board = board_with_pads(dir.path(), &backend);
        fs::write(
            dir.path().join(store::CONFIG_FILE_NAME),
            r#"{"GridRows": 1, "GridCols": 1, "Pads": []}"#,
        )
        .expect("write");

        let driver = Arc::new(ScriptDriver {
            events: vec![Event::Reload, Event::Trigger(0), Event::Trigger(1)],
        });
        let mut controller = Controller::new(board, driver, channel());
        controller.join().await.expect("controller");

        // The reloaded grid has one empty pad, so nothing plays.
        assert_eq!(backend.opened(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_finishing_closes_controller() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = mock::Backend::new("mock");
        let board = board_with_pads(dir.path(), &backend);

        let driver = Arc::new(ScriptDriver {
            events: vec![Event::Trigger(1)],
        });
        let (events_tx, events_rx) = channel();
        let mut controller = Controller::new(board, driver, (events_tx.clone(), events_rx));
        // Nothing but the driver can end the controller here.
        controller.join().await.expect("controller");

        assert_eq!(backend.opened(), 1);
        assert!(backend.probes().iter().all(|p| p.is_disposed()));
        drop(events_tx);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_driver_closes_controller() {
        struct FailingDriver;

        impl Driver for FailingDriver {
            fn monitor_events(&self, _: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
                tokio::spawn(async {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))
                })
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let backend = mock::Backend::new("mock");
        let board = board_with_pads(dir.path(), &backend);

        let mut controller = Controller::new(board, Arc::new(FailingDriver), channel());
        controller.join().await.expect("controller");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = mock::Backend::new("mock");
        let board = board_with_pads(dir.path(), &backend);

        let driver = Arc::new(ScriptDriver {
            events: vec![Event::Trigger(1)],
        });
        let mut controller = Controller::new(board, driver, channel());
        controller.quit().await;
        controller.join().await.expect("controller");

        assert!(backend.probes().iter().all(|p| p.is_disposed()));
    }
}
