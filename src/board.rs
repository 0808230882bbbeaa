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
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::Backend;
use crate::config::{store, BoardConfig, ConfigError, Pad, Settings};
use crate::playback::{master_volume_from_percent, SessionId, SessionManager, TriggerError};
use crate::watch::{Dispatch, Supervisor, Timing, WatchError};

/// Errors from board actions.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("No pad at position {}", .0 + 1)]
    NoSuchPad(usize),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// The live board: the configuration being shown, the master volume and the sessions it has
/// started. Everything here runs on the control context.
pub struct Board {
    path: PathBuf,
    config: BoardConfig,
    /// 0 to 100.
    master_volume: f64,
    sessions: SessionManager,
    supervisor: Option<Supervisor>,
}

impl Board {
    /// Loads the board from `path` and watches it for edits, requesting reloads through
    /// `dispatch`.
    pub fn open<D: Dispatch>(
        path: &Path,
        settings: &Settings,
        backend: Arc<dyn Backend>,
        dispatch: D,
    ) -> Result<Board, BoardError> {
        let mut board = Board::new(
            path,
            SessionManager::new(backend),
            None,
            settings.master_volume(),
        );
        board.supervisor = Some(Supervisor::start(
            path,
            Timing::from(settings),
            dispatch,
        )?);
        Ok(board)
    }

    /// Loads the board from `path` with the given sessions and, optionally, supervisor.
    pub fn new(
        path: &Path,
        sessions: SessionManager,
        supervisor: Option<Supervisor>,
        master_volume: f64,
    ) -> Board {
        let mut board = Board {
            path: path.to_path_buf(),
            config: BoardConfig::default(),
            master_volume: master_volume.clamp(0.0, 100.0),
            sessions,
            supervisor,
        };
        board.load();
        board
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    /// Plays the pad at the given 0-based slot.
    pub fn trigger(&self, slot: usize) -> Result<SessionId, BoardError> {
        let pad = self.config.pad(slot).ok_or(BoardError::NoSuchPad(slot))?;
        let id = self.sessions.trigger(
            pad,
            slot,
            master_volume_from_percent(self.master_volume),
        )?;
        let label = pad.display_label(slot);
        info!(
            slot,
            session = %id,
            label = label.as_str(),
            mode = %pad.mode(),
            "Pad triggered"
        );
        Ok(id)
    }

    pub fn stop_all(&self) {
        self.sessions.stop_all();
    }

    /// Sets the master volume used by subsequent triggers. Playing sessions keep their gain.
    pub fn set_master_volume(&mut self, percent: f64) {
        self.master_volume = percent.clamp(0.0, 100.0);
        info!(master_volume = self.master_volume, "Master volume set");
    }

    /// Rereads the board file and rebuilds the grid. Playing sessions are left alone.
    pub fn reload(&mut self) {
        self.load();
        info!(
            rows = self.config.rows(),
            cols = self.config.cols(),
            "Board reloaded"
        );
    }

    /// Applies new grid settings and saves the board.
    pub fn apply_grid(
        &mut self,
        rows: i32,
        cols: i32,
        font_size: Option<i32>,
        padding: Option<i32>,
    ) -> Result<(), BoardError> {
        self.config.apply_grid(rows, cols, font_size, padding);
        info!(
            rows = self.config.rows(),
            cols = self.config.cols(),
            font_size = self.config.button_font_size(),
            padding = self.config.button_padding(),
            "Grid applied"
        );
        self.save()
    }

    /// Replaces one pad and saves the board.
    pub fn set_pad(&mut self, slot: usize, pad: Pad) -> Result<(), BoardError> {
        if !self.config.set_pad(slot, pad) {
            return Err(BoardError::NoSuchPad(slot));
        }
        self.save()
    }

    /// Saves the board file. The watcher ignores the change this causes.
    pub fn save(&self) -> Result<(), BoardError> {
        self.suppress_reload();
        let result = store::save(&self.path, &self.config);
        // The window runs from the end of the write.
        self.suppress_reload();
        Ok(result?)
    }

    /// One line per pad, flagging pads whose file is missing and cut pads that are playing.
    pub fn describe(&self) -> Vec<String> {
        self.config
            .pads()
            .iter()
            .enumerate()
            .map(|(slot, pad)| match self.sessions.exclusive_session(slot) {
                Some(id) => format!("{} playing={}", describe_pad(slot, pad), id),
                None => describe_pad(slot, pad),
            })
            .collect()
    }

    fn load(&mut self) {
        // Loading a missing file writes the default board, which must not bounce back as a
        // reload.
        let missing = !self.path.exists();
        if missing {
            self.suppress_reload();
        }
        let mut config = store::load(&self.path);
        if missing {
            self.suppress_reload();
        }
        config.reconcile();
        debug!(pads = config.pads().len(), "Grid rebuilt");
        self.config = config;
    }

    fn suppress_reload(&self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.arm_suppression();
        }
    }
}

/// Formats one pad for listings.
pub fn describe_pad(slot: usize, pad: &Pad) -> String {
    let file = match pad.file_path() {
        Some(path) if path.is_file() => path.display().to_string(),
        Some(path) => format!("{} (missing)", path.display()),
        None => "(no file)".to_string(),
    };
    format!(
        "{:>3}. {} [{}] vol={:.2} color={} {}",
        slot + 1,
        pad.display_label(slot),
        pad.mode(),
        pad.volume(),
        pad.color_or_default(),
        file,
    )
}
