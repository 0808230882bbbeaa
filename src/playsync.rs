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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Represents the current cancel state.
#[derive(PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared between a handle owner and the voice thread that plays it. It's the
/// voice thread's responsibility to respect a cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set once the owner asks the voice to stop.
    cancelled: Arc<Mutex<CancelState>>,
    /// Wakes the voice thread on cancellation or when playback finishes.
    condvar: Arc<Condvar>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the voice has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Blocks until the handle is cancelled or `finished` becomes true.
    pub fn wait(&self, finished: &AtomicBool) {
        let mut cancelled = self.cancelled.lock();
        while *cancelled == CancelState::Untouched && !finished.load(Ordering::Acquire) {
            self.condvar.wait(&mut cancelled);
        }
    }

    /// Wakes any waiter so it can re-check the finished flag.
    pub fn notify(&self) {
        // Taking the lock orders this wakeup after a waiter's flag check.
        let _guard = self.cancelled.lock();
        self.condvar.notify_all();
    }

    /// Cancels the voice. Repeated calls are no-ops.
    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
