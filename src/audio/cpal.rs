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
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{decode, BackendError, EndCallback, PlaybackEnd};
use crate::playsync::CancelHandle;

/// Plays each handle through its own output stream on the default cpal device.
pub struct Backend {
    /// The name of the host the device belongs to.
    host_name: String,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The device's default output configuration.
    config: cpal::StreamConfig,
    /// The sample format the device expects.
    sample_format: cpal::SampleFormat,
}

impl Backend {
    /// Opens the default output device of the default host.
    pub fn new() -> Result<Backend, BackendError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        let backend = Backend {
            host_name: host.id().name().to_string(),
            device,
            sample_format: supported.sample_format(),
            config: supported.config(),
        };
        info!(backend = %backend, "Audio backend ready");
        Ok(backend)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "default output (Channels={}) (Rate={}) ({})",
            self.config.channels, self.config.sample_rate, self.host_name
        )
    }
}

impl super::Backend for Backend {
    fn open(
        &self,
        path: &Path,
        on_end: EndCallback,
    ) -> Result<Box<dyn super::Handle>, BackendError> {
        Ok(Box::new(Handle {
            path: path.to_path_buf(),
            device: self.device.clone(),
            config: self.config.clone(),
            sample_format: self.sample_format,
            volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            cancel_handle: CancelHandle::new(),
            on_end: Some(on_end),
            voice_thread: None,
            disposed: false,
        }))
    }
}

/// One voice: a thread that decodes the file, owns the output stream and waits for the end of
/// the media or a cancel.
struct Handle {
    path: PathBuf,
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    /// Gain as f32 bits, read by the stream callback.
    volume: Arc<AtomicU32>,
    cancel_handle: CancelHandle,
    on_end: Option<EndCallback>,
    voice_thread: Option<thread::JoinHandle<()>>,
    disposed: bool,
}

impl super::Handle for Handle {
    fn play(&mut self) -> Result<(), BackendError> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        let on_end = match self.on_end.take() {
            Some(on_end) => on_end,
            // Already started.
            None => return Ok(()),
        };

        let voice = Voice {
            path: self.path.clone(),
            device: self.device.clone(),
            config: self.config.clone(),
            sample_format: self.sample_format,
            volume: self.volume.clone(),
            cancel_handle: self.cancel_handle.clone(),
        };
        self.voice_thread = Some(
            thread::Builder::new()
                .name("pad-voice".into())
                .spawn(move || voice.run(on_end))?,
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.cancel_handle.cancel();
        let Some(voice_thread) = self.voice_thread.take() else {
            return Ok(());
        };

        // A voice reaped from its own end callback must not join itself.
        if voice_thread.thread().id() == thread::current().id() {
            return Ok(());
        }
        voice_thread
            .join()
            .map_err(|_| BackendError::Stream("voice thread panicked".to_string()))
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn dispose(&mut self) -> Result<(), BackendError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.on_end = None;
        self.stop()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = super::Handle::dispose(self) {
            error!(path = ?self.path, err = %e, "Error releasing voice");
        }
    }
}

/// Everything the voice thread needs, moved onto it at play time.
struct Voice {
    path: PathBuf,
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    volume: Arc<AtomicU32>,
    cancel_handle: CancelHandle,
}

impl Voice {
    fn run(self, on_end: EndCallback) {
        let span = span!(Level::DEBUG, "pad voice (cpal)");
        let _enter = span.enter();

        let cancel_handle = self.cancel_handle.clone();
        let path = self.path.clone();
        let result = self.play_to_end();

        if cancel_handle.is_cancelled() {
            debug!(path = ?path, "Voice stopped");
            return;
        }
        match result {
            Ok(()) => on_end(PlaybackEnd::Finished),
            Err(e) => {
                error!(path = ?path, err = %e, "Voice failed");
                on_end(PlaybackEnd::Failed(e.to_string()));
            }
        }
    }

    fn play_to_end(self) -> Result<(), BackendError> {
        let decoded = decode::decode_file(&self.path, || self.cancel_handle.is_cancelled())?;
        if self.cancel_handle.is_cancelled() {
            return Ok(());
        }
        let audio = decoded.conform(self.config.sample_rate, self.config.channels);
        debug!(
            path = ?self.path,
            duration_ms = audio.duration().as_millis() as u64,
            "Voice decoded"
        );

        let playback = Arc::new(Playback {
            samples: audio.samples,
            position: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            stream_error: Mutex::new(None),
        });

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(playback.clone()),
            cpal::SampleFormat::I16 => self.build_stream::<i16>(playback.clone()),
            cpal::SampleFormat::U16 => self.build_stream::<u16>(playback.clone()),
            cpal::SampleFormat::I32 => self.build_stream::<i32>(playback.clone()),
            other => Err(BackendError::Stream(format!(
                "unsupported sample format {}",
                other
            ))),
        }?;
        stream
            .play()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        self.cancel_handle.wait(&playback.finished);
        drop(stream);

        let stream_error = playback.stream_error.lock().take();
        match stream_error {
            Some(err) => Err(BackendError::Stream(err)),
            None => Ok(()),
        }
    }

    fn build_stream<T>(&self, playback: Arc<Playback>) -> Result<cpal::Stream, BackendError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let volume = self.volume.clone();
        let cancel_handle = self.cancel_handle.clone();
        let error_playback = playback.clone();
        let error_cancel_handle = self.cancel_handle.clone();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let gain = f32::from_bits(volume.load(Ordering::Relaxed));
                    if playback.fill(data, gain) {
                        cancel_handle.notify();
                    }
                },
                move |err| {
                    error!("CPAL output stream error: {}", err);
                    *error_playback.stream_error.lock() = Some(err.to_string());
                    error_playback.finished.store(true, Ordering::Release);
                    error_cancel_handle.notify();
                },
                None,
            )
            .map_err(|e| BackendError::Stream(e.to_string()))
    }
}

/// Decoded samples and the read position shared with the stream callback.
struct Playback {
    samples: Vec<f32>,
    position: AtomicUsize,
    finished: AtomicBool,
    stream_error: Mutex<Option<String>>,
}

impl Playback {
    /// Writes the next block into `data`, zero-filling past the end. Returns true the first
    /// time the end of the media is reached.
    fn fill<T>(&self, data: &mut [T], gain: f32) -> bool
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let start = self.position.load(Ordering::Relaxed).min(self.samples.len());
        let end = (start + data.len()).min(self.samples.len());
        let written = end - start;

        for (dst, src) in data.iter_mut().zip(&self.samples[start..end]) {
            *dst = T::from_sample(src * gain);
        }
        for dst in data[written..].iter_mut() {
            *dst = T::from_sample(0.0f32);
        }
        self.position.store(end, Ordering::Relaxed);

        end >= self.samples.len() && !self.finished.swap(true, Ordering::AcqRel)
    }
}
