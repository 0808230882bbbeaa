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

//! Whole-file decoding for pad voices.
//!
//! Pad files are short one-shots, so each voice decodes its file entirely into memory and then
//! conforms it to the output device's rate and channel count before the stream starts.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::BackendError;

/// Interleaved f32 audio held in memory.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Returns the playback length.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Converts to the given rate and channel count.
    pub fn conform(self, sample_rate: u32, channels: u16) -> DecodedAudio {
        let resampled = if self.sample_rate != sample_rate && sample_rate > 0 {
            debug!(
                source_rate = self.sample_rate,
                target_rate = sample_rate,
                "Transcoding pad audio"
            );
            DecodedAudio {
                samples: transcode_samples(
                    &self.samples,
                    self.channels,
                    self.sample_rate,
                    sample_rate,
                ),
                channels: self.channels,
                sample_rate,
            }
        } else {
            self
        };

        if resampled.channels == channels {
            return resampled;
        }
        DecodedAudio {
            samples: remap_channels(&resampled.samples, resampled.channels, channels),
            channels,
            sample_rate: resampled.sample_rate,
        }
    }
}

/// Decodes the whole file. `cancelled` is polled between packets so a stopped voice does not
/// keep decoding.
pub fn decode_file<F>(path: &Path, cancelled: F) -> Result<DecodedAudio, BackendError>
where
    F: Fn() -> bool,
{
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let file_path = path.display().to_string();
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BackendError::Decode(format!("'{}': {}", file_path, e)))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BackendError::Decode(format!("'{}': no audio track found", file_path)))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| BackendError::Decode(format!("'{}': {}", file_path, e)))?;

    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        if cancelled() {
            debug!(path = file_path.as_str(), "Decode cancelled");
            break;
        }

        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(BackendError::Decode(format!("'{}': {}", file_path, e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packets are skipped, the rest of the file may still play.
                warn!(path = file_path.as_str(), error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(BackendError::Decode(format!("'{}': {}", file_path, e))),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }

        let needed = decoded.capacity() * spec.channels.count();
        if sample_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < needed)
        {
            sample_buffer = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buffer) = sample_buffer.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }
    }

    if channels == 0 || sample_rate == 0 {
        return Err(BackendError::Decode(format!(
            "'{}': unable to determine channel layout or sample rate",
            file_path
        )));
    }

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

/// Transcodes samples from one sample rate to another using linear interpolation, which is
/// sufficient for drum hits and one-shots.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }
    output
}

/// Maps interleaved audio onto a different channel count. Mono is copied to every output,
/// otherwise source channels map one-to-one and extra outputs stay silent.
fn remap_channels(samples: &[f32], source_channels: u16, target_channels: u16) -> Vec<f32> {
    let source = source_channels.max(1) as usize;
    let target = target_channels.max(1) as usize;
    let frames = samples.len() / source;

    let mut output = Vec::with_capacity(frames * target);
    for frame in samples.chunks_exact(source) {
        for channel in 0..target {
            let sample = if source == 1 {
                frame[0]
            } else {
                frame.get(channel).copied().unwrap_or(0.0)
            };
            output.push(sample);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        let left: Vec<i32> = (0..4410).map(|i| (i % 100) * 1000).collect();
        let right: Vec<i32> = left.iter().map(|s| -s).collect();
        write_wav(path.clone(), vec![left, right], 44100).expect("write wav");

        let decoded = decode_file(&path, || false).expect("decode");
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.frames(), 4410);
        assert_eq!(decoded.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_decode_cancelled_returns_early() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        write_wav(path.clone(), vec![vec![0.25f32; 44100]], 44100).expect("write wav");

        let decoded = decode_file(&path, || true).expect("decode");
        assert!(decoded.samples.is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").expect("write");

        assert!(matches!(
            decode_file(&path, || false),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_missing() {
        assert!(matches!(
            decode_file(Path::new("/missing.wav"), || false),
            Err(BackendError::Io(_))
        ));
    }

    #[test]
    fn test_transcode_samples() {
        let source_rate = 44100;
        let target_rate = 48000;
        let source_samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = transcode_samples(&source_samples, 1, source_rate, target_rate);
        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.len(), expected_len);
    }

    #[test]
    fn test_conform_mono_to_stereo() {
        let audio = DecodedAudio {
            samples: vec![0.1, 0.2, 0.3],
            channels: 1,
            sample_rate: 48000,
        };

        let conformed = audio.conform(48000, 2);
        assert_eq!(conformed.channels, 2);
        assert_eq!(conformed.samples, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_conform_stereo_to_quad() {
        let audio = DecodedAudio {
            samples: vec![1.0, -1.0, 0.5, -0.5],
            channels: 2,
            sample_rate: 44100,
        };

        let conformed = audio.conform(88200, 4);
        assert_eq!(conformed.sample_rate, 88200);
        assert_eq!(conformed.frames(), 4);
        // Left and right land on the first two outputs; the rest are silent.
        assert_eq!(&conformed.samples[0..4], &[1.0, -1.0, 0.0, 0.0]);
    }
}
