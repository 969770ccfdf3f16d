//! Ambient track output.
//!
//! [`LoopedTrack`] decodes a media file once and loops it through a cpal
//! output stream. The stream lives on its own thread (cpal streams are not
//! `Send` on every platform); play/pause are sent as commands and volume is
//! shared through an atomic read in the audio callback.

use crate::error::{ChatError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{error, info, warn};

/// Continuously playing, volume-adjustable audio output.
pub trait AmbientOutput: Send + Sync {
    /// Start (or resume) looped playback.
    fn play(&self) -> Result<()>;
    /// Pause playback, keeping the loop position.
    fn pause(&self);
    /// Set output volume in `[0, 1]`.
    fn set_volume(&self, volume: f32);
}

enum TrackCommand {
    Play,
    Pause,
}

/// A decoded track looping on a cpal output device.
pub struct LoopedTrack {
    commands: crossbeam_channel::Sender<TrackCommand>,
    volume: Arc<AtomicU32>,
}

impl LoopedTrack {
    /// Decode `path` and open an output stream for it. Playback starts paused.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be decoded or no output device is available.
    pub fn open(path: &Path, output_device: Option<&str>) -> Result<Self> {
        let (samples, track_rate) = decode_to_mono_f32(path)?;
        if samples.is_empty() {
            return Err(ChatError::Audio(format!(
                "ambient track '{}' decoded to no audio",
                path.display()
            )));
        }
        info!(
            "loaded ambient track {} ({:.1}s at {track_rate}Hz)",
            path.display(),
            samples.len() as f32 / track_rate as f32
        );

        let volume = Arc::new(AtomicU32::new(0.0f32.to_bits()));
        let (commands, command_rx) = crossbeam_channel::unbounded::<TrackCommand>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let device_name = output_device.map(str::to_owned);
        let callback_volume = Arc::clone(&volume);
        std::thread::Builder::new()
            .name("kanha-ambient".into())
            .spawn(move || {
                let stream =
                    match build_stream(device_name.as_deref(), samples, track_rate, callback_volume)
                    {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok(()));

                while let Ok(command) = command_rx.recv() {
                    let result = match command {
                        TrackCommand::Play => stream.play().map_err(|e| e.to_string()),
                        TrackCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                    };
                    if let Err(e) = result {
                        error!("ambient stream control failed: {e}");
                    }
                }
                info!("ambient output closed");
            })?;

        ready_rx
            .recv()
            .map_err(|_| ChatError::Audio("ambient output thread exited early".into()))??;

        Ok(Self { commands, volume })
    }
}

impl AmbientOutput for LoopedTrack {
    fn play(&self) -> Result<()> {
        self.commands
            .send(TrackCommand::Play)
            .map_err(|_| ChatError::Audio("ambient output thread is gone".into()))
    }

    fn pause(&self) {
        if self.commands.send(TrackCommand::Pause).is_err() {
            warn!("ambient output thread is gone; pause ignored");
        }
    }

    fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

fn build_stream(
    device_name: Option<&str>,
    samples: Vec<f32>,
    track_rate: u32,
    volume: Arc<AtomicU32>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.output_devices()
            .map_err(|e| ChatError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| ChatError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| ChatError::Audio("no default output device".into()))?
    };

    let resolved_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("ambient output device: {resolved_name}");

    let default_config = device
        .default_output_config()
        .map_err(|e| ChatError::Audio(format!("no default output config: {e}")))?;
    let device_rate = default_config.sample_rate();
    let channels = default_config.channels().max(1) as usize;

    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: device_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let samples = if device_rate != track_rate {
        info!("resampling ambient track from {track_rate}Hz to {device_rate}Hz");
        resample_linear(&samples, track_rate, device_rate)
    } else {
        samples
    };

    let mut position = 0usize;
    device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let gain = f32::from_bits(volume.load(Ordering::Relaxed));
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or(0.0) * gain;
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                    position = (position + 1) % samples.len().max(1);
                }
            },
            move |err| {
                error!("ambient output stream error: {err}");
            },
            None,
        )
        .map_err(|e| ChatError::Audio(format!("failed to build output stream: {e}")))
}

/// Decode any supported media file to mono f32 samples.
fn decode_to_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ChatError::Audio(format!("failed to read ambient track format: {e}")))?;

    let mut format = detected.format;
    let track = format
        .default_track()
        .ok_or_else(|| ChatError::Audio("ambient track has no audio stream".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| ChatError::Audio("ambient track has unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ChatError::Audio(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(ChatError::Audio(format!("ambient track read error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(ChatError::Audio(format!("ambient track decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        let needs_new = sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < required);
        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }
        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
        }

        let data = match sample_buf.as_ref() {
            Some(b) => b.samples(),
            None => &[],
        };
        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            out.extend(
                data.chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    Ok((out, rate))
}

/// Linear-interpolation resampler, adequate for a background bed.
fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }
    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}
