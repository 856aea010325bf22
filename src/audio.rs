//! Audio plumbing around the analyzer: file decoding, sample conversion,
//! re-chunking capture blocks into exact hops, and cpal input streams.

use std::fmt::Display;
use std::{ fs::File, path::Path, sync::Arc };

use cpal::traits::DeviceTrait;
use crossbeam_channel::Sender;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as DecodeError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{ get_codecs, get_probe };

use crate::error::{ Error, Result };
use crate::logger::Logger;

fn audio_err<E: Display>(e: E) -> Error {
    Error::Audio(e.to_string())
}

#[derive(Debug)]
pub struct AudioData {
    pub sample_rate: u32,
    pub channels: u16,
    /// All channels averaged, in [-1, 1].
    pub samples: Vec<f32>,
}

impl AudioData {
    pub fn duration_seconds(&self) -> f64 {
        (self.samples.len() as f64) / (self.sample_rate as f64)
    }
}

/// Decodes the default track of a WAV/MP3/MP4/MKV/FLAC file to mono.
pub fn decode_mono<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path_ref = path.as_ref();

    let file = File::open(path_ref)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path_ref.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(audio_err)?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .default_track()
            .ok_or_else(|| Error::Audio("no default audio track found".to_string()))?;
        (track.id, track.codec_params.clone())
    };

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(audio_err)?;

    let sample_rate = codec_params.sample_rate.ok_or_else(|| Error::Audio("unknown sample rate".to_string()))?;
    let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(1u16);

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(DecodeError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(DecodeError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(err) => {
                return Err(audio_err(err));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(DecodeError::DecodeError(_)) => {
                continue;
            }
            Err(err) => {
                return Err(audio_err(err));
            }
        };

        let spec = *decoded.spec();
        let chan_count = spec.channels.count().max(1);

        if
            sample_buf
                .as_ref()
                .map(|b| b.capacity() < decoded.capacity())
                .unwrap_or(true)
        {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };

        buf.copy_interleaved_ref(decoded);
        mono.extend(downmix(buf.samples(), chan_count));
    }

    Ok(AudioData { sample_rate, channels, samples: mono })
}

/// Averages interleaved frames of `channels` samples into one mono sample
/// each. File decoding and live capture both go through here.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / (channels as f32))
        .collect()
}

/// Linear-interpolation resampler for mono signals.
pub fn resample_linear(x: &[f32], sr_in: u32, sr_out: u32) -> Vec<f32> {
    if x.is_empty() || sr_in == 0 || sr_out == 0 || sr_in == sr_out {
        return x.to_vec();
    }
    let ratio = (sr_out as f64) / (sr_in as f64);
    let n_out = ((x.len() as f64) * ratio).floor().max(1.0) as usize;
    let last = x[x.len() - 1];

    (0..n_out)
        .map(|i| {
            let pos = (i as f64) / ratio;
            let i0 = pos.floor() as usize;
            if i0 + 1 >= x.len() {
                last
            } else {
                let t = (pos - (i0 as f64)) as f32;
                x[i0] + (x[i0 + 1] - x[i0]) * t
            }
        })
        .collect()
}

/// Clamped conversion of [-1, 1] floats to 16-bit PCM.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Re-chunks capture blocks of any size into hops of exactly `hop` samples.
pub struct HopAssembler {
    hop: usize,
    pending: Vec<i16>,
}

impl HopAssembler {
    pub fn new(hop: usize) -> Self {
        Self {
            hop: hop.max(1),
            pending: Vec::with_capacity(hop * 2),
        }
    }

    /// Appends `block` and calls `on_hop` for every complete hop, in order.
    /// A shorter remainder waits for the next block.
    pub fn push<F>(&mut self, block: &[i16], mut on_hop: F) -> Result<()>
        where F: FnMut(&[i16]) -> Result<()>
    {
        self.pending.extend_from_slice(block);
        let mut start = 0;
        while self.pending.len() - start >= self.hop {
            on_hop(&self.pending[start..start + self.hop])?;
            start += self.hop;
        }
        self.pending.drain(..start);
        Ok(())
    }

    /// Samples still waiting for a full hop.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Opens an input stream that forwards downmixed f32 blocks over `tx`.
pub fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    tx: Sender<Vec<f32>>,
    logger: Arc<Logger>
) -> Result<cpal::Stream> {
    let err_logger = logger.clone();
    let err_fn = move |e| {
        let _ = err_logger.error(&format!("audio stream error: {}", e));
    };

    let format = device.default_input_config().map_err(audio_err)?.sample_format();
    let _ = crate::log_debug!(logger, "input sample format {:?}, {} channels", format, channels);

    let stream = match format {
        cpal::SampleFormat::F32 =>
            device.build_input_stream(
                config,
                move |data: &[f32], _| on_audio_input_mono(data, channels, &tx),
                err_fn,
                None
            ),
        cpal::SampleFormat::I16 =>
            device.build_input_stream(
                config,
                move |data: &[i16], _| {
                    let tmp: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32) / 32768.0)
                        .collect();
                    on_audio_input_mono(&tmp, channels, &tx);
                },
                err_fn,
                None
            ),
        cpal::SampleFormat::U16 =>
            device.build_input_stream(
                config,
                move |data: &[u16], _| {
                    let tmp: Vec<f32> = data
                        .iter()
                        .map(|&s| ((s as f32) / 65535.0) * 2.0 - 1.0)
                        .collect();
                    on_audio_input_mono(&tmp, channels, &tx);
                },
                err_fn,
                None
            ),
        other => {
            return Err(Error::Audio(format!("unsupported sample format {:?}", other)));
        }
    };
    stream.map_err(audio_err)
}

fn on_audio_input_mono(data: &[f32], channels: usize, tx: &Sender<Vec<f32>>) {
    let _ = tx.send(downmix(data, channels));
}

/// `want` if some input configuration of `device` covers it.
pub fn maybe_rate_supported(device: &cpal::Device, want: u32) -> Option<u32> {
    let configs = device.supported_input_configs().ok()?;
    for c in configs {
        let r = c.min_sample_rate().0..=c.max_sample_rate().0;
        if r.contains(&want) {
            return Some(want);
        }
    }
    None
}
