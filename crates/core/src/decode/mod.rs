use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode";

/// Mono PCM in `[-1.0, 1.0]` at the source's native sample rate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DecodeError::MissingSampleRate);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised audio container: {0}")]
    Probe(String),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("audio stream reports no sample rate")]
    MissingSampleRate,

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio stream contains no samples")]
    Empty,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait AudioDecoder: Send + Sync {
    fn decode_file(&self, path: &Path) -> Result<Waveform>;

    /// Decodes an in-memory buffer. `name` is only used as a format hint.
    fn decode_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Waveform>;
}

/// Decodes any container/codec pair enabled in symphonia and downmixes to mono.
#[derive(Clone, Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_source(
        &self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<Waveform> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Probe(e.to_string()))?;

        let mut format = probed.format;
        let track = format.default_track().ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut sample_rate = codec_params.sample_rate;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedCodec(e.to_string()))?;

        let mut mono = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut buf_frames = 0usize;
        let mut buf_channels = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Stream(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Stream(e.to_string())),
            };

            let spec = *decoded.spec();
            if sample_rate.is_none() {
                sample_rate = Some(spec.rate);
            }
            let channels = spec.channels.count();
            let frames = decoded.capacity();
            if sample_buf.is_none() || frames > buf_frames || channels != buf_channels {
                sample_buf = Some(SampleBuffer::<f32>::new(frames as u64, spec));
                buf_frames = frames;
                buf_channels = channels;
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);
            mono.extend(downmix_interleaved(buf.samples(), channels));
        }

        let sample_rate = sample_rate.ok_or(DecodeError::MissingSampleRate)?;
        if mono.is_empty() {
            return Err(DecodeError::Empty);
        }

        tracing::debug!(
            target: LOG_TARGET,
            samples = mono.len(),
            sample_rate,
            "decoded audio"
        );

        Waveform::new(mono, sample_rate)
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_file(&self, path: &Path) -> Result<Waveform> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str());
        self.decode_source(Box::new(file), ext)
    }

    fn decode_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Waveform> {
        let ext = Path::new(name).extension().and_then(|e| e.to_str());
        self.decode_source(Box::new(Cursor::new(bytes)), ext)
    }
}

/// Averages each interleaved frame into one mono sample.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0f32 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
