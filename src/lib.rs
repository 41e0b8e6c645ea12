//! # qwen-tts-bridge
//!
//! A Rust library embedding a CPython interpreter to drive the Qwen3-TTS
//! speech-synthesis stack through a runner module.
//!
//! ## Features
//!
//! - **Dynamic embedding**: loads `libpython` at runtime, no link-time
//!   interpreter dependency
//! - **Three synthesis modes**: voice design, preset custom voices, and
//!   voice cloning from reference audio
//! - **Model fallback**: same-mode alternatives first, then cross-mode,
//!   with strict loads that refuse to substitute
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! qwen-tts-bridge = "0.1"
//! ```
//!
//! ```ignore
//! use qwen_tts_bridge::{QwenBridge, RuntimeConfiguration, SynthesisRequestBuilder};
//!
//! let config = RuntimeConfiguration::new(
//!     "/opt/python/lib/libpython3.12.so",
//!     "/opt/python",
//! )
//! .with_module_path("/opt/qwen-tts/runner");
//!
//! let bridge = QwenBridge::with_defaults();
//! bridge.initialize(&config)?;
//! bridge.import_module()?;
//!
//! let request = SynthesisRequestBuilder::default()
//!     .text("Hello, world!")
//!     .build()?;
//! let result = bridge.synthesize(&request)?;
//! result.write_wav(std::path::Path::new("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod request;

use std::io::Cursor;
use std::path::Path;

pub use bridge::{BridgeStatus, QwenBridge};
pub use config::{BridgeOptions, RuntimeConfiguration};
pub use error::{BridgeError, BridgeResult};
pub use models::{ModelIdentifier, ModelSelection, SynthesisMode};
pub use request::{SynthesisRequest, SynthesisRequestBuilder, SynthesisRequestBuilderError};

/// The result of a synthesis operation.
///
/// The runner returns a complete RIFF/WAVE container, kept here verbatim
/// alongside the sample rate that was requested.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Complete WAV file contents as produced by the runner.
    pub wav: Vec<u8>,
    /// Sample rate the synthesis was requested at.
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Quick check that the payload starts like a WAV container.
    pub fn is_wav(&self) -> bool {
        self.wav.len() >= 12 && &self.wav[..4] == b"RIFF" && &self.wav[8..12] == b"WAVE"
    }

    /// Write the container to disk byte-for-byte.
    pub fn write_wav(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.wav)
    }

    /// Decode the container into mono-interleaved f32 samples.
    pub fn samples(&self) -> Result<Vec<f32>, hound::Error> {
        let reader = hound::WavReader::new(Cursor::new(&self.wav))?;
        let spec = reader.spec();
        match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect()
            }
        }
    }

    /// Duration of the audio in seconds, per the container's own header.
    pub fn duration_secs(&self) -> f64 {
        match hound::WavReader::new(Cursor::new(&self.wav)) {
            Ok(reader) => f64::from(reader.duration()) / f64::from(reader.spec().sample_rate),
            Err(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_wav_signature_check() {
        let result = SynthesisResult {
            wav: sample_wav(&[0, 1, -1, 32767], 24_000),
            sample_rate: 24_000,
        };
        assert!(result.is_wav());

        let junk = SynthesisResult {
            wav: vec![0u8; 32],
            sample_rate: 24_000,
        };
        assert!(!junk.is_wav());
    }

    #[test]
    fn test_samples_decode_int16() {
        let result = SynthesisResult {
            wav: sample_wav(&[0, 16384, -16384], 24_000),
            sample_rate: 24_000,
        };
        let samples = result.samples().unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].abs() < f32::EPSILON);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!((samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_duration() {
        let result = SynthesisResult {
            wav: sample_wav(&[0; 12_000], 24_000),
            sample_rate: 24_000,
        };
        assert!((result.duration_secs() - 0.5).abs() < 1e-9);
    }
}
