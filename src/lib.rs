//! # piper-tts
//!
//! A Rust library for offline text-to-speech synthesis with Piper voice models.
//!
//! ## Features
//!
//! - **Voice Discovery**: Scan standard and user directories for installed Piper voices
//! - **espeak-ng Phonemization**: Clause-aware phonemization for the voice's language
//! - **Background Synthesis**: One request at a time on a worker thread, with cancellation
//! - **WAV or Raw PCM**: Package output for files or streaming playback
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-tts = { version = "2026.2", features = ["onnx"] }
//! ```
//!
//! ```ignore
//! use std::path::PathBuf;
//! use piper_tts::{engines::piper::{PiperConfig, PiperEngine}, SynthesisEngine};
//!
//! let mut engine = PiperEngine::with_espeak_ort(PiperConfig::default());
//! engine.load_model(&PathBuf::from("piper-voices/en/en_US/lessac/medium/en_US-lessac-medium.onnx"))?;
//!
//! let result = engine.synthesize("Hello, world!", None)?;
//! result.write_wav(&PathBuf::from("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;

use std::path::Path;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio, as declared by the voice manifest
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Package the samples as mono WAV bytes or raw PCM.
    #[cfg(feature = "piper")]
    pub fn package(
        &self,
        format: engines::piper::AudioFormat,
    ) -> Result<engines::piper::PackagedAudio, engines::piper::PiperError> {
        engines::piper::audio::package(&self.samples, self.sample_rate, 1, format)
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// This trait defines the standard operations that all synthesis engines must support.
/// Each engine may have different parameter types for model loading and inference configuration.
pub trait SynthesisEngine {
    /// Parameters for configuring inference behavior (speaker, rate, etc.)
    type SynthesisParams;
    /// Parameters for configuring model loading (preloading, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, Box<dyn std::error::Error>>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SynthesisResult::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.synthesize(text, params)?.write_wav(wav_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_rate() {
        let result = SynthesisResult {
            samples: vec![0.0; 11025],
            sample_rate: 22050,
        };
        assert!((result.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[cfg(feature = "piper")]
    #[test]
    fn package_matches_written_file() {
        use engines::piper::AudioFormat;

        let result = SynthesisResult {
            samples: vec![0.25, -0.25, 0.5],
            sample_rate: 16000,
        };
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.wav");
        result.write_wav(&path).unwrap();

        let packaged = result.package(AudioFormat::Wav).unwrap();
        let from_file: Vec<f32> = hound::WavReader::open(&path)
            .unwrap()
            .samples::<f32>()
            .map(|s| s.unwrap())
            .collect();
        let from_bytes: Vec<f32> = hound::WavReader::new(std::io::Cursor::new(packaged.bytes))
            .unwrap()
            .samples::<f32>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(from_file, from_bytes);
    }
}
