//! Piper text-to-speech engine implementation.
//!
//! This module discovers locally installed Piper voices (VITS models exported
//! to ONNX with a `.onnx.json` manifest), converts text to phonemes with
//! espeak-ng, maps the phonemes to model ids and runs inference on a worker
//! thread. Output is packaged as float WAV or raw PCM.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! Inference needs the `onnx` feature, which pulls in ONNX Runtime.
//!
//! # Voice Directory Layout
//!
//! ```text
//! piper-voices/
//! └── en/
//!     └── en_US/
//!         └── lessac/
//!             └── medium/
//!                 ├── en_US-lessac-medium.onnx
//!                 └── en_US-lessac-medium.onnx.json
//! ```
//!
//! Search roots are, in order: the configured voices path,
//! `/usr/share/piper-voices`, `/usr/local/share/piper-voices`,
//! `~/.local/share/piper-voices` and `./piper-voices`. Voices are available at
//! <https://huggingface.co/rhasspy/piper-voices>.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")] {
//! use piper_tts::engines::piper::{PiperConfig, PiperEngine, SynthesisRequest};
//!
//! let engine = PiperEngine::with_espeak_ort(PiperConfig::from_env());
//! for voice in engine.voices() {
//!     println!("{} [{}]", voice.display_name, voice.language);
//! }
//!
//! let voice = engine.voices().into_iter().next().expect("no voices installed");
//! let done = engine.synthesize_blocking(SynthesisRequest::new("Hello, world!", voice))?;
//! done.result.write_wav(std::path::Path::new("hello.wav"))?;
//! # }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Speaker, Rate and Raw Output
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")] {
//! use piper_tts::engines::piper::{
//!     AudioFormat, PiperConfig, PiperEngine, PiperInferenceParamsBuilder, SynthesisRequest,
//! };
//!
//! let engine = PiperEngine::with_espeak_ort(PiperConfig::default());
//! let voice = engine.find_voices("en").into_iter().next().expect("no English voice");
//!
//! let params = PiperInferenceParamsBuilder::default()
//!     .rate(1.25f32)
//!     .output_format(AudioFormat::RawPcm)
//!     .build()?;
//!
//! let handle = engine.synthesize(SynthesisRequest::new("Faster, please.", voice).with_params(params))?;
//! let done = handle.wait()?;
//! println!("{} bytes of PCM at {} Hz", done.audio.bytes.len(), done.audio.sample_rate);
//! # }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod catalog;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod manifest;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod phonemizer;
pub mod segmenter;

pub use audio::{AudioFormat, PackagedAudio};
pub use catalog::{Voice, VoiceCatalog};
pub use config::PiperConfig;
pub use engine::{
    CancellationToken, LogEventSink, NoopEventSink, PiperEngine, PiperInferenceParams,
    PiperInferenceParamsBuilder, PiperModelParams, SynthesisEvent, SynthesisEventSink,
    SynthesisHandle, SynthesisRequest, SynthesisState, Synthesized,
};
pub use manifest::VoiceManifest;
pub use model::{ErrorKind, InferenceBackend, InferenceEngine, PiperError, SynthesisScales};
#[cfg(feature = "onnx")]
pub use onnx::{OrtBackend, OrtSession};
pub use phonemizer::{ClauseTerminator, EspeakPhonemizer, PhonemeClause, Phonemizer};
