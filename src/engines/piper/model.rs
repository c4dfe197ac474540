use std::path::PathBuf;

use super::engine::PiperInferenceParams;
use super::manifest::VoiceManifest;

/// Default `length_scale` (phoneme duration multiplier).
pub const DEFAULT_LENGTH_SCALE: f32 = 1.0;

/// Default `noise_scale` (generator noise).
pub const DEFAULT_NOISE_SCALE: f32 = 0.667;

/// Default `noise_w_scale` (phoneme width noise).
pub const DEFAULT_NOISE_W_SCALE: f32 = 0.8;

/// Lower bound applied to the caller's rate multiplier.
pub const MIN_RATE: f32 = 0.1;

/// Upper bound applied to the caller's rate multiplier.
pub const MAX_RATE: f32 = 3.0;

#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error(
        "No Piper voice models found in {}. Download voices from \
         https://huggingface.co/rhasspy/piper-voices and set the voices path.",
        display_paths(.search_paths)
    )]
    NoVoicesInstalled { search_paths: Vec<PathBuf> },
    #[error("Voice '{0}' is no longer available. Reinitialize and pick another voice.")]
    VoiceUnavailable(String),
    #[error("No voice selected. Call load_model() first.")]
    ModelNotLoaded,
    #[error("Failed to load model {}: {reason}", .path.display())]
    ModelLoadFailure { path: PathBuf, reason: String },
    #[error("Invalid voice manifest {}: {reason}", .path.display())]
    ManifestParseFailure { path: PathBuf, reason: String },
    #[error("Input text is empty")]
    EmptyInput,
    #[error("No phonemes produced for the input text")]
    NoPhonemesProduced,
    #[error("Speaker '{speaker}' not found. Available speakers: {}", .available.join(", "))]
    UnknownSpeaker {
        speaker: String,
        available: Vec<String>,
    },
    #[error("Inference failed: {0}")]
    InferenceFailure(String),
    #[error("A synthesis request is already in progress")]
    Busy,
    #[error("Synthesis cancelled")]
    Cancelled,
    #[error("Synthesis worker exited without a result")]
    WorkerDisconnected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Fieldless view of [`PiperError`] for hosts that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoVoicesInstalled,
    VoiceUnavailable,
    ModelLoadFailure,
    ManifestParseFailure,
    EmptyInput,
    NoPhonemesProduced,
    UnknownSpeaker,
    InferenceFailure,
    Busy,
    Cancelled,
    Internal,
}

impl PiperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PiperError::NoVoicesInstalled { .. } => ErrorKind::NoVoicesInstalled,
            PiperError::VoiceUnavailable(_) | PiperError::ModelNotLoaded => {
                ErrorKind::VoiceUnavailable
            }
            PiperError::ModelLoadFailure { .. } => ErrorKind::ModelLoadFailure,
            PiperError::ManifestParseFailure { .. } => ErrorKind::ManifestParseFailure,
            PiperError::EmptyInput => ErrorKind::EmptyInput,
            PiperError::NoPhonemesProduced => ErrorKind::NoPhonemesProduced,
            PiperError::UnknownSpeaker { .. } => ErrorKind::UnknownSpeaker,
            PiperError::InferenceFailure(_) => ErrorKind::InferenceFailure,
            PiperError::Busy => ErrorKind::Busy,
            PiperError::Cancelled => ErrorKind::Cancelled,
            #[cfg(feature = "onnx")]
            PiperError::Ort(_) | PiperError::Shape(_) => ErrorKind::InferenceFailure,
            PiperError::WorkerDisconnected
            | PiperError::Io(_)
            | PiperError::EspeakNotFound
            | PiperError::PhonemizerFailed(_)
            | PiperError::Config(_) => ErrorKind::Internal,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no search paths configured)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Synthesis-control scalars, in the order the model expects them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisScales {
    pub noise_scale: f32,
    /// Effective length scale, already divided by the clamped rate.
    pub length_scale: f32,
    pub noise_w_scale: f32,
}

impl Default for SynthesisScales {
    fn default() -> Self {
        Self {
            noise_scale: DEFAULT_NOISE_SCALE,
            length_scale: DEFAULT_LENGTH_SCALE,
            noise_w_scale: DEFAULT_NOISE_W_SCALE,
        }
    }
}

impl SynthesisScales {
    /// Fold the caller's rate into the length scale.
    ///
    /// A higher rate gives shorter audio. The rate is clamped to
    /// `[MIN_RATE, MAX_RATE]`. A non-positive or non-finite length scale, or
    /// a negative or non-finite noise scale, falls back to its default.
    pub fn from_params(params: &PiperInferenceParams) -> Self {
        let rate = clamp_rate(params.rate);
        let length_scale = sanitize("length_scale", params.length_scale, DEFAULT_LENGTH_SCALE, |v| {
            v > 0.0
        });
        Self {
            noise_scale: sanitize("noise_scale", params.noise_scale, DEFAULT_NOISE_SCALE, |v| {
                v >= 0.0
            }),
            length_scale: length_scale / rate,
            noise_w_scale: sanitize(
                "noise_w_scale",
                params.noise_w_scale,
                DEFAULT_NOISE_W_SCALE,
                |v| v >= 0.0,
            ),
        }
    }

    /// `[noise_scale, length_scale, noise_w_scale]`
    pub fn as_array(&self) -> [f32; 3] {
        [self.noise_scale, self.length_scale, self.noise_w_scale]
    }
}

fn sanitize(name: &str, value: f32, default: f32, valid: impl Fn(f32) -> bool) -> f32 {
    if value.is_finite() && valid(value) {
        return value;
    }
    log::warn!("Ignoring {name} {value}, using default {default}");
    default
}

pub(crate) fn clamp_rate(rate: f32) -> f32 {
    if rate.is_nan() {
        return 1.0;
    }
    rate.clamp(MIN_RATE, MAX_RATE)
}

/// A loaded acoustic model that turns phoneme ids into samples.
///
/// Sessions are not assumed reentrant; callers serialize access.
pub trait InferenceEngine: Send {
    /// Run the model on one id sequence.
    ///
    /// `speaker_id` is `Some` only for multi-speaker voices.
    fn infer(
        &mut self,
        ids: &[i64],
        scales: SynthesisScales,
        speaker_id: Option<i64>,
    ) -> Result<Vec<f32>, PiperError>;
}

/// Creates [`InferenceEngine`] sessions for voice manifests.
pub trait InferenceBackend: Send + Sync {
    fn load(&self, manifest: &VoiceManifest) -> Result<Box<dyn InferenceEngine>, PiperError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scales_match_piper_defaults() {
        let scales = SynthesisScales::from_params(&PiperInferenceParams::default());
        assert_eq!(scales.as_array(), [0.667, 1.0, 0.8]);
    }

    #[test]
    fn rate_divides_length_scale() {
        let params = PiperInferenceParams {
            rate: 2.0,
            ..Default::default()
        };
        let scales = SynthesisScales::from_params(&params);
        assert!((scales.length_scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn pathological_rates_are_clamped() {
        for rate in [0.0, -4.0, f32::NAN, 1e9] {
            let params = PiperInferenceParams {
                rate,
                ..Default::default()
            };
            let scales = SynthesisScales::from_params(&params);
            assert!(scales.length_scale.is_finite());
            assert!(scales.length_scale > 0.0, "rate {rate} gave {}", scales.length_scale);
        }
        assert_eq!(clamp_rate(0.0), MIN_RATE);
        assert_eq!(clamp_rate(10.0), MAX_RATE);
    }

    #[test]
    fn degenerate_scales_fall_back_to_defaults() {
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let params = PiperInferenceParams {
                length_scale: bad,
                noise_scale: if bad == 0.0 { -0.5 } else { bad },
                noise_w_scale: if bad == 0.0 { -0.5 } else { bad },
                ..Default::default()
            };
            let scales = SynthesisScales::from_params(&params);
            assert_eq!(scales, SynthesisScales::default(), "input {bad}");
        }

        let params = PiperInferenceParams {
            noise_scale: 0.0,
            length_scale: 1.5,
            ..Default::default()
        };
        let scales = SynthesisScales::from_params(&params);
        assert_eq!(scales.noise_scale, 0.0);
        assert!((scales.length_scale - 1.5).abs() < 1e-6);
    }

    #[test]
    fn error_kinds_cover_taxonomy() {
        assert_eq!(PiperError::Busy.kind(), ErrorKind::Busy);
        assert_eq!(
            PiperError::UnknownSpeaker {
                speaker: "jo".into(),
                available: vec!["amy".into()],
            }
            .kind(),
            ErrorKind::UnknownSpeaker
        );
        let msg = PiperError::NoVoicesInstalled {
            search_paths: vec![PathBuf::from("/usr/share/piper-voices")],
        }
        .to_string();
        assert!(msg.contains("/usr/share/piper-voices"));
    }
}
