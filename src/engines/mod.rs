//! Speech synthesis engines.
//!
//! This module contains implementations of text-to-speech engines.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `piper` - Piper voices (espeak-ng required); add `onnx` for ONNX Runtime inference

#[cfg(feature = "piper")]
pub mod piper;
