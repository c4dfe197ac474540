use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::manifest::VoiceManifest;
use super::model::{InferenceBackend, InferenceEngine, PiperError, SynthesisScales};

/// Loads Piper voices into ONNX Runtime sessions on the CPU provider.
#[derive(Debug, Clone, Default)]
pub struct OrtBackend {
    /// Intra- and inter-op thread count. `None` lets ORT decide.
    pub num_threads: Option<usize>,
    /// Directory for optimized graphs, one file per model. The first load
    /// writes the graph; later loads skip optimization.
    pub optimized_model_cache_dir: Option<PathBuf>,
}

impl OrtBackend {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }

    fn cache_path_for(&self, model_path: &Path) -> Option<PathBuf> {
        let dir = self.optimized_model_cache_dir.as_ref()?;
        let stem = model_path.file_stem()?;
        let mut name = stem.to_os_string();
        name.push(".optimized.onnx");
        Some(dir.join(name))
    }
}

impl InferenceBackend for OrtBackend {
    fn load(&self, manifest: &VoiceManifest) -> Result<Box<dyn InferenceEngine>, PiperError> {
        let cache = self.cache_path_for(&manifest.model_path);
        let session = init_session(&manifest.model_path, self.num_threads, cache.as_deref())
            .map_err(|e| PiperError::ModelLoadFailure {
                path: manifest.model_path.clone(),
                reason: e.to_string(),
            })?;

        log::info!(
            "Loaded {} ({} Hz, {} speaker(s))",
            manifest.model_path.display(),
            manifest.sample_rate,
            manifest.num_speakers
        );

        Ok(Box::new(OrtSession {
            session,
            multi_speaker: manifest.is_multi_speaker(),
        }))
    }
}

/// One loaded Piper model.
pub struct OrtSession {
    session: Session,
    multi_speaker: bool,
}

impl OrtSession {
    fn run(
        &mut self,
        ids: &[i64],
        scales: SynthesisScales,
        speaker_id: Option<i64>,
    ) -> Result<Vec<f32>, PiperError> {
        let tokens = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
        let lengths = ndarray::arr1(&[ids.len() as i64]);
        let scales = ndarray::arr1(&scales.as_array());

        // Single-speaker graphs have no "sid" input at all.
        let sid = if self.multi_speaker {
            Some(speaker_id.unwrap_or(0))
        } else {
            None
        };

        let output = if let Some(sid) = sid {
            let sid_arr = ndarray::arr1(&[sid]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(tokens.view())?,
                "input_lengths" => TensorRef::from_array_view(lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
                "sid" => TensorRef::from_array_view(sid_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(tokens.view())?,
                "input_lengths" => TensorRef::from_array_view(lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ];
            self.session.run(inputs)?
        };

        // Output is [1, 1, 1, samples]; flatten whatever the rank.
        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| PiperError::InferenceFailure("no output from model".to_string()))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

impl InferenceEngine for OrtSession {
    fn infer(
        &mut self,
        ids: &[i64],
        scales: SynthesisScales,
        speaker_id: Option<i64>,
    ) -> Result<Vec<f32>, PiperError> {
        self.run(ids, scales, speaker_id).map_err(|e| match e {
            e @ (PiperError::Ort(_) | PiperError::Shape(_)) => {
                PiperError::InferenceFailure(e.to_string())
            }
            other => other,
        })
    }
}

fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, PiperError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Piper graph from {:?}", cache);
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load: running Level3 optimization; saving graph to {:?}",
                cache
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(cache) = write_cache {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}
