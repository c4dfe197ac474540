use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use derive_builder::Builder;
use parking_lot::{Mutex, RwLock};

use crate::{SynthesisEngine, SynthesisResult};

use super::audio::{self, AudioFormat, PackagedAudio};
use super::catalog::{CatalogEntry, Voice, VoiceCatalog};
use super::config::PiperConfig;
use super::encoder;
use super::model::{
    ErrorKind, InferenceBackend, InferenceEngine, PiperError, SynthesisScales,
    DEFAULT_LENGTH_SCALE, DEFAULT_NOISE_SCALE, DEFAULT_NOISE_W_SCALE, MAX_RATE, MIN_RATE,
};
use super::phonemizer::Phonemizer;
use super::segmenter;

const NO_VOICES_GUIDANCE: &str = "Download voice models from \
https://huggingface.co/rhasspy/piper-voices, extract them so the layout is \
<lang>/<locale>/<voice>/<quality>/<locale>-<voice>-<quality>.onnx (with the \
matching .onnx.json next to each model), and point the voices path at the \
extracted directory. Some models carry non-free licenses; check each model \
before commercial use.";

/// Parameters for a single synthesis request.
#[derive(Debug, Clone, Builder)]
#[builder(default, setter(into))]
pub struct PiperInferenceParams {
    /// Speaker name for multi-speaker voices. `None` picks the lowest id.
    #[builder(setter(into, strip_option))]
    pub speaker: Option<String>,
    /// Speech rate multiplier, clamped to 0.1–3.0. Higher is faster.
    pub rate: f32,
    /// Accepted for API parity; Piper models have no pitch control.
    pub pitch: f32,
    pub length_scale: f32,
    pub noise_scale: f32,
    pub noise_w_scale: f32,
    pub output_format: AudioFormat,
}

impl Default for PiperInferenceParams {
    fn default() -> Self {
        Self {
            speaker: None,
            rate: 1.0,
            pitch: 1.0,
            length_scale: DEFAULT_LENGTH_SCALE,
            noise_scale: DEFAULT_NOISE_SCALE,
            noise_w_scale: DEFAULT_NOISE_W_SCALE,
            output_format: AudioFormat::Wav,
        }
    }
}

/// Parameters for [`SynthesisEngine::load_model_with_params`].
#[derive(Debug, Clone)]
pub struct PiperModelParams {
    /// Load the inference session immediately instead of on first use.
    pub preload: bool,
}

impl Default for PiperModelParams {
    fn default() -> Self {
        Self { preload: true }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Voice,
    pub params: PiperInferenceParams,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
            params: PiperInferenceParams::default(),
        }
    }

    pub fn with_params(mut self, params: PiperInferenceParams) -> Self {
        self.params = params;
        self
    }
}

/// A finished synthesis, ready for a playback collaborator.
#[derive(Debug)]
pub struct Synthesized {
    pub result: SynthesisResult,
    pub audio: PackagedAudio,
    pub voice: Voice,
    pub speaker_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynthesisState {
    Idle,
    Synthesizing,
    /// Reported as an event only; the engine is back to `Idle` right after.
    Ready,
    /// Reported as an event only; the engine is back to `Idle` right after.
    Failed,
}

#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    StateChanged {
        state: SynthesisState,
    },
    Finished {
        voice: String,
        samples: usize,
        sample_rate: u32,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    /// Emitted at most once per distinct search path list.
    NoVoicesInstalled {
        search_paths: Vec<PathBuf>,
        guidance: String,
    },
}

/// Receives engine notifications. Called from the synthesis worker thread.
pub trait SynthesisEventSink: Send + Sync {
    fn on_event(&self, event: SynthesisEvent);
}

pub struct NoopEventSink;
impl SynthesisEventSink for NoopEventSink {
    fn on_event(&self, _event: SynthesisEvent) {}
}

pub struct LogEventSink;
impl SynthesisEventSink for LogEventSink {
    fn on_event(&self, event: SynthesisEvent) {
        match &event {
            SynthesisEvent::StateChanged { state } => log::debug!("[Piper] State: {:?}", state),
            SynthesisEvent::Finished {
                voice,
                samples,
                sample_rate,
            } => log::info!(
                "[Piper] Synthesized {} samples at {} Hz with {}",
                samples,
                sample_rate,
                voice
            ),
            SynthesisEvent::Failed { kind, message } => {
                log::error!("[Piper] {:?}: {}", kind, message)
            }
            SynthesisEvent::NoVoicesInstalled {
                search_paths,
                guidance,
            } => log::warn!(
                "[Piper] No voice models found in {:?}. {}",
                search_paths,
                guidance
            ),
        }
    }
}

/// Shared flag checked by the worker between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<(), PiperError> {
        if self.is_cancelled() {
            return Err(PiperError::Cancelled);
        }
        Ok(())
    }
}

/// In-flight synthesis started by [`PiperEngine::synthesize`].
pub struct SynthesisHandle {
    receiver: mpsc::Receiver<Result<Synthesized, PiperError>>,
    cancel: CancellationToken,
    taken: Cell<bool>,
}

impl SynthesisHandle {
    /// Block until the worker reports.
    ///
    /// Returns `WorkerDisconnected` if `try_wait` already took the result.
    pub fn wait(self) -> Result<Synthesized, PiperError> {
        self.receiver
            .recv()
            .unwrap_or(Err(PiperError::WorkerDisconnected))
    }

    /// Poll for the result.
    ///
    /// Yields `Some` exactly once; `None` before the worker finishes and on
    /// every poll after the result was taken.
    pub fn try_wait(&self) -> Option<Result<Synthesized, PiperError>> {
        if self.taken.get() {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(PiperError::WorkerDisconnected),
        };
        self.taken.set(true);
        Some(result)
    }

    /// Ask the worker to stop at its next checkpoint. No audio is produced.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct LoadedSession {
    model_path: PathBuf,
    engine: Box<dyn InferenceEngine>,
}

struct Shared {
    config: RwLock<PiperConfig>,
    catalog: RwLock<Arc<VoiceCatalog>>,
    // Lock order: session before catalog.
    session: Mutex<Option<LoadedSession>>,
    state: Mutex<SynthesisState>,
    advised: Mutex<HashSet<Vec<PathBuf>>>,
    phonemizer: Arc<dyn Phonemizer>,
    backend: Arc<dyn InferenceBackend>,
    events: Arc<dyn SynthesisEventSink>,
}

impl Shared {
    fn emit_state(&self, state: SynthesisState) {
        self.events.on_event(SynthesisEvent::StateChanged { state });
    }

    fn begin(&self) -> Result<(), PiperError> {
        {
            let mut state = self.state.lock();
            if *state == SynthesisState::Synthesizing {
                return Err(PiperError::Busy);
            }
            *state = SynthesisState::Synthesizing;
        }
        self.emit_state(SynthesisState::Synthesizing);
        Ok(())
    }

    fn reset_idle(&self) {
        *self.state.lock() = SynthesisState::Idle;
        self.emit_state(SynthesisState::Idle);
    }

    fn reinitialize(&self) -> Result<usize, PiperError> {
        let search_paths = self.config.read().search_paths();
        let catalog = Arc::new(VoiceCatalog::discover(&search_paths));

        {
            let mut session = self.session.lock();
            let stale = session
                .as_ref()
                .is_some_and(|loaded| !catalog.contains_model(&loaded.model_path));
            if stale {
                log::info!("Loaded voice was removed, dropping its inference session");
                *session = None;
            }
            *self.catalog.write() = Arc::clone(&catalog);
        }

        if catalog.is_empty() {
            self.advise_no_voices(&search_paths);
            return Err(PiperError::NoVoicesInstalled { search_paths });
        }
        Ok(catalog.len())
    }

    fn advise_no_voices(&self, search_paths: &[PathBuf]) {
        if !self.advised.lock().insert(search_paths.to_vec()) {
            return;
        }
        self.events.on_event(SynthesisEvent::NoVoicesInstalled {
            search_paths: search_paths.to_vec(),
            guidance: NO_VOICES_GUIDANCE.to_string(),
        });
    }

    fn resolve_entry(&self, voice: &Voice) -> Result<CatalogEntry, PiperError> {
        let catalog = Arc::clone(&*self.catalog.read());
        if catalog.is_empty() {
            return Err(PiperError::NoVoicesInstalled {
                search_paths: catalog.search_paths().to_vec(),
            });
        }
        catalog
            .get(voice)
            .cloned()
            .ok_or_else(|| PiperError::VoiceUnavailable(voice.display_name.clone()))
    }

    /// Make sure `session` holds the model for `entry`, replacing any other.
    fn ensure_loaded(
        &self,
        session: &mut Option<LoadedSession>,
        entry: &CatalogEntry,
    ) -> Result<(), PiperError> {
        // The catalog may have been swapped after `entry` was resolved.
        if !self.catalog.read().contains_model(&entry.voice.model_path) {
            return Err(PiperError::VoiceUnavailable(entry.voice.display_name.clone()));
        }

        let current = session
            .as_ref()
            .is_some_and(|loaded| loaded.model_path == entry.voice.model_path);
        if current {
            return Ok(());
        }

        *session = None;
        log::info!("Loading Piper model from {}", entry.voice.model_path.display());
        let engine = self.backend.load(&entry.manifest)?;
        *session = Some(LoadedSession {
            model_path: entry.voice.model_path.clone(),
            engine,
        });
        Ok(())
    }

    fn infer(
        &self,
        entry: &CatalogEntry,
        ids: &[i64],
        scales: SynthesisScales,
        speaker_id: Option<i64>,
    ) -> Result<Vec<f32>, PiperError> {
        let mut session = self.session.lock();
        self.ensure_loaded(&mut session, entry)?;
        let Some(loaded) = session.as_mut() else {
            return Err(PiperError::InferenceFailure(
                "no inference session loaded".to_string(),
            ));
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            loaded.engine.infer(ids, scales, speaker_id)
        }));
        let samples = match outcome {
            Ok(result) => result?,
            Err(payload) => {
                // The session may be left half-updated; load it fresh next time.
                *session = None;
                return Err(PiperError::InferenceFailure(format!(
                    "inference backend panicked: {}",
                    panic_message(payload.as_ref())
                )));
            }
        };
        if samples.is_empty() {
            return Err(PiperError::InferenceFailure(
                "model produced no audio".to_string(),
            ));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(PiperError::InferenceFailure(
                "model produced non-finite samples".to_string(),
            ));
        }
        log::debug!("Inference produced {} samples", samples.len());
        Ok(samples)
    }

    fn run(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Synthesized, PiperError> {
        let params = &request.params;
        let entry = self.resolve_entry(&request.voice)?;
        let manifest = Arc::clone(&entry.manifest);
        let speaker_id = manifest.resolve_speaker(params.speaker.as_deref())?;

        let pitch = params.pitch.clamp(MIN_RATE, MAX_RATE);
        if (pitch - 1.0).abs() > f32::EPSILON {
            log::debug!("Pitch {pitch} ignored: Piper models have no pitch input");
        }

        cancel.checkpoint()?;
        let clauses = self
            .phonemizer
            .phonemize(&request.text, &manifest.phonemizer_voice)?;

        cancel.checkpoint()?;
        let sentences = segmenter::segment(&clauses);
        log::debug!("Phonemized into {} sentence(s)", sentences.len());

        cancel.checkpoint()?;
        let ids = encoder::encode(&sentences, &manifest.phoneme_id_map)?;

        cancel.checkpoint()?;
        let scales = SynthesisScales::from_params(params);
        let samples = self.infer(&entry, &ids, scales, speaker_id)?;

        cancel.checkpoint()?;
        let audio = audio::package(&samples, manifest.sample_rate, 1, params.output_format)?;

        Ok(Synthesized {
            result: SynthesisResult {
                samples,
                sample_rate: manifest.sample_rate,
            },
            audio,
            voice: entry.voice,
            speaker_id,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Returns the engine to `Idle` even if the worker unwinds.
struct StateGuard<'a> {
    shared: &'a Shared,
    finished: bool,
}

impl StateGuard<'_> {
    fn finish(mut self, outcome: &Result<Synthesized, PiperError>) {
        match outcome {
            Ok(done) => {
                self.shared.events.on_event(SynthesisEvent::Finished {
                    voice: done.voice.display_name.clone(),
                    samples: done.result.samples.len(),
                    sample_rate: done.result.sample_rate,
                });
                self.shared.emit_state(SynthesisState::Ready);
            }
            Err(PiperError::Cancelled) => log::debug!("Synthesis cancelled"),
            Err(e) => {
                self.shared.events.on_event(SynthesisEvent::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                self.shared.emit_state(SynthesisState::Failed);
            }
        }
        self.finished = true;
        self.shared.reset_idle();
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.reset_idle();
        }
    }
}

/// Piper text-to-speech engine.
///
/// Owns the voice catalog and the single active inference session, and runs
/// each request on a background worker thread. One request at a time; a
/// second call while one is running returns [`PiperError::Busy`].
///
/// # Quick Start
///
/// ```rust,no_run
/// # #[cfg(feature = "onnx")] {
/// use piper_tts::engines::piper::{PiperConfig, PiperEngine, SynthesisRequest};
///
/// let engine = PiperEngine::with_espeak_ort(PiperConfig::with_voices_path("/opt/piper-voices"));
/// let voice = engine.find_voices("en").into_iter().next().expect("no English voice");
/// let done = engine.synthesize_blocking(SynthesisRequest::new("Hello world.", voice))?;
/// std::fs::write("hello.wav", &done.audio.bytes)?;
/// # }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PiperEngine {
    shared: Arc<Shared>,
    selected: Option<Voice>,
}

impl PiperEngine {
    /// Create an engine and scan the configured voice paths.
    ///
    /// An empty scan is not an error here; it is reported once through
    /// `events` and again by every `synthesize` call.
    pub fn new(
        config: PiperConfig,
        phonemizer: Arc<dyn Phonemizer>,
        backend: Arc<dyn InferenceBackend>,
        events: Arc<dyn SynthesisEventSink>,
    ) -> Self {
        let shared = Arc::new(Shared {
            config: RwLock::new(config),
            catalog: RwLock::new(Arc::new(VoiceCatalog::default())),
            session: Mutex::new(None),
            state: Mutex::new(SynthesisState::Idle),
            advised: Mutex::new(HashSet::new()),
            phonemizer,
            backend,
            events,
        });
        if let Err(e) = shared.reinitialize() {
            log::warn!("{e}");
        }
        Self {
            shared,
            selected: None,
        }
    }

    /// espeak-ng phonemizer, ONNX Runtime inference, log-based events.
    #[cfg(feature = "onnx")]
    pub fn with_espeak_ort(config: PiperConfig) -> Self {
        Self::new(
            config,
            Arc::new(super::phonemizer::EspeakPhonemizer::default()),
            Arc::new(super::onnx::OrtBackend::default()),
            Arc::new(LogEventSink),
        )
    }

    pub fn config(&self) -> PiperConfig {
        self.shared.config.read().clone()
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<VoiceCatalog> {
        Arc::clone(&*self.shared.catalog.read())
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.catalog().voices()
    }

    pub fn find_voices(&self, language: &str) -> Vec<Voice> {
        self.catalog().find_voices(language)
    }

    pub fn available_languages(&self) -> Vec<String> {
        self.catalog().available_languages()
    }

    pub fn speakers(&self, voice: &Voice) -> Result<Vec<String>, PiperError> {
        self.catalog()
            .speakers(voice)
            .ok_or_else(|| PiperError::VoiceUnavailable(voice.display_name.clone()))
    }

    /// Rescan all search paths and swap in a fresh catalog.
    ///
    /// Drops the active session if its model disappeared. Waits for any
    /// in-flight inference to finish first.
    pub fn reinitialize(&self) -> Result<usize, PiperError> {
        self.shared.reinitialize()
    }

    /// Change the user voices directory and rescan.
    pub fn set_voices_path(&self, path: Option<PathBuf>) -> Result<usize, PiperError> {
        self.shared.config.write().voices_path = path;
        self.reinitialize()
    }

    /// `Idle` or `Synthesizing`.
    pub fn state(&self) -> SynthesisState {
        *self.shared.state.lock()
    }

    /// Drop the active inference session.
    pub fn unload(&self) {
        *self.shared.session.lock() = None;
    }

    pub fn selected_voice(&self) -> Option<&Voice> {
        self.selected.as_ref()
    }

    /// Start synthesizing on a worker thread.
    ///
    /// Fails immediately with `EmptyInput` or `Busy` without touching the
    /// engine state. Every other error arrives through the handle.
    pub fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisHandle, PiperError> {
        if request.text.trim().is_empty() {
            return Err(PiperError::EmptyInput);
        }
        self.shared.begin()?;

        let (sender, receiver) = mpsc::channel();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name("piper-synthesis".to_string())
            .spawn(move || {
                let guard = StateGuard {
                    shared: &shared,
                    finished: false,
                };
                let outcome = shared.run(&request, &worker_cancel);
                guard.finish(&outcome);
                // The caller may have dropped the handle.
                let _ = sender.send(outcome);
            });

        if let Err(e) = spawned {
            self.shared.reset_idle();
            return Err(PiperError::Io(e));
        }

        Ok(SynthesisHandle {
            receiver,
            cancel,
            taken: Cell::new(false),
        })
    }

    pub fn synthesize_blocking(&self, request: SynthesisRequest) -> Result<Synthesized, PiperError> {
        self.synthesize(request)?.wait()
    }
}

impl SynthesisEngine for PiperEngine {
    type SynthesisParams = PiperInferenceParams;
    type ModelParams = PiperModelParams;

    /// Select the catalogued voice at `model_path`, or the first voice below
    /// it when it is a directory.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = self.catalog();
        let dir = std::fs::canonicalize(model_path).unwrap_or_else(|_| model_path.to_path_buf());
        let entry = catalog
            .by_model_path(model_path)
            .or_else(|| {
                catalog
                    .entries()
                    .iter()
                    .find(|e| e.voice.model_path.starts_with(&dir))
            })
            .ok_or_else(|| PiperError::VoiceUnavailable(model_path.display().to_string()))?;

        if params.preload {
            let mut session = self.shared.session.lock();
            self.shared.ensure_loaded(&mut session, entry)?;
        }
        self.selected = Some(entry.voice.clone());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.unload();
        self.selected = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, Box<dyn std::error::Error>> {
        let voice = self.selected.clone().ok_or(PiperError::ModelNotLoaded)?;
        let request = SynthesisRequest::new(text, voice).with_params(params.unwrap_or_default());
        Ok(self.synthesize_blocking(request)?.result)
    }
}
