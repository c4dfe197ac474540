use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::model::PiperError;
use super::phonemizer::espeak_voice_for_locale;

/// Phoneme code point → one or more vocabulary ids.
pub type PhonemeIdMap = HashMap<char, Vec<i64>>;

/// Speaker name used for single-speaker voices.
pub const DEFAULT_SPEAKER: &str = "default";

/// Parsed per-voice metadata (`<voice>.onnx.json`).
#[derive(Debug, Clone)]
pub struct VoiceManifest {
    pub model_path: PathBuf,
    pub manifest_path: PathBuf,
    pub sample_rate: u32,
    /// Voice id passed to the phonemizer (e.g. `"en-us"`).
    pub phonemizer_voice: String,
    pub num_speakers: u32,
    pub speaker_id_map: BTreeMap<String, i64>,
    pub phoneme_id_map: PhonemeIdMap,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    audio: Option<RawAudio>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    espeak: Option<RawEspeak>,
    #[serde(default)]
    num_speakers: Option<u32>,
    #[serde(default)]
    speaker_id_map: BTreeMap<String, i64>,
    #[serde(default)]
    phoneme_id_map: Option<BTreeMap<String, Vec<i64>>>,
}

#[derive(Deserialize)]
struct RawAudio {
    #[serde(default)]
    sample_rate: Option<u32>,
}

#[derive(Deserialize)]
struct RawEspeak {
    #[serde(default)]
    voice: Option<String>,
}

/// Locate the manifest that belongs to a model file.
///
/// Piper ships `<name>.onnx.json`; a plain `<name>.json` is accepted too.
pub fn manifest_path_for(model_path: &Path) -> Option<PathBuf> {
    let mut appended = model_path.as_os_str().to_owned();
    appended.push(".json");
    let appended = PathBuf::from(appended);
    if appended.is_file() {
        return Some(appended);
    }

    let replaced = model_path.with_extension("json");
    if replaced.is_file() {
        return Some(replaced);
    }
    None
}

impl VoiceManifest {
    /// Read and validate a manifest from disk.
    pub fn load(model_path: &Path, manifest_path: &Path) -> Result<Self, PiperError> {
        let content =
            std::fs::read_to_string(manifest_path).map_err(|e| PiperError::ManifestParseFailure {
                path: manifest_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_json(model_path, manifest_path, &content)
    }

    /// Validate manifest JSON. `manifest_path` is only used for error messages.
    pub fn from_json(
        model_path: &Path,
        manifest_path: &Path,
        json: &str,
    ) -> Result<Self, PiperError> {
        let fail = |reason: String| PiperError::ManifestParseFailure {
            path: manifest_path.to_path_buf(),
            reason,
        };

        let raw: RawManifest =
            serde_json::from_str(json).map_err(|e| fail(format!("Failed to parse JSON: {e}")))?;

        let sample_rate = raw
            .audio
            .and_then(|a| a.sample_rate)
            .or(raw.sample_rate)
            .ok_or_else(|| fail("Missing 'audio.sample_rate'".to_string()))?;
        if sample_rate == 0 {
            return Err(fail("'sample_rate' must be positive".to_string()));
        }

        let num_speakers = raw.num_speakers.unwrap_or(1);
        if num_speakers == 0 {
            return Err(fail("'num_speakers' must be at least 1".to_string()));
        }

        let raw_map = raw
            .phoneme_id_map
            .ok_or_else(|| fail("Missing 'phoneme_id_map' field".to_string()))?;
        let mut phoneme_id_map = PhonemeIdMap::with_capacity(raw_map.len());
        for (key, ids) in raw_map {
            let mut chars = key.chars();
            let phoneme = match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(fail(format!(
                        "phoneme_id_map key {key:?} must be a single code point"
                    )))
                }
            };
            if ids.is_empty() {
                return Err(fail(format!("phoneme_id_map entry {key:?} has no ids")));
            }
            phoneme_id_map.insert(phoneme, ids);
        }

        let phonemizer_voice = raw
            .espeak
            .and_then(|e| e.voice)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                let locale = model_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.split('-').next())
                    .unwrap_or("");
                espeak_voice_for_locale(locale).to_string()
            });

        log::debug!(
            "Manifest {}: {} Hz, voice '{}', {} speaker(s), {} phonemes",
            manifest_path.display(),
            sample_rate,
            phonemizer_voice,
            num_speakers,
            phoneme_id_map.len()
        );

        Ok(Self {
            model_path: model_path.to_path_buf(),
            manifest_path: manifest_path.to_path_buf(),
            sample_rate,
            phonemizer_voice,
            num_speakers,
            speaker_id_map: raw.speaker_id_map,
            phoneme_id_map,
        })
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.num_speakers > 1
    }

    /// Speaker names ordered by id; `["default"]` for single-speaker voices.
    pub fn speaker_names(&self) -> Vec<String> {
        if self.speaker_id_map.is_empty() {
            return vec![DEFAULT_SPEAKER.to_string()];
        }
        let mut speakers: Vec<(&String, &i64)> = self.speaker_id_map.iter().collect();
        speakers.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        speakers.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// The speaker used when a request names none: the lowest id.
    pub fn default_speaker(&self) -> Option<(&str, i64)> {
        self.speaker_id_map
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(name, id)| (name.as_str(), *id))
    }

    /// Resolve a requested speaker to the id fed to the model.
    ///
    /// Returns `Ok(None)` for single-speaker voices, which take no speaker
    /// input.
    pub fn resolve_speaker(&self, speaker: Option<&str>) -> Result<Option<i64>, PiperError> {
        let unknown = |name: &str| PiperError::UnknownSpeaker {
            speaker: name.to_string(),
            available: self.speaker_names(),
        };

        if !self.is_multi_speaker() {
            return match speaker {
                Some(name)
                    if name != DEFAULT_SPEAKER && !self.speaker_id_map.contains_key(name) =>
                {
                    Err(unknown(name))
                }
                _ => Ok(None),
            };
        }

        match speaker {
            Some(name) => self
                .speaker_id_map
                .get(name)
                .map(|&id| Some(id))
                .ok_or_else(|| unknown(name)),
            None => Ok(Some(self.default_speaker().map(|(_, id)| id).unwrap_or(0))),
        }
    }
}
