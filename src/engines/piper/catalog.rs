use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::manifest::{manifest_path_for, VoiceManifest};

/// Model file extension searched for under each voice root.
pub const MODEL_EXTENSION: &str = "onnx";

/// A selectable voice, parsed from `<locale>-<name>-<quality>.onnx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voice {
    /// e.g. `"lessac (en_US, medium)"`
    pub display_name: String,
    /// BCP-47 style tag, e.g. `"en-US"`.
    pub language: String,
    pub locale: String,
    pub name: String,
    pub quality: String,
    pub model_path: PathBuf,
}

impl Voice {
    /// Parse voice metadata from a model path. `None` if the file name does
    /// not follow `<locale>-<name>-<quality>`.
    pub fn from_model_path(model_path: &Path) -> Option<Self> {
        let stem = model_path.file_stem()?.to_str()?;
        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        let locale = parts[0].to_string();
        let quality = parts[parts.len() - 1].to_string();
        let name = parts[1..parts.len() - 1].join("-");

        Some(Self {
            display_name: format!("{name} ({locale}, {quality})"),
            language: locale.replace('_', "-"),
            locale,
            name,
            quality,
            model_path: model_path.to_path_buf(),
        })
    }

    /// Primary language subtag, lowercased (`"en"` for `en-US`).
    pub fn primary_language(&self) -> String {
        primary_subtag(&self.language)
    }
}

fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// A discovered voice and its parsed manifest.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub voice: Voice,
    pub manifest: Arc<VoiceManifest>,
}

/// A candidate that was found on disk but could not be used.
#[derive(Debug, Clone)]
pub struct SkippedVoice {
    pub path: PathBuf,
    pub reason: String,
}

/// Immutable snapshot of the installed voices.
///
/// Rebuilt wholesale on reinitialization, never patched in place.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    search_paths: Vec<PathBuf>,
    entries: Vec<CatalogEntry>,
    skipped: Vec<SkippedVoice>,
}

impl VoiceCatalog {
    /// Scan `roots` in order and parse every usable voice.
    ///
    /// Broken candidates are logged and listed in [`VoiceCatalog::skipped`];
    /// they never stop the scan.
    pub fn discover(roots: &[PathBuf]) -> Self {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for model_path in discover_models(roots) {
            let Some(voice) = Voice::from_model_path(&model_path) else {
                log::warn!(
                    "Skipping {}: file name is not <locale>-<name>-<quality>.{MODEL_EXTENSION}",
                    model_path.display()
                );
                skipped.push(SkippedVoice {
                    path: model_path,
                    reason: "unrecognized file name".to_string(),
                });
                continue;
            };

            let Some(manifest_path) = manifest_path_for(&model_path) else {
                // Removed between the directory scan and now.
                continue;
            };

            match VoiceManifest::load(&model_path, &manifest_path) {
                Ok(manifest) => entries.push(CatalogEntry {
                    voice,
                    manifest: Arc::new(manifest),
                }),
                Err(e) => {
                    log::warn!("Skipping voice {}: {e}", model_path.display());
                    skipped.push(SkippedVoice {
                        path: model_path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Discovered {} Piper voice(s) in {} search path(s), skipped {}",
            entries.len(),
            roots.len(),
            skipped.len()
        );

        Self {
            search_paths: roots.to_vec(),
            entries,
            skipped,
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn skipped(&self) -> &[SkippedVoice] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.entries.iter().map(|e| e.voice.clone()).collect()
    }

    pub fn manifests(&self) -> impl Iterator<Item = &Arc<VoiceManifest>> {
        self.entries.iter().map(|e| &e.manifest)
    }

    pub fn get(&self, voice: &Voice) -> Option<&CatalogEntry> {
        self.by_model_path(&voice.model_path)
    }

    pub fn by_model_path(&self, model_path: &Path) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.voice.model_path == model_path)
            .or_else(|| {
                let canonical = std::fs::canonicalize(model_path).ok()?;
                self.entries.iter().find(|e| e.voice.model_path == canonical)
            })
    }

    pub fn contains_model(&self, model_path: &Path) -> bool {
        self.by_model_path(model_path).is_some()
    }

    /// Voices whose primary language matches `language` (`"en"`, `"en-GB"`, `"en_US"`).
    pub fn find_voices(&self, language: &str) -> Vec<Voice> {
        let wanted = primary_subtag(language);
        self.entries
            .iter()
            .filter(|e| e.voice.primary_language() == wanted)
            .map(|e| e.voice.clone())
            .collect()
    }

    /// Distinct voice languages in discovery order.
    pub fn available_languages(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.voice.language.clone()))
            .map(|e| e.voice.language.clone())
            .collect()
    }

    /// Speaker names of a catalogued voice.
    pub fn speakers(&self, voice: &Voice) -> Option<Vec<String>> {
        self.get(voice).map(|e| e.manifest.speaker_names())
    }
}

/// Find model files under `root/<lang>/<locale>/<voice>/<quality>/` that have
/// a sibling manifest.
///
/// Directory listings are sorted so the result only depends on `roots` order.
/// Duplicates (same canonical path) keep their first occurrence.
pub fn discover_models(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut models = Vec::new();

    for root in roots {
        if !root.is_dir() {
            log::debug!("Voice search path {} does not exist", root.display());
            continue;
        }

        for lang in sorted_subdirs(root) {
            for locale in sorted_subdirs(&lang) {
                for voice in sorted_subdirs(&locale) {
                    for quality in sorted_subdirs(&voice) {
                        for model in sorted_models(&quality) {
                            if manifest_path_for(&model).is_none() {
                                log::debug!("No manifest next to {}", model.display());
                                continue;
                            }
                            let canonical = std::fs::canonicalize(&model).unwrap_or(model);
                            if seen.insert(canonical.clone()) {
                                models.push(canonical);
                            }
                        }
                    }
                }
            }
        }
    }

    models
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            log::warn!("Cannot read {}: {e}", dir.display());
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = read_dir.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    paths
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir).into_iter().filter(|p| p.is_dir()).collect()
}

fn sorted_models(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir)
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "audio": { "sample_rate": 22050 },
        "espeak": { "voice": "en-us" },
        "phoneme_id_map": { "a": [5] }
    }"#;

    fn install(root: &Path, locale: &str, name: &str, quality: &str, manifest: Option<&str>) -> PathBuf {
        let lang = locale.split('_').next().unwrap();
        let dir = root.join(lang).join(locale).join(name).join(quality);
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join(format!("{locale}-{name}-{quality}.onnx"));
        std::fs::write(&model, b"onnx").unwrap();
        if let Some(json) = manifest {
            let mut path = model.as_os_str().to_owned();
            path.push(".json");
            std::fs::write(PathBuf::from(path), json).unwrap();
        }
        model
    }

    fn names(catalog: &VoiceCatalog) -> Vec<String> {
        catalog.voices().into_iter().map(|v| v.name).collect()
    }

    #[test]
    fn parses_voice_from_file_name() {
        let voice =
            Voice::from_model_path(Path::new("/v/en/en_US/lessac/medium/en_US-lessac-medium.onnx"))
                .unwrap();
        assert_eq!(voice.display_name, "lessac (en_US, medium)");
        assert_eq!(voice.language, "en-US");
        assert_eq!(voice.primary_language(), "en");
        assert_eq!(voice.quality, "medium");

        let voice = Voice::from_model_path(Path::new("es_MX-claude-x-high.onnx")).unwrap();
        assert_eq!(voice.name, "claude-x");
        assert!(Voice::from_model_path(Path::new("model.onnx")).is_none());
    }

    #[test]
    fn discovers_only_complete_pairs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        install(&root, "en_US", "amy", "low", Some(MANIFEST));
        install(&root, "en_US", "lessac", "medium", Some(MANIFEST));
        install(&root, "de_DE", "thorsten", "high", Some(MANIFEST));
        install(&root, "en_GB", "alan", "low", None);
        install(&root, "fr_FR", "siwis", "low", None);
        // Manifest without a model.
        let orphan = root.join("it/it_IT/paola/medium");
        std::fs::create_dir_all(&orphan).unwrap();
        std::fs::write(orphan.join("it_IT-paola-medium.onnx.json"), MANIFEST).unwrap();

        let catalog = VoiceCatalog::discover(&[root]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(names(&catalog), vec!["thorsten", "amy", "lessac"]);
        assert!(catalog.skipped().is_empty());
    }

    #[test]
    fn broken_manifests_are_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        install(&root, "en_US", "amy", "low", Some(MANIFEST));
        install(&root, "en_US", "bad", "low", Some("{ not json"));
        install(&root, "en_US", "norate", "low", Some(r#"{ "phoneme_id_map": { "a": [1] } }"#));

        let catalog = VoiceCatalog::discover(&[root]);
        assert_eq!(names(&catalog), vec!["amy"]);
        assert_eq!(catalog.skipped().len(), 2);
    }

    #[test]
    fn earlier_roots_win_on_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("custom");
        let bundled = tmp.path().join("bundled");
        install(&custom, "en_US", "amy", "low", Some(MANIFEST));
        install(&bundled, "en_US", "amy", "low", Some(MANIFEST));
        install(&bundled, "en_US", "ryan", "high", Some(MANIFEST));

        let catalog = VoiceCatalog::discover(&[custom.clone(), bundled.clone(), custom.clone()]);
        assert_eq!(names(&catalog), vec!["amy", "amy", "ryan"]);
        assert!(catalog.voices()[0].model_path.starts_with(custom.canonicalize().unwrap()));

        // The same root listed twice adds nothing.
        let catalog = VoiceCatalog::discover(&[bundled.clone(), bundled]);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn missing_roots_yield_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = VoiceCatalog::discover(&[tmp.path().join("nope")]);
        assert!(catalog.is_empty());
        assert_eq!(catalog.search_paths().len(), 1);
    }

    #[test]
    fn queries_by_language_and_speakers() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        install(&root, "en_US", "amy", "low", Some(MANIFEST));
        install(&root, "en_GB", "alan", "low", Some(MANIFEST));
        let multi = r#"{ "audio": { "sample_rate": 22050 }, "num_speakers": 2,
                         "speaker_id_map": { "b": 1, "a": 0 }, "phoneme_id_map": { "a": [5] } }"#;
        install(&root, "de_DE", "multi", "medium", Some(multi));

        let catalog = VoiceCatalog::discover(&[root]);
        assert_eq!(catalog.find_voices("en").len(), 2);
        assert_eq!(catalog.find_voices("EN_us").len(), 2);
        assert_eq!(catalog.find_voices("de-DE").len(), 1);
        assert_eq!(catalog.available_languages(), vec!["de-DE", "en-GB", "en-US"]);

        let multi_voice = catalog.find_voices("de").remove(0);
        assert_eq!(catalog.speakers(&multi_voice).unwrap(), vec!["a", "b"]);
        let amy = catalog.find_voices("en-US").remove(0);
        assert_eq!(catalog.speakers(&amy).unwrap(), vec!["default"]);
        assert!(catalog.get(&amy).is_some());
    }
}
