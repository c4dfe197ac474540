use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::PiperError;

/// Environment variable holding a user voices directory.
pub const VOICES_PATH_ENV: &str = "PIPER_VOICES_PATH";

/// Where to look for installed voices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiperConfig {
    /// User-configured voices directory, searched before everything else.
    pub voices_path: Option<PathBuf>,
    /// Append the standard system and per-user voice directories.
    pub include_default_paths: bool,
    /// Searched after the defaults.
    pub extra_paths: Vec<PathBuf>,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            voices_path: None,
            include_default_paths: true,
            extra_paths: Vec::new(),
        }
    }
}

impl PiperConfig {
    pub fn with_voices_path(path: impl Into<PathBuf>) -> Self {
        Self {
            voices_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Search only the given roots, in order.
    pub fn with_paths_only(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            voices_path: None,
            include_default_paths: false,
            extra_paths: paths.into_iter().collect(),
        }
    }

    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PiperError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| PiperError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults, with `voices_path` taken from `PIPER_VOICES_PATH` when set.
    pub fn from_env() -> Self {
        let voices_path = std::env::var_os(VOICES_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            voices_path,
            ..Default::default()
        }
    }

    /// Ordered, de-duplicated roots to scan.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut push = |path: PathBuf| {
            if !path.as_os_str().is_empty() && !paths.contains(&path) {
                paths.push(path);
            }
        };

        if let Some(custom) = &self.voices_path {
            push(custom.clone());
        }
        if self.include_default_paths {
            default_search_paths().into_iter().for_each(&mut push);
        }
        self.extra_paths.iter().cloned().for_each(&mut push);
        paths
    }
}

/// Standard voice locations: system shares, the user's data dir, and `./piper-voices`.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/share/piper-voices"),
        PathBuf::from("/usr/local/share/piper-voices"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local/share/piper-voices"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("piper-voices"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_path_comes_first() {
        let config = PiperConfig::with_voices_path("/opt/voices");
        let paths = config.search_paths();
        assert_eq!(paths[0], PathBuf::from("/opt/voices"));
        assert!(paths.contains(&PathBuf::from("/usr/share/piper-voices")));
    }

    #[test]
    fn duplicates_are_removed() {
        let config = PiperConfig {
            voices_path: Some("/usr/share/piper-voices".into()),
            include_default_paths: true,
            extra_paths: vec!["/usr/share/piper-voices".into(), "/srv/v".into()],
        };
        let paths = config.search_paths();
        assert_eq!(paths[0], PathBuf::from("/usr/share/piper-voices"));
        assert_eq!(
            paths
                .iter()
                .filter(|p| **p == PathBuf::from("/usr/share/piper-voices"))
                .count(),
            1
        );
        assert_eq!(paths.last(), Some(&PathBuf::from("/srv/v")));
    }

    #[test]
    fn paths_only_skips_defaults() {
        let config = PiperConfig::with_paths_only([PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.search_paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn loads_partial_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("piper.json");
        std::fs::write(&path, r#"{ "voices_path": "/data/voices" }"#).unwrap();
        let config = PiperConfig::from_json_file(&path).unwrap();
        assert_eq!(config.voices_path, Some(PathBuf::from("/data/voices")));
        assert!(config.include_default_paths);

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            PiperConfig::from_json_file(&path),
            Err(PiperError::Config(_))
        ));
    }
}
