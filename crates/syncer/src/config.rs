use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::{LibraryLayout, ManifestConfig, TextTableConfig};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_ENV: &str = "MCSYNC_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "mcsync.yaml";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub dir: String,
    pub python: String,
    /// Empty means `ffmpeg` from PATH, or the bundled `ffmpeg.exe` on Windows.
    pub ffmpeg: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dir: "external_tools".to_string(),
            python: "python".to_string(),
            ffmpeg: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub version: u32,
    pub base_dir: String,
    pub tools: ToolsConfig,
    pub assets_dir: String,
    pub assets_archive: String,
    pub streams_dir: String,
    pub streams_archive: String,
    pub music_dir: String,
    pub playlist_dir: String,
    pub strings_dir: String,
    pub string_table: String,
    pub namespace: String,
    pub manifests: ManifestConfig,
    pub text_table: TextTableConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            base_dir: ".".to_string(),
            tools: ToolsConfig::default(),
            assets_dir: "ASSETS".to_string(),
            assets_archive: "ASSETS.DAT".to_string(),
            streams_dir: "STREAMS".to_string(),
            streams_archive: "STREAMS.DAT".to_string(),
            music_dir: "STREAMS/Music".to_string(),
            playlist_dir: "ASSETS/tune/audio/playlist/city/sd/music".to_string(),
            strings_dir: "ASSETS/fonts".to_string(),
            string_table: "mcstrings02".to_string(),
            namespace: common::DEFAULT_NAMESPACE.to_string(),
            manifests: ManifestConfig::default(),
            text_table: TextTableConfig::default(),
        }
    }
}

/// Absolute locations derived from a config and its base directory.
#[derive(Clone, Debug)]
pub struct ResolvedPaths {
    pub base: PathBuf,
    pub tools_dir: PathBuf,
    pub python: PathBuf,
    pub ffmpeg: PathBuf,
    pub assets_dir: PathBuf,
    pub assets_archive: PathBuf,
    pub streams_dir: PathBuf,
    pub streams_archive: PathBuf,
    pub music_root: PathBuf,
    pub playlist_dir: PathBuf,
    pub strings_dir: PathBuf,
    pub strtbl_file: PathBuf,
    pub strtbl_json: PathBuf,
}

impl ResolvedPaths {
    pub fn layout(&self) -> LibraryLayout {
        LibraryLayout {
            music_root: self.music_root.clone(),
            playlist_dir: self.playlist_dir.clone(),
            text_table_path: self.strtbl_json.clone(),
        }
    }
}

impl SyncConfig {
    pub fn resolve(&self, config_path: &Path, base_override: Option<&Path>) -> ResolvedPaths {
        let base = match base_override {
            Some(base) => base.to_path_buf(),
            None => resolve_path(config_path, &self.base_dir),
        };
        let tools_dir = base.join(&self.tools.dir);
        let python = PathBuf::from(&self.tools.python);
        let ffmpeg = if self.tools.ffmpeg.trim().is_empty() {
            default_ffmpeg(&tools_dir)
        } else {
            PathBuf::from(self.tools.ffmpeg.trim())
        };
        let strings_dir = base.join(&self.strings_dir);
        ResolvedPaths {
            tools_dir,
            python,
            ffmpeg,
            assets_dir: base.join(&self.assets_dir),
            assets_archive: base.join(&self.assets_archive),
            streams_dir: base.join(&self.streams_dir),
            streams_archive: base.join(&self.streams_archive),
            music_root: base.join(&self.music_dir),
            playlist_dir: base.join(&self.playlist_dir),
            strtbl_file: strings_dir.join(format!("{}.strtbl", self.string_table)),
            strtbl_json: strings_dir.join(format!("{}.json", self.string_table)),
            strings_dir,
            base,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(SyncConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: SyncConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.base_dir.trim().is_empty() {
            config.base_dir = ".".to_string();
        }
        if config.namespace.trim().is_empty() {
            config.namespace = common::DEFAULT_NAMESPACE.to_string();
        }
        return Ok((config, false));
    }

    let config = SyncConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

fn default_ffmpeg(tools_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        tools_dir.join("ffmpeg.exe")
    } else {
        PathBuf::from("ffmpeg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcsync.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.manifests.category_file("Rock"), "pop_race_music.play");

        let (reloaded, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(reloaded.string_table, "mcstrings02");
        assert_eq!(reloaded.text_table, config.text_table);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcsync.yaml");
        fs::write(&path, "base_dir: game\nmanifests:\n  global_file: all.play\n").unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.base_dir, "game");
        assert_eq!(config.manifests.global_file, "all.play");
        assert_eq!(config.manifests.fallback_suffix, "_race_music.play");
        assert_eq!(config.text_table.languages.len(), 6);
    }

    #[test]
    fn paths_resolve_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcsync.yaml");
        let paths = SyncConfig::default().resolve(&path, None);
        assert_eq!(paths.base, dir.path().join("."));
        assert_eq!(
            paths.strtbl_json,
            dir.path().join(".").join("ASSETS/fonts").join("mcstrings02.json")
        );

        let paths = SyncConfig::default().resolve(&path, Some(Path::new("/game")));
        assert_eq!(paths.music_root, Path::new("/game").join("STREAMS/Music"));
    }
}
