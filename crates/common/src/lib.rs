use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const ARTIST_TITLE_SEPARATOR: &str = " - ";
pub const DEFAULT_NAMESPACE: &str = "music";
pub const ID_DELIMITER: char = '_';
pub const REFERENCE_DELIMITER: char = '\\';

const FALLBACK_TOKEN_LEN: usize = 8;

static FEATURED_ARTIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\((?:feat\.|ft\.)\s*([^)]+)\)").expect("featured artist pattern")
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackName {
    pub artist: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMediaFile {
    pub path: PathBuf,
    pub category: String,
    pub stem: String,
    /// Includes the leading dot; empty when the file has no extension.
    pub extension: String,
}

impl RawMediaFile {
    pub fn from_path(path: &Path, category: &str) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().to_string();
        let (stem, extension) = split_extension(&file_name);
        Some(Self {
            path: path.to_path_buf(),
            category: category.to_string(),
            stem: stem.to_string(),
            extension: extension.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub namespace: String,
    pub category: String,
    pub artist_token: String,
    pub title_token: String,
    pub canonical_id: String,
}

impl TrackIdentity {
    pub fn new(namespace: &str, category: &str, name: &TrackName) -> Self {
        let artist_token = token_or_fallback(&name.artist);
        let title_token = token_or_fallback(&name.title);
        let canonical_id = [namespace, category, &artist_token, &title_token]
            .join(&ID_DELIMITER.to_string());
        Self {
            namespace: namespace.to_string(),
            category: category.to_string(),
            artist_token,
            title_token,
            canonical_id,
        }
    }

    pub fn file_stem(&self) -> String {
        format!("{}{}{}", self.artist_token, ID_DELIMITER, self.title_token)
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}{}", self.file_stem(), extension)
    }

    /// Playlist line for this track, e.g. `music\Rock\Queen_BohemianRhapsody`.
    pub fn reference(&self) -> String {
        [self.namespace.as_str(), self.category.as_str(), &self.file_stem()]
            .join(&REFERENCE_DELIMITER.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalTrack {
    pub source: RawMediaFile,
    pub name: TrackName,
    pub identity: TrackIdentity,
}

impl CanonicalTrack {
    pub fn from_raw(source: RawMediaFile, namespace: &str) -> Option<Self> {
        let name = parse_track_name(&source.stem)?;
        let identity = TrackIdentity::new(namespace, &source.category, &name);
        Some(Self {
            source,
            name,
            identity,
        })
    }

    pub fn target_path(&self) -> PathBuf {
        let file_name = self.identity.file_name(&self.source.extension);
        match self.source.path.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// Splits `Artist - Title (feat. Guest)` into its artist and title.
///
/// Returns `None` when the stem has no separator, which is how already
/// renamed files are recognised.
pub fn parse_track_name(stem: &str) -> Option<TrackName> {
    let (artist, title) = stem.split_once(ARTIST_TITLE_SEPARATOR)?;
    let mut artist = artist.to_string();
    let mut title = title.to_string();

    if let Some(caps) = FEATURED_ARTIST.captures(&title) {
        let featured = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        artist = format!("{} feat. {}", artist, featured);
        if let Some(whole) = caps.get(0) {
            let mut stripped = String::with_capacity(title.len());
            stripped.push_str(&title[..whole.start()]);
            stripped.push_str(&title[whole.end()..]);
            title = stripped.trim().to_string();
        }
    }

    Some(TrackName { artist, title })
}

pub fn safe_token(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_')
        .collect()
}

fn token_or_fallback(value: &str) -> String {
    let token = safe_token(value);
    if !token.is_empty() {
        return token;
    }
    let hash = stable_id(value);
    format!("x{}", &hash[..FALLBACK_TOKEN_LEN])
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}
