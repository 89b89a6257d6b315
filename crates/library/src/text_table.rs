use std::fs;
use std::path::{Path, PathBuf};

use common::TrackName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::LibraryError;

const JSON_INDENT: &[u8] = b"    ";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub name: String,
    pub scale32: [f64; 2],
    pub scale8: [i64; 2],
    pub size: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            name: "smallspace".to_string(),
            scale32: [1.0, 1.0],
            scale8: [0, 0],
            size: 15,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanguageText {
    pub code: String,
    pub prefix: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextTableConfig {
    pub container_key: String,
    pub languages: Vec<LanguageText>,
    pub font: TextStyle,
}

impl Default for TextTableConfig {
    fn default() -> Self {
        let prefixes = ["by", "de", "par", "von", "di", "by"];
        let languages = prefixes
            .iter()
            .enumerate()
            .map(|(idx, prefix)| LanguageText {
                code: format!("Language {:02}", idx),
                prefix: prefix.to_string(),
            })
            .collect();
        Self {
            container_key: "data".to_string(),
            languages,
            font: TextStyle::default(),
        }
    }
}

/// Localized track captions keyed by canonical id.
///
/// Keys already present are never rewritten, so hand-edited captions survive
/// every sync pass.
#[derive(Debug)]
pub struct TextTable {
    path: PathBuf,
    config: TextTableConfig,
    font: Value,
    document: Map<String, Value>,
}

impl TextTable {
    pub fn load(path: &Path, config: TextTableConfig) -> Result<Self, LibraryError> {
        let mut document = match fs::read(path) {
            Ok(bytes) => parse_document(path, &bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Text table {:?} not found; starting empty", path);
                Map::new()
            }
            Err(err) => return Err(err.into()),
        };

        let container_ok = matches!(document.get(&config.container_key), Some(Value::Object(_)));
        if !container_ok {
            if document.contains_key(&config.container_key) {
                warn!(
                    "Text table key {:?} is not an object; replacing it",
                    config.container_key
                );
            }
            document.insert(config.container_key.clone(), Value::Object(Map::new()));
        }

        let font = serde_json::to_value(&config.font)?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
            font,
            document,
        })
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries().is_some_and(|entries| entries.contains_key(id))
    }

    pub fn entry(&self, id: &str) -> Option<&Value> {
        self.entries()?.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `false` and leaves the table untouched when `id` exists.
    pub fn add(&mut self, id: &str, name: &TrackName) -> bool {
        if self.has(id) {
            return false;
        }
        let block = self.localized_block(name);
        let key = self.config.container_key.clone();
        match self.document.get_mut(&key) {
            Some(Value::Object(entries)) => {
                entries.insert(id.to_string(), block);
                true
            }
            _ => false,
        }
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = render_document(&self.document)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn entries(&self) -> Option<&Map<String, Value>> {
        self.document
            .get(&self.config.container_key)
            .and_then(Value::as_object)
    }

    fn localized_block(&self, name: &TrackName) -> Value {
        let mut block = Map::new();
        for language in &self.config.languages {
            let mut text = Map::new();
            text.insert(
                "text".to_string(),
                Value::String(format!(
                    "\"{}\"\n{} {}",
                    name.title, language.prefix, name.artist
                )),
            );
            text.insert("font".to_string(), self.font.clone());
            block.insert(language.code.clone(), Value::Object(text));
        }
        Value::Object(block)
    }
}

fn parse_document(path: &Path, bytes: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Text table {:?} is not a JSON object; starting empty", path);
            Map::new()
        }
        Err(err) => {
            warn!("Text table {:?} is malformed ({}); starting empty", path, err);
            Map::new()
        }
    }
}

fn render_document(document: &Map<String, Value>) -> Result<Vec<u8>, LibraryError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(JSON_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;
    Ok(out)
}
