use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::LibraryError;

pub const COUNT_PREFIX: &str = "num_songs:";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    pub global_file: String,
    pub category_files: BTreeMap<String, String>,
    pub fallback_suffix: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        let category_files = [
            ("HipHop", "rap_race_music.play"),
            ("Rock", "pop_race_music.play"),
            ("Dancehall", "dance_hall_race_music.play"),
            ("Techno", "techno_race_music.play"),
            ("Drum_N_Bass", "drums_bass_race_music.play"),
            ("Instrumental", "garage.play"),
        ]
        .into_iter()
        .map(|(category, file)| (category.to_string(), file.to_string()))
        .collect();
        Self {
            global_file: "sd.play".to_string(),
            category_files,
            fallback_suffix: "_race_music.play".to_string(),
        }
    }
}

impl ManifestConfig {
    pub fn category_file(&self, category: &str) -> String {
        match self.category_files.get(category) {
            Some(file) => file.clone(),
            None => format!("{}{}", category.to_lowercase(), self.fallback_suffix),
        }
    }
}

/// A count-prefixed playlist file: `num_songs: N` followed by N references.
#[derive(Clone, Debug)]
pub struct Manifest {
    path: PathBuf,
    references: Vec<String>,
    seen: HashSet<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, LibraryError> {
        let mut manifest = Self {
            path: path.to_path_buf(),
            references: Vec::new(),
            seen: HashSet::new(),
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(manifest),
            Err(err) => return Err(err.into()),
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(COUNT_PREFIX) {
                continue;
            }
            if !manifest.append_if_absent(line) {
                debug!("Dropping duplicate {:?} from {:?}", line, path);
            }
        }
        Ok(manifest)
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn append_if_absent(&mut self, reference: &str) -> bool {
        if !self.seen.insert(reference.to_string()) {
            return false;
        }
        self.references.push(reference.to_string());
        true
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} {}\n", COUNT_PREFIX, self.references.len());
        for reference in &self.references {
            out.push_str(reference);
            out.push('\n');
        }
        out
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, self.render())?;
        Ok(())
    }
}

/// The global manifest plus every category manifest touched in a pass.
/// Category manifests are keyed by file name: categories that resolve to
/// the same file append to one shared manifest.
#[derive(Debug)]
pub struct ManifestSet {
    dir: PathBuf,
    config: ManifestConfig,
    global: Manifest,
    files: BTreeMap<String, Manifest>,
}

impl ManifestSet {
    pub fn load(dir: &Path, config: ManifestConfig) -> Result<Self, LibraryError> {
        let global = Manifest::load(&dir.join(&config.global_file))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            global,
            files: BTreeMap::new(),
        })
    }

    pub fn global(&self) -> &Manifest {
        &self.global
    }

    /// Appends to the global and the category manifest; returns which of the
    /// two actually gained the reference.
    pub fn append(
        &mut self,
        category: &str,
        reference: &str,
    ) -> Result<(bool, bool), LibraryError> {
        let added_global = self.global.append_if_absent(reference);
        let added_category = self.category_mut(category)?.append_if_absent(reference);
        Ok((added_global, added_category))
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        self.global.save()?;
        for manifest in self.files.values() {
            manifest.save()?;
        }
        Ok(())
    }

    fn category_mut(&mut self, category: &str) -> Result<&mut Manifest, LibraryError> {
        match self.files.entry(self.config.category_file(category)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let manifest = Manifest::load(&self.dir.join(entry.key()))?;
                Ok(entry.insert(manifest))
            }
        }
    }
}
