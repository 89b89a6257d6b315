pub mod manifest;
pub mod text_table;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use common::{is_hidden_name, CanonicalTrack, RawMediaFile};
use tracing::{info, warn};
use walkdir::WalkDir;

pub use manifest::{Manifest, ManifestConfig, ManifestSet};
pub use text_table::{TextTable, TextTableConfig};

/// Where the library, its manifests and its text table live on disk.
#[derive(Clone, Debug)]
pub struct LibraryLayout {
    pub music_root: PathBuf,
    pub playlist_dir: PathBuf,
    pub text_table_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Library {
    layout: LibraryLayout,
    namespace: String,
    manifests: ManifestConfig,
    text_table: TextTableConfig,
}

impl Library {
    pub fn new(
        layout: LibraryLayout,
        namespace: impl Into<String>,
        manifests: ManifestConfig,
        text_table: TextTableConfig,
    ) -> Self {
        Self {
            layout,
            namespace: namespace.into(),
            manifests,
            text_table,
        }
    }

    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    pub fn scan(&self) -> Result<ScanReport, LibraryError> {
        scan_candidates(&self.layout.music_root, &self.namespace)
    }

    /// One full pass: collect, merge in memory, then write.
    pub fn sync(&self) -> Result<SyncOutcome, LibraryError> {
        let report = self.scan()?;
        info!(
            "Found {} new tracks ({} files skipped)",
            report.candidates.len(),
            report.skipped
        );
        let mut table = TextTable::load(&self.layout.text_table_path, self.text_table.clone())?;
        let mut manifests = ManifestSet::load(&self.layout.playlist_dir, self.manifests.clone())?;
        let plan = plan_sync(report, &mut table, &mut manifests)?;
        apply(plan, &table, &manifests)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    pub candidates: Vec<CanonicalTrack>,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameFailure {
    pub from: PathBuf,
    pub to: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct SyncPlan {
    pub renames: Vec<Rename>,
    pub collisions: Vec<Rename>,
    pub skipped: usize,
    pub new_entries: Vec<String>,
    pub new_global_refs: Vec<String>,
    pub new_category_refs: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct SyncOutcome {
    pub skipped: usize,
    pub renamed: Vec<Rename>,
    pub collisions: Vec<Rename>,
    pub rename_failures: Vec<RenameFailure>,
    pub new_entries: Vec<String>,
    pub new_global_refs: Vec<String>,
    pub new_category_refs: BTreeMap<String, Vec<String>>,
}

/// Lists every file under `music_root/<category>/` that still follows the
/// `Artist - Title` convention. Nothing is touched on disk.
pub fn scan_candidates(music_root: &Path, namespace: &str) -> Result<ScanReport, LibraryError> {
    let mut report = ScanReport::default();
    for (category, dir) in category_dirs(music_root)? {
        for path in category_files(&dir)? {
            let raw = match RawMediaFile::from_path(&path, &category) {
                Some(raw) => raw,
                None => continue,
            };
            match CanonicalTrack::from_raw(raw, namespace) {
                Some(track) => report.candidates.push(track),
                None => report.skipped += 1,
            }
        }
    }
    Ok(report)
}

/// Merges candidates into the in-memory stores. Candidates whose canonical
/// file name is already taken are set aside and never merged.
pub fn plan_sync(
    report: ScanReport,
    table: &mut TextTable,
    manifests: &mut ManifestSet,
) -> Result<SyncPlan, LibraryError> {
    let mut plan = SyncPlan {
        skipped: report.skipped,
        ..SyncPlan::default()
    };
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for track in report.candidates {
        let rename = Rename {
            from: track.source.path.clone(),
            to: track.target_path(),
        };
        let taken = claimed.contains(&rename.to)
            || (rename.to != rename.from && rename.to.exists());
        if taken {
            warn!("Skipping {:?}: {:?} already exists", rename.from, rename.to);
            plan.collisions.push(rename);
            continue;
        }
        claimed.insert(rename.to.clone());

        let id = &track.identity.canonical_id;
        if table.add(id, &track.name) {
            plan.new_entries.push(id.clone());
        }

        let reference = track.identity.reference();
        let (added_global, added_category) =
            manifests.append(&track.source.category, &reference)?;
        if added_global {
            plan.new_global_refs.push(reference.clone());
        }
        if added_category {
            plan.new_category_refs
                .entry(track.source.category.clone())
                .or_default()
                .push(reference);
        }
        plan.renames.push(rename);
    }

    Ok(plan)
}

/// Persists the stores first and renames last, so an interrupted pass leaves
/// raw files that the next pass merges again as no-ops.
pub fn apply(
    plan: SyncPlan,
    table: &TextTable,
    manifests: &ManifestSet,
) -> Result<SyncOutcome, LibraryError> {
    table.save()?;
    manifests.save()?;

    let mut outcome = SyncOutcome {
        skipped: plan.skipped,
        collisions: plan.collisions,
        new_entries: plan.new_entries,
        new_global_refs: plan.new_global_refs,
        new_category_refs: plan.new_category_refs,
        ..SyncOutcome::default()
    };

    for rename in plan.renames {
        if rename.from == rename.to {
            outcome.renamed.push(rename);
            continue;
        }
        if rename.to.exists() {
            outcome.rename_failures.push(RenameFailure {
                error: "target already exists".to_string(),
                from: rename.from,
                to: rename.to,
            });
            continue;
        }
        match fs::rename(&rename.from, &rename.to) {
            Ok(()) => outcome.renamed.push(rename),
            Err(err) => {
                warn!("Failed to rename {:?}: {}", rename.from, err);
                outcome.rename_failures.push(RenameFailure {
                    from: rename.from,
                    to: rename.to,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        "Sync applied: {} renamed, {} new text entries, {} new playlist entries",
        outcome.renamed.len(),
        outcome.new_entries.len(),
        outcome.new_global_refs.len()
    );
    Ok(outcome)
}

/// Direct subdirectories of the music root, sorted by name.
pub fn category_dirs(music_root: &Path) -> Result<Vec<(String, PathBuf)>, LibraryError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(music_root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        dirs.push((name, entry.into_path()));
    }
    Ok(dirs)
}

/// Regular, non-hidden files directly inside a category directory.
pub fn category_files(dir: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_hidden_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

fn walk_error(err: walkdir::Error) -> LibraryError {
    match err.into_io_error() {
        Some(io) => LibraryError::Io(io),
        None => LibraryError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "filesystem loop while walking library",
        )),
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}
