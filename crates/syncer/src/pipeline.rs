use std::fs;
use std::path::PathBuf;

use colored::Colorize;
use library::{Library, LibraryError, SyncOutcome};
use tracing::info;

use crate::checkpoint::{Checkpoint, Gate};
use crate::config::ResolvedPaths;
use crate::external::{ToolError, ToolRunner, Tools};
use crate::streams::{build_streams, StreamReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    DecodeArchives,
    CheckLayout,
    DecodeTextTable,
    AwaitTracks,
    ListTracks,
    Sync,
    EncodeTextTable,
    BuildStreams,
    EncodeArchives,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Halt {
    Completed { archives_encoded: bool },
    Declined(Gate),
    MissingLayout(Vec<PathBuf>),
}

enum Transition {
    Next(Stage),
    Halt(Halt),
}

#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub build_streams: bool,
}

#[derive(Debug)]
pub struct RunSummary {
    pub halt: Halt,
    pub visited: Vec<Stage>,
    pub sync: Option<SyncOutcome>,
    pub streams: Option<StreamReport>,
}

/// Stage machine: each stage either names its successor or halts the run.
/// A tool failure aborts the whole run.
pub struct Pipeline<R, C> {
    paths: ResolvedPaths,
    library: Library,
    tools: Tools,
    runner: R,
    checkpoint: C,
    options: PipelineOptions,
    visited: Vec<Stage>,
    sync: Option<SyncOutcome>,
    streams: Option<StreamReport>,
}

impl<R: ToolRunner, C: Checkpoint> Pipeline<R, C> {
    pub fn new(
        paths: ResolvedPaths,
        library: Library,
        runner: R,
        checkpoint: C,
        options: PipelineOptions,
    ) -> Self {
        let tools = Tools::new(&paths);
        Self {
            paths,
            library,
            tools,
            runner,
            checkpoint,
            options,
            visited: Vec::new(),
            sync: None,
            streams: None,
        }
    }

    pub fn run(mut self) -> Result<RunSummary, PipelineError> {
        let mut stage = Stage::DecodeArchives;
        loop {
            self.visited.push(stage);
            match self.step(stage)? {
                Transition::Next(next) => stage = next,
                Transition::Halt(halt) => {
                    info!("Pipeline halted at {:?}: {:?}", stage, halt);
                    return Ok(RunSummary {
                        halt,
                        visited: self.visited,
                        sync: self.sync,
                        streams: self.streams,
                    });
                }
            }
        }
    }

    fn step(&mut self, stage: Stage) -> Result<Transition, PipelineError> {
        match stage {
            Stage::DecodeArchives => self.decode_archives(),
            Stage::CheckLayout => Ok(self.check_layout()),
            Stage::DecodeTextTable => self.decode_text_table(),
            Stage::AwaitTracks => Ok(self.gate(Gate::TracksDropped, Stage::ListTracks)),
            Stage::ListTracks => self.list_tracks(),
            Stage::Sync => self.sync_library(),
            Stage::EncodeTextTable => self.encode_text_table(),
            Stage::BuildStreams => self.build_streams(),
            Stage::EncodeArchives => self.encode_archives(),
        }
    }

    fn gate(&mut self, gate: Gate, next: Stage) -> Transition {
        if self.checkpoint.confirm(gate) {
            Transition::Next(next)
        } else {
            Transition::Halt(Halt::Declined(gate))
        }
    }

    fn decode_archives(&mut self) -> Result<Transition, PipelineError> {
        let assets = self.paths.assets_archive.exists();
        let streams = self.paths.streams_archive.exists();
        if (assets || streams) && self.checkpoint.confirm(Gate::DecodeArchives) {
            if assets {
                println!("{}", "Decompiling ASSETS archive...".yellow());
                let invocation = self.tools.decode_assets(&self.paths.assets_archive);
                self.runner.run(&invocation)?;
            }
            if streams {
                println!("{}", "Decompiling STREAMS archive...".yellow());
                let invocation = self.tools.decode_streams(&self.paths.streams_archive);
                self.runner.run(&invocation)?;
            }
        }
        Ok(Transition::Next(Stage::CheckLayout))
    }

    fn check_layout(&self) -> Transition {
        let missing: Vec<PathBuf> = [
            &self.paths.music_root,
            &self.paths.playlist_dir,
            &self.paths.strings_dir,
        ]
        .into_iter()
        .filter(|path| !path.exists())
        .cloned()
        .collect();
        if missing.is_empty() {
            Transition::Next(Stage::DecodeTextTable)
        } else {
            Transition::Halt(Halt::MissingLayout(missing))
        }
    }

    fn decode_text_table(&mut self) -> Result<Transition, PipelineError> {
        let binary = &self.paths.strtbl_file;
        let json = &self.paths.strtbl_json;
        if binary.exists() && !json.exists() {
            println!("{}", "Converting string table to JSON...".yellow());
            self.runner.run(&self.tools.decode_text_table(binary))?;
            if !json.exists() {
                return Err(PipelineError::MissingOutput(json.clone()));
            }
            fs::remove_file(binary)?;
        }
        Ok(Transition::Next(Stage::AwaitTracks))
    }

    fn list_tracks(&mut self) -> Result<Transition, PipelineError> {
        let report = self.library.scan()?;
        println!();
        for track in &report.candidates {
            println!(
                "{} {}",
                format!("Found a track: {}.", file_name(&track.source.path)).green(),
                format!("Will be {} by {}", track.name.title, track.name.artist)
            );
        }
        if report.skipped > 0 {
            info!("{} files already canonical or not named `Artist - Title`", report.skipped);
        }
        let gate = if report.candidates.is_empty() {
            Gate::ProceedWithoutTracks
        } else {
            Gate::ListingComplete
        };
        Ok(self.gate(gate, Stage::Sync))
    }

    fn sync_library(&mut self) -> Result<Transition, PipelineError> {
        let outcome = self.library.sync()?;
        for collision in &outcome.collisions {
            println!(
                "{}",
                format!(
                    "Skipped {}: {} already exists",
                    file_name(&collision.from),
                    file_name(&collision.to)
                )
                .red()
            );
        }
        for failure in &outcome.rename_failures {
            println!(
                "{}",
                format!("Could not rename {}: {}", file_name(&failure.from), failure.error).red()
            );
        }
        println!(
            "{}",
            format!(
                "Synced {} tracks: {} new text entries, {} new playlist entries",
                outcome.renamed.len(),
                outcome.new_entries.len(),
                outcome.new_global_refs.len()
            )
            .green()
        );
        self.sync = Some(outcome);
        Ok(Transition::Next(Stage::EncodeTextTable))
    }

    fn encode_text_table(&mut self) -> Result<Transition, PipelineError> {
        let json = &self.paths.strtbl_json;
        if json.exists() {
            println!("{}", "Converting JSON back to string table...".yellow());
            self.runner.run(&self.tools.encode_text_table(json))?;
            if !self.paths.strtbl_file.exists() {
                return Err(PipelineError::MissingOutput(self.paths.strtbl_file.clone()));
            }
            fs::remove_file(json)?;
        }
        let next = if self.options.build_streams {
            Stage::BuildStreams
        } else {
            Stage::EncodeArchives
        };
        Ok(Transition::Next(next))
    }

    fn build_streams(&mut self) -> Result<Transition, PipelineError> {
        let report = build_streams(&self.paths.music_root, &self.tools, &mut self.runner)?;
        for source in &report.missing_output {
            println!(
                "{}",
                format!("No stream built for {}; source kept", file_name(source)).red()
            );
        }
        for source in &report.not_canonical {
            println!(
                "{}",
                format!("Not converted, still awaiting rename: {}", file_name(source)).yellow()
            );
        }
        if !report.ignored.is_empty() {
            info!("{} non-audio files ignored", report.ignored.len());
        }
        self.streams = Some(report);
        Ok(Transition::Next(Stage::EncodeArchives))
    }

    fn encode_archives(&mut self) -> Result<Transition, PipelineError> {
        if !self.checkpoint.confirm(Gate::EncodeArchives) {
            return Ok(Transition::Halt(Halt::Completed {
                archives_encoded: false,
            }));
        }
        println!("{}", "Compiling ASSETS archive...".yellow());
        let invocation = self
            .tools
            .encode_assets(&self.paths.assets_dir, &self.paths.assets_archive);
        self.runner.run(&invocation)?;
        println!("{}", "Compiling STREAMS archive...".yellow());
        let invocation = self
            .tools
            .encode_streams(&self.paths.streams_dir, &self.paths.streams_archive);
        self.runner.run(&invocation)?;
        Ok(Transition::Halt(Halt::Completed {
            archives_encoded: true,
        }))
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug)]
pub enum PipelineError {
    Library(LibraryError),
    Tool(ToolError),
    Io(std::io::Error),
    MissingOutput(PathBuf),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Library(err) => write!(f, "library error: {}", err),
            PipelineError::Tool(err) => write!(f, "external tool error: {}", err),
            PipelineError::Io(err) => write!(f, "io error: {}", err),
            PipelineError::MissingOutput(path) => {
                write!(f, "tool reported success but {:?} was not produced", path)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<LibraryError> for PipelineError {
    fn from(err: LibraryError) -> Self {
        PipelineError::Library(err)
    }
}

impl From<ToolError> for PipelineError {
    fn from(err: ToolError) -> Self {
        PipelineError::Tool(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::external::Invocation;
    use std::collections::VecDeque;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct Scripted(VecDeque<bool>, Vec<Gate>);

    impl Checkpoint for Scripted {
        fn confirm(&mut self, gate: Gate) -> bool {
            self.1.push(gate);
            self.0.pop_front().unwrap_or(false)
        }
    }

    fn answers(list: &[bool]) -> Scripted {
        Scripted(list.iter().copied().collect(), Vec::new())
    }

    /// Records calls and fakes the string-table codec's file effects.
    #[derive(Default)]
    struct FakeTools {
        calls: Vec<Invocation>,
        fail_on: Option<&'static str>,
    }

    impl ToolRunner for FakeTools {
        fn run(&mut self, invocation: &Invocation) -> Result<(), ToolError> {
            self.calls.push(invocation.clone());
            let script = invocation.args.first().cloned().unwrap_or_default();
            if let Some(fail) = self.fail_on {
                if script.ends_with(fail) {
                    return Err(ToolError::Failed {
                        command: invocation.describe(),
                        code: Some(1),
                    });
                }
            }
            if script.ends_with("strtbl.py") {
                let target = PathBuf::from(&invocation.args[2]);
                let produced = match invocation.args[1].as_str() {
                    "dec" => target.with_extension("json"),
                    _ => target.with_extension("strtbl"),
                };
                if !produced.exists() {
                    fs::write(produced, "{}").unwrap();
                }
            }
            Ok(())
        }
    }

    fn game_dir() -> (TempDir, ResolvedPaths, Library) {
        let dir = tempdir().unwrap();
        let config = SyncConfig::default();
        let paths = config.resolve(&dir.path().join("mcsync.yaml"), None);
        fs::create_dir_all(paths.music_root.join("Rock")).unwrap();
        fs::create_dir_all(&paths.playlist_dir).unwrap();
        fs::create_dir_all(&paths.strings_dir).unwrap();
        let library = Library::new(
            paths.layout(),
            config.namespace.clone(),
            config.manifests.clone(),
            config.text_table.clone(),
        );
        (dir, paths, library)
    }

    fn scripts(calls: &[Invocation]) -> Vec<String> {
        calls
            .iter()
            .map(|call| {
                let script = Path::new(&call.args[0])
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                format!("{} {}", script, call.args[1])
            })
            .collect()
    }

    #[test]
    fn full_run_syncs_and_encodes() {
        let (_dir, paths, library) = game_dir();
        fs::write(paths.music_root.join("Rock").join("Queen - Song.wav"), b"x").unwrap();
        fs::write(&paths.strtbl_file, b"bin").unwrap();

        let mut runner = FakeTools::default();
        let summary = Pipeline::new(
            paths.clone(),
            library,
            &mut runner,
            answers(&[true, true, true]),
            PipelineOptions::default(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.halt, Halt::Completed { archives_encoded: true });
        assert_eq!(summary.sync.unwrap().renamed.len(), 1);
        assert!(paths.music_root.join("Rock").join("Queen_Song.wav").exists());
        assert!(paths.strtbl_file.exists());
        assert!(!paths.strtbl_json.exists());
        assert_eq!(
            scripts(&runner.calls),
            ["strtbl.py dec", "strtbl.py enc", "dave.py B", "hash_build.py B"]
        );
        assert!(!summary.visited.contains(&Stage::BuildStreams));
    }

    #[test]
    fn declined_listing_mutates_nothing() {
        let (_dir, paths, library) = game_dir();
        let raw = paths.music_root.join("Rock").join("Queen - Song.wav");
        fs::write(&raw, b"x").unwrap();

        let mut runner = FakeTools::default();
        let mut checkpoint = answers(&[true, false]);
        let summary = Pipeline::new(
            paths.clone(),
            library,
            &mut runner,
            &mut checkpoint,
            PipelineOptions::default(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.halt, Halt::Declined(Gate::ListingComplete));
        assert_eq!(checkpoint.1, [Gate::TracksDropped, Gate::ListingComplete]);
        assert!(raw.exists());
        assert!(!paths.playlist_dir.join("sd.play").exists());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn empty_library_asks_before_continuing() {
        let (_dir, paths, library) = game_dir();
        let mut checkpoint = answers(&[true, true, false]);
        let summary = Pipeline::new(
            paths.clone(),
            library,
            FakeTools::default(),
            &mut checkpoint,
            PipelineOptions::default(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.halt, Halt::Completed { archives_encoded: false });
        assert_eq!(
            checkpoint.1,
            [Gate::TracksDropped, Gate::ProceedWithoutTracks, Gate::EncodeArchives]
        );
        assert!(paths.playlist_dir.join("sd.play").exists());
    }

    #[test]
    fn missing_layout_halts_before_any_change() {
        let dir = tempdir().unwrap();
        let config = SyncConfig::default();
        let paths = config.resolve(&dir.path().join("mcsync.yaml"), None);
        let library = Library::new(
            paths.layout(),
            "music",
            config.manifests.clone(),
            config.text_table.clone(),
        );
        let summary = Pipeline::new(
            paths.clone(),
            library,
            FakeTools::default(),
            answers(&[]),
            PipelineOptions::default(),
        )
        .run()
        .unwrap();

        match summary.halt {
            Halt::MissingLayout(missing) => assert_eq!(missing.len(), 3),
            other => panic!("unexpected halt {:?}", other),
        }
    }

    #[test]
    fn archive_decode_failure_is_fatal() {
        let (_dir, paths, library) = game_dir();
        fs::write(&paths.assets_archive, b"dat").unwrap();
        let mut runner = FakeTools {
            fail_on: Some("dave.py"),
            ..FakeTools::default()
        };
        let result = Pipeline::new(
            paths,
            library,
            &mut runner,
            answers(&[true]),
            PipelineOptions::default(),
        )
        .run();

        assert!(matches!(result, Err(PipelineError::Tool(_))));
        assert_eq!(runner.calls.len(), 1);
    }
}
