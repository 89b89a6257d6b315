use std::fs;
use std::path::{Path, PathBuf};

use common::parse_track_name;
use tracing::{info, warn};

use crate::external::{ToolRunner, Tools};
use crate::pipeline::PipelineError;

const STREAM_EXT: &str = "rsm";
const WAVE_EXT: &str = "wav";
const AUDIO_EXTS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac", "wma", "aiff", "opus"];

#[derive(Clone, Debug, Default)]
pub struct StreamReport {
    pub built: Vec<PathBuf>,
    pub transcoded: usize,
    /// Sources kept because the build tool produced no stream file.
    pub missing_output: Vec<PathBuf>,
    /// Files still named `Artist - Title`; they wait for the next sync.
    pub not_canonical: Vec<PathBuf>,
    /// Files that are neither audio nor stream files.
    pub ignored: Vec<PathBuf>,
}

/// Converts every canonically named audio file into the streaming format,
/// deleting the source and intermediate waveform once the stream file exists.
pub fn build_streams<R: ToolRunner>(
    music_root: &Path,
    tools: &Tools,
    runner: &mut R,
) -> Result<StreamReport, PipelineError> {
    let mut report = StreamReport::default();
    for (category, dir) in library::category_dirs(music_root)? {
        for source in library::category_files(&dir)? {
            if !source.exists() {
                continue;
            }
            let ext = extension_lower(&source);
            if ext == STREAM_EXT {
                continue;
            }
            if !AUDIO_EXTS.contains(&ext.as_str()) {
                report.ignored.push(source);
                continue;
            }
            let stem = match source.file_stem() {
                Some(stem) => stem.to_string_lossy().to_string(),
                None => continue,
            };
            if parse_track_name(&stem).is_some() {
                warn!("{:?} was not renamed; leaving it for the next sync", source);
                report.not_canonical.push(source);
                continue;
            }
            let is_wave = ext == WAVE_EXT;
            let wave = if is_wave {
                source.clone()
            } else {
                dir.join(format!("{}.{}", stem, WAVE_EXT))
            };
            let stream = dir.join(format!("{}.{}", stem, STREAM_EXT));

            if !is_wave && !wave.exists() {
                info!("Converting {:?} to WAV ({})", source, category);
                runner.run(&tools.transcode_to_wav(&source, &wave))?;
                report.transcoded += 1;
            }

            info!("Building stream for {:?}", wave);
            runner.run(&tools.build_stream(&wave))?;

            if !stream.exists() {
                warn!("No stream produced for {:?}; keeping sources", source);
                report.missing_output.push(source);
                continue;
            }
            if !is_wave {
                remove_if_exists(&source)?;
            }
            remove_if_exists(&wave)?;
            report.built.push(stream);
        }
    }
    Ok(report)
}

fn extension_lower(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn remove_if_exists(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::external::{Invocation, ToolError};
    use tempfile::tempdir;

    /// Mimics ffmpeg and the stream builder by creating their outputs.
    struct FakeBuilder {
        calls: Vec<Invocation>,
        produce_streams: bool,
    }

    impl ToolRunner for FakeBuilder {
        fn run(&mut self, invocation: &Invocation) -> Result<(), ToolError> {
            self.calls.push(invocation.clone());
            let last = PathBuf::from(invocation.args.last().cloned().unwrap_or_default());
            if invocation.args.iter().any(|arg| arg == "pcm_s16le") {
                fs::write(&last, b"wav").unwrap();
            } else if !last.exists() {
                return Err(ToolError::Failed {
                    command: invocation.describe(),
                    code: Some(1),
                });
            } else if self.produce_streams {
                fs::write(last.with_extension("rsm"), b"rsm").unwrap();
            }
            Ok(())
        }
    }

    #[test]
    fn builds_streams_and_cleans_up() {
        let dir = tempdir().unwrap();
        let rock = dir.path().join("Music").join("Rock");
        fs::create_dir_all(&rock).unwrap();
        fs::write(rock.join("A_B.mp3"), b"mp3").unwrap();
        fs::write(rock.join("C_D.wav"), b"wav").unwrap();
        fs::write(rock.join("E_F.rsm"), b"rsm").unwrap();

        let paths = SyncConfig::default().resolve(&dir.path().join("mcsync.yaml"), None);
        let tools = Tools::new(&paths);
        let mut runner = FakeBuilder {
            calls: Vec::new(),
            produce_streams: true,
        };
        let report = build_streams(&dir.path().join("Music"), &tools, &mut runner).unwrap();

        assert_eq!(report.transcoded, 1);
        assert_eq!(report.built.len(), 2);
        assert_eq!(runner.calls.len(), 3);
        let mut names: Vec<String> = fs::read_dir(&rock)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["A_B.rsm", "C_D.rsm", "E_F.rsm"]);
    }

    #[test]
    fn keeps_sources_when_no_stream_is_produced() {
        let dir = tempdir().unwrap();
        let rock = dir.path().join("Music").join("Rock");
        fs::create_dir_all(&rock).unwrap();
        fs::write(rock.join("A_B.mp3"), b"mp3").unwrap();

        let paths = SyncConfig::default().resolve(&dir.path().join("mcsync.yaml"), None);
        let mut runner = FakeBuilder {
            calls: Vec::new(),
            produce_streams: false,
        };
        let report =
            build_streams(&dir.path().join("Music"), &Tools::new(&paths), &mut runner).unwrap();

        assert_eq!(report.missing_output, [rock.join("A_B.mp3")]);
        assert!(rock.join("A_B.mp3").exists());
        assert!(rock.join("A_B.wav").exists());
    }

    fn run_streams(music: &Path, produce_streams: bool) -> (StreamReport, FakeBuilder) {
        let paths = SyncConfig::default().resolve(&music.join("mcsync.yaml"), None);
        let mut runner = FakeBuilder {
            calls: Vec::new(),
            produce_streams,
        };
        let report = build_streams(music, &Tools::new(&paths), &mut runner).unwrap();
        (report, runner)
    }

    #[test]
    fn uppercase_wave_source_is_built_in_place() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("Music");
        let rock = music.join("Rock");
        fs::create_dir_all(&rock).unwrap();
        fs::write(rock.join("Queen_Song.WAV"), b"wav").unwrap();

        let (report, runner) = run_streams(&music, true);

        assert_eq!(report.transcoded, 0);
        assert_eq!(report.built, [rock.join("Queen_Song.rsm")]);
        assert_eq!(
            runner.calls[0].args.last().map(PathBuf::from),
            Some(rock.join("Queen_Song.WAV"))
        );
        assert!(!rock.join("Queen_Song.WAV").exists());
    }

    #[test]
    fn raw_named_and_non_audio_files_are_left_alone() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("Music");
        let rock = music.join("Rock");
        fs::create_dir_all(&rock).unwrap();
        fs::write(rock.join("Queen_Song.rsm"), b"rsm").unwrap();
        fs::write(rock.join("Queen - Song.mp3"), b"mp3").unwrap();
        fs::write(rock.join("notes.txt"), b"text").unwrap();

        let (report, runner) = run_streams(&music, true);

        assert!(runner.calls.is_empty());
        assert!(report.built.is_empty());
        assert_eq!(report.not_canonical, [rock.join("Queen - Song.mp3")]);
        assert_eq!(report.ignored, [rock.join("notes.txt")]);
        assert!(rock.join("Queen - Song.mp3").exists());
        assert!(rock.join("notes.txt").exists());
    }
}
