use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::config::ResolvedPaths;

const ARCHIVE_SCRIPT: &str = "dave.py";
const STREAMS_SCRIPT: &str = "hash_build.py";
const STREAMS_NAME_LIST: &str = "STREAMS.LST";
const STRTBL_SCRIPT: &str = "strtbl.py";
const RSTM_SCRIPT: &str = "rstm_build.py";

/// One blocking call to an external collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn describe(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

pub trait ToolRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<(), ToolError>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &mut T {
    fn run(&mut self, invocation: &Invocation) -> Result<(), ToolError> {
        (**self).run(invocation)
    }
}

/// Runs tools as child processes with inherited stdio, so their own
/// diagnostics reach the operator unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<(), ToolError> {
        info!("Running {}", invocation.describe());
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .status()
            .map_err(|source| ToolError::Spawn {
                command: invocation.describe(),
                source,
            })?;
        debug!("{} exited with {}", invocation.program.display(), status);
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                command: invocation.describe(),
                code: status.code(),
            })
        }
    }
}

#[derive(Debug)]
pub enum ToolError {
    Spawn {
        command: String,
        source: std::io::Error,
    },
    Failed {
        command: String,
        code: Option<i32>,
    },
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Spawn { command, source } => {
                write!(f, "failed to start `{}`: {}", command, source)
            }
            ToolError::Failed {
                command,
                code: Some(code),
            } => write!(f, "`{}` exited with status {}", command, code),
            ToolError::Failed { command, code: None } => {
                write!(f, "`{}` was terminated by a signal", command)
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Command lines for every external collaborator the pipeline drives.
#[derive(Clone, Debug)]
pub struct Tools {
    python: PathBuf,
    ffmpeg: PathBuf,
    dir: PathBuf,
    cwd: PathBuf,
}

impl Tools {
    pub fn new(paths: &ResolvedPaths) -> Self {
        Self {
            python: paths.python.clone(),
            ffmpeg: paths.ffmpeg.clone(),
            dir: paths.tools_dir.clone(),
            cwd: paths.base.clone(),
        }
    }

    pub fn decode_assets(&self, archive: &Path) -> Invocation {
        self.script(ARCHIVE_SCRIPT, vec!["X".to_string(), path_arg(archive)])
    }

    pub fn encode_assets(&self, dir: &Path, archive: &Path) -> Invocation {
        let mut args: Vec<String> = ["B", "-ca", "-cn", "-cf", "-fc", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(path_arg(dir));
        args.push(path_arg(archive));
        self.script(ARCHIVE_SCRIPT, args)
    }

    pub fn decode_streams(&self, archive: &Path) -> Invocation {
        self.script(
            STREAMS_SCRIPT,
            vec![
                "X".to_string(),
                path_arg(archive),
                "-nl".to_string(),
                path_arg(&self.dir.join(STREAMS_NAME_LIST)),
                "-a".to_string(),
                "mclub".to_string(),
                "-th".to_string(),
                "45".to_string(),
            ],
        )
    }

    pub fn encode_streams(&self, dir: &Path, archive: &Path) -> Invocation {
        self.script(
            STREAMS_SCRIPT,
            vec![
                "B".to_string(),
                path_arg(dir),
                path_arg(archive),
                "-a".to_string(),
                "MClub".to_string(),
            ],
        )
    }

    pub fn decode_text_table(&self, strtbl: &Path) -> Invocation {
        self.script(STRTBL_SCRIPT, vec!["dec".to_string(), path_arg(strtbl)])
    }

    pub fn encode_text_table(&self, json: &Path) -> Invocation {
        self.script(STRTBL_SCRIPT, vec!["enc".to_string(), path_arg(json)])
    }

    /// Normalizes any source into 2-channel 44.1kHz 16-bit PCM.
    pub fn transcode_to_wav(&self, source: &Path, wav: &Path) -> Invocation {
        Invocation {
            program: self.ffmpeg.clone(),
            args: vec![
                "-y".to_string(),
                "-i".to_string(),
                path_arg(source),
                "-ac".to_string(),
                "2".to_string(),
                "-ar".to_string(),
                "44100".to_string(),
                "-acodec".to_string(),
                "pcm_s16le".to_string(),
                path_arg(wav),
            ],
            cwd: self.cwd.clone(),
        }
    }

    pub fn build_stream(&self, wav: &Path) -> Invocation {
        self.script(RSTM_SCRIPT, vec![path_arg(wav)])
    }

    fn script(&self, script: &str, args: Vec<String>) -> Invocation {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(path_arg(&self.dir.join(script)));
        full.extend(args);
        Invocation {
            program: self.python.clone(),
            args: full,
            cwd: self.cwd.clone(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
