use std::io::{BufRead, Write};

use colored::Colorize;
use tracing::{info, warn};

/// Operator gates between pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    DecodeArchives,
    TracksDropped,
    ListingComplete,
    ProceedWithoutTracks,
    EncodeArchives,
}

impl Gate {
    pub fn question(self) -> &'static str {
        match self {
            Gate::DecodeArchives => "Decode STREAMS.DAT and ASSETS.DAT?",
            Gate::TracksDropped => {
                "Drop new tracks into STREAMS/Music/<category> as `Artist - Title.ext`. Ready?"
            }
            Gate::ListingComplete => "Is the list of new tracks complete?",
            Gate::ProceedWithoutTracks => "No new `Artist - Title` tracks found. Continue anyway?",
            Gate::EncodeArchives => {
                "Encode back into STREAMS.DAT and ASSETS.DAT? Only if no files are missing."
            }
        }
    }
}

pub trait Checkpoint {
    fn confirm(&mut self, gate: Gate) -> bool;
}

/// Asks on a terminal; anything but `y`/`yes` declines.
pub struct Interactive<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Interactive<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Checkpoint for Interactive<R, W> {
    fn confirm(&mut self, gate: Gate) -> bool {
        if write!(self.output, "\n{} (y/N): ", gate.question().blue())
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(err) => {
                warn!("Failed to read answer for {:?}: {}", gate, err);
                false
            }
        }
    }
}

/// Affirms every gate; used with `--yes` for scripted runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

impl Checkpoint for AutoConfirm {
    fn confirm(&mut self, gate: Gate) -> bool {
        info!("Auto-confirmed {:?}", gate);
        true
    }
}

impl<C: Checkpoint + ?Sized> Checkpoint for &mut C {
    fn confirm(&mut self, gate: Gate) -> bool {
        (**self).confirm(gate)
    }
}

impl<C: Checkpoint + ?Sized> Checkpoint for Box<C> {
    fn confirm(&mut self, gate: Gate) -> bool {
        (**self).confirm(gate)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
