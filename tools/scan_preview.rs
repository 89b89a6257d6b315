use std::env;
use std::path::PathBuf;

use library::scan_candidates;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let music_root = args
        .next()
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let namespace = args
        .next()
        .unwrap_or_else(|| common::DEFAULT_NAMESPACE.to_string());

    let root = PathBuf::from(&music_root);
    info!("Previewing {:?}", root);
    let report = scan_candidates(&root, &namespace)?;

    for track in &report.candidates {
        println!(
            "{} -> {}  [{}]",
            track.source.path.display(),
            track.target_path().display(),
            track.identity.canonical_id
        );
    }
    println!(
        "Pending: {} tracks, {} files skipped",
        report.candidates.len(),
        report.skipped
    );

    Ok(())
}
