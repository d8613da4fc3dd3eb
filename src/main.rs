//! Thin composition root: parse arguments, initialize logging, run the
//! recovery planner once, and map its result onto a process exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "torrent-compress-recovery")]
#[command(about = "Reconstructs byte-exact compressed archives referenced by a BitTorrent metainfo file")]
struct Cli {
    /// Path to the .torrent file describing the target layout
    #[arg(short, long)]
    torrent: PathBuf,

    /// Directory containing complete, uncompressed source files
    #[arg(long)]
    raw_dir: PathBuf,

    /// Directory containing partially downloaded compressed files
    #[arg(long)]
    partial_dir: PathBuf,

    /// Directory recovered files are written under
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Overwrite files that already exist at the destination
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Report what would happen without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Reserved for interface parity with the donor recovery tool
    #[arg(long, default_value_t = false)]
    raw_fallback: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let meta_bytes = match std::fs::read(&cli.torrent) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, path = %cli.torrent.display(), "failed to read torrent file");
            return ExitCode::from(1);
        }
    };

    let source_hint = cli.torrent.to_string_lossy().into_owned();
    let meta = match torrent_recovery::torrent::parse(&meta_bytes, &source_hint) {
        Ok(meta) => meta,
        Err(err) => {
            tracing::error!(error = %err, "failed to parse torrent metainfo");
            return ExitCode::from(1);
        }
    };

    let raw_index = torrent_recovery::fsindex::build_index([&cli.raw_dir]);
    let partial_index = torrent_recovery::fsindex::build_index([&cli.partial_dir]);
    let out_root = cli.out_dir.join(&meta.name);

    let options = torrent_recovery::RecoverOptions {
        overwrite: cli.overwrite,
        dry_run: cli.dry_run,
        raw_fallback: cli.raw_fallback,
    };

    match torrent_recovery::recover(&meta, &raw_index, &partial_index, &out_root, &options) {
        Ok(result) => {
            tracing::info!(
                recovered = result.recovered,
                reproduced = result.reproduced_total(),
                skipped = result.skipped,
                missing = result.missing,
                "recovery finished"
            );
            if result.missing > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "recovery run failed");
            ExitCode::from(1)
        }
    }
}
