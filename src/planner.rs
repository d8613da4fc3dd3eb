//! Recovery planner.
//!
//! Walks a torrent's file list, matches each non-padding compressed entry
//! against the raw and partial-download indices, and either reuses a
//! partial file outright or reproduces the compressed stream byte-for-byte
//! with a format plugin until the first piece hash matches.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::fsindex::{self, BasenameIndex};
use crate::hash::PieceHashAlgo;
use crate::torrent::{TorrentFile, TorrentMeta};
use crate::{error::Error, formats};

/// Counters for one `recover` invocation. `reproduced_*` fields are kept
/// per format so the summary line can attribute reproductions correctly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    pub recovered: u64,
    pub reproduced_gzip: u64,
    pub reproduced_bzip2: u64,
    pub reproduced_xz: u64,
    pub reproduced_zstd: u64,
    pub skipped: u64,
    pub missing: u64,
}

impl RecoveryResult {
    pub fn reproduced_total(&self) -> u64 {
        self.reproduced_gzip + self.reproduced_bzip2 + self.reproduced_xz + self.reproduced_zstd
    }

    pub fn total(&self) -> u64 {
        self.recovered + self.reproduced_total() + self.skipped + self.missing
    }

    fn bump_reproduced(&mut self, ext: &str) {
        match ext {
            "gz" => self.reproduced_gzip += 1,
            "bz2" => self.reproduced_bzip2 += 1,
            "xz" => self.reproduced_xz += 1,
            "zst" => self.reproduced_zstd += 1,
            _ => {}
        }
    }

    fn log_summary(&self) {
        info!(
            recovered = self.recovered,
            reproduced_gzip = self.reproduced_gzip,
            reproduced_bzip2 = self.reproduced_bzip2,
            reproduced_xz = self.reproduced_xz,
            reproduced_zstd = self.reproduced_zstd,
            skipped = self.skipped,
            missing = self.missing,
            "recovery run complete"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverOptions {
    pub overwrite: bool,
    pub dry_run: bool,
    /// Accepted for interface parity with the donor recovery tool; not yet
    /// consulted by any step below.
    pub raw_fallback: bool,
}

/// Recover every format-supported file in `meta` under `out_root`,
/// consulting `raw_index` and `partial_index` for source material. Padding
/// files are counted as skipped rather than recovered.
pub fn recover(
    meta: &TorrentMeta,
    raw_index: &BasenameIndex,
    partial_index: &BasenameIndex,
    out_root: &Path,
    options: &RecoverOptions,
) -> Result<RecoveryResult, Error> {
    let mut result = RecoveryResult::default();
    let algo = PieceHashAlgo::for_version(meta.version);

    for tf in &meta.files {
        process_file(meta, tf, raw_index, partial_index, out_root, options, algo, &mut result)?;
    }

    debug_assert_eq!(result.total(), meta.files.len() as u64, "every file lands in exactly one bucket");
    result.log_summary();
    Ok(result)
}

fn process_file(
    meta: &TorrentMeta,
    tf: &TorrentFile,
    raw_index: &BasenameIndex,
    partial_index: &BasenameIndex,
    out_root: &Path,
    options: &RecoverOptions,
    algo: PieceHashAlgo,
    result: &mut RecoveryResult,
) -> Result<(), Error> {
    if tf.is_padding() {
        result.skipped += 1;
        return Ok(());
    }

    let Some(ext) = extension_of(&tf.rel_path) else {
        result.skipped += 1;
        return Ok(());
    };
    let Some(plugin) = formats::plugin_for_extension(ext) else {
        result.skipped += 1;
        return Ok(());
    };

    let dst = out_root.join(&tf.rel_path);
    if dst.exists() && !options.overwrite {
        result.skipped += 1;
        return Ok(());
    }

    let Some(length) = tf.length else {
        result.missing += 1;
        return Ok(());
    };
    let piece_index = (tf.offset / meta.piece_length) as usize;
    let Some(target_hash) = meta.pieces.get(piece_index) else {
        result.missing += 1;
        return Ok(());
    };

    let expected_name = basename(&tf.rel_path);
    let raw_basename = raw_basename_for(&expected_name, ext);

    // 1) direct partial reuse
    let partial_candidates = partial_index.get(&expected_name);
    let chosen_partial = fsindex::choose_candidate(partial_candidates, Some(length));
    let mut header = None;

    if let Some(partial_path) = &chosen_partial {
        if let Ok(meta_len) = fs::metadata(partial_path).map(|m| m.len()) {
            if meta_len >= meta.piece_length {
                if let Some(piece_data) = read_piece(partial_path, meta.piece_length)? {
                    if algo.matches_target(&piece_data, target_hash) {
                        write_output(partial_path, &dst, options)?;
                        result.recovered += 1;
                        debug!(file = %tf.rel_path, "recovered via direct partial reuse");
                        return Ok(());
                    }
                }
            }
        }
        header = plugin.parse_header(partial_path);
    }

    // 2) BEP47 SHA1 gate
    if let Some(expected_sha1) = tf.sha1 {
        for raw_path in raw_index.get(&raw_basename) {
            if fs::metadata(raw_path).map(|m| m.len()) != Ok(length) {
                continue;
            }
            let file_bytes = fs::read(raw_path)?;
            if crate::hash::sha1_piece(&file_bytes) != expected_sha1 {
                continue;
            }
            let candidates = plugin.generate_candidates(raw_path, header.as_ref());
            if let Some(found) = find_matching_candidate(&candidates, target_hash, meta.piece_length, algo) {
                write_bytes(&found.bytes, &dst, options)?;
                result.bump_reproduced(ext);
                debug!(file = %tf.rel_path, label = %found.label, "reproduced via BEP47 sha1 match");
                return Ok(());
            }
        }
    }

    // 3) brute-force reproduction
    let raw_candidates = raw_index.get(&raw_basename);
    let Some(raw_src) = fsindex::choose_candidate(raw_candidates, None) else {
        result.missing += 1;
        warn!(file = %tf.rel_path, "no raw source found");
        return Ok(());
    };

    let candidates = plugin.generate_candidates(&raw_src, header.as_ref());
    match find_matching_candidate(&candidates, target_hash, meta.piece_length, algo) {
        Some(found) => {
            write_bytes(&found.bytes, &dst, options)?;
            result.bump_reproduced(ext);
            debug!(file = %tf.rel_path, label = %found.label, "reproduced via brute-force search");
        }
        None => {
            result.missing += 1;
            warn!(file = %tf.rel_path, "no candidate reproduced the recorded piece hash");
        }
    }

    Ok(())
}

fn find_matching_candidate<'a>(
    candidates: &'a [formats::Candidate],
    target_hash: &[u8],
    piece_length: u64,
    algo: PieceHashAlgo,
) -> Option<&'a formats::Candidate> {
    let piece_length = piece_length as usize;
    candidates.iter().find(|c| {
        c.bytes.len() >= piece_length && algo.matches_target(&c.bytes[..piece_length], target_hash)
    })
}

fn read_piece(path: &Path, piece_length: u64) -> std::io::Result<Option<Vec<u8>>> {
    use std::io::Read;
    let mut f = fs::File::open(path)?;
    let mut buf = vec![0u8; piece_length as usize];
    let n = f.read(&mut buf)?;
    if (n as u64) < piece_length {
        return Ok(None);
    }
    Ok(Some(buf))
}

fn write_output(src: &Path, dst: &Path, options: &RecoverOptions) -> std::io::Result<()> {
    if !options.dry_run {
        if options.overwrite && dst.exists() {
            fs::remove_file(dst)?;
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

fn write_bytes(bytes: &[u8], dst: &Path, options: &RecoverOptions) -> std::io::Result<()> {
    if !options.dry_run {
        if options.overwrite && dst.exists() {
            fs::remove_file(dst)?;
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dst, bytes)?;
    }
    Ok(())
}

fn extension_of(rel_path: &str) -> Option<&str> {
    Path::new(rel_path).extension().and_then(|e| e.to_str())
}

fn basename(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel_path.to_string())
}

/// Strip the trailing extension, plus (for `.bz2`) an inner producer-convention
/// level tag of the form `.bz[1|6|9]` or `.pbz[1|6|9]`.
fn raw_basename_for(expected_name: &str, ext: &str) -> String {
    let stem = expected_name
        .strip_suffix(&format!(".{ext}"))
        .unwrap_or(expected_name)
        .to_string();
    if ext != "bz2" {
        return stem;
    }
    for tag in [".bz1", ".bz6", ".bz9", ".pbz1", ".pbz6", ".pbz9"] {
        if let Some(stripped) = stem.strip_suffix(tag) {
            return stripped.to_string();
        }
    }
    stem
}
