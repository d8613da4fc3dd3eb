//! Format plugins.
//!
//! Each supported compression format exposes header introspection and
//! candidate generation behind a common trait, so the planner can dispatch
//! on a file's extension without knowing the wire format underneath.

pub mod bzip2;
pub mod gzip;
pub mod xz;
pub mod zstd;

use std::path::Path;

/// A parsed, format-specific header. Only the fields needed to reproduce a
/// byte-exact stream are retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Gzip(gzip::GzipHeader),
    Bzip2(bzip2::Bzip2Header),
    Xz(xz::XzHeader),
    Zstd(zstd::ZstdHeader),
}

/// One candidate reproduction of a compressed stream: a label describing
/// how it was produced, and the resulting bytes.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub label: String,
    pub bytes: Vec<u8>,
}

impl Candidate {
    fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Candidate {
            label: label.into(),
            bytes,
        }
    }
}

/// A compression format the recovery engine knows how to reproduce.
pub trait FormatPlugin: Sync {
    /// The extension (without leading dot) this plugin is registered under.
    fn extension(&self) -> &'static str;

    /// Parse the format-specific header from the start of `path`.
    fn parse_header(&self, path: &Path) -> Option<Header>;

    /// Stable multi-line human-readable rendering of `header`.
    fn format_header(&self, header: &Header) -> String;

    /// Rewrite the parameter bytes of `stream` to match `header`. CRCs are
    /// never recomputed; this is a best-effort textual alignment validated
    /// downstream by piece-hash comparison.
    fn patch_header(&self, stream: &[u8], header: &Header) -> Vec<u8>;

    /// Produce candidate reproductions of `raw_path`, optionally steered by
    /// a reference `header` recovered from a partial download.
    fn generate_candidates(&self, raw_path: &Path, header: Option<&Header>) -> Vec<Candidate>;
}

/// Look up the plugin registered for a file extension (without the dot).
pub fn plugin_for_extension(ext: &str) -> Option<&'static dyn FormatPlugin> {
    match ext {
        "gz" => Some(&gzip::GzipFormat),
        "bz2" => Some(&bzip2::Bzip2Format),
        "xz" => Some(&xz::XzFormat),
        "zst" => Some(&zstd::ZstdFormat),
        _ => None,
    }
}
