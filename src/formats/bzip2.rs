//! Bzip2 header parsing, patching, and candidate generation.
//!
//! Bzip2's header carries far less than gzip's: a three-byte magic and a
//! single ASCII digit encoding the compression level (which also fixes the
//! block size at `level * 100_000` bytes).

use std::fs;
use std::io::Write;
use std::path::Path;

use bzip2::write::BzEncoder;
use bzip2::Compression;

use super::{Candidate, FormatPlugin, Header};
use crate::process;

const MAGIC: &[u8; 3] = b"BZh";
const LEVEL_BYTE_POS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bzip2Header {
    pub level: u8,
    pub block_size: u32,
}

pub struct Bzip2Format;

impl FormatPlugin for Bzip2Format {
    fn extension(&self) -> &'static str {
        "bz2"
    }

    fn parse_header(&self, path: &Path) -> Option<Header> {
        let data = read_prefix(path, 4)?;
        parse_bzip2_header(&data).map(Header::Bzip2)
    }

    fn format_header(&self, header: &Header) -> String {
        let Header::Bzip2(h) = header else { return String::new() };
        format_bzip2_header(h)
    }

    fn patch_header(&self, stream: &[u8], header: &Header) -> Vec<u8> {
        let Header::Bzip2(h) = header else { return stream.to_vec() };
        patch_bzip2_header(stream, h)
    }

    fn generate_candidates(&self, raw_path: &Path, header: Option<&Header>) -> Vec<Candidate> {
        let Ok(src_bytes) = fs::read(raw_path) else {
            return Vec::new();
        };
        let bzip2_header = header.and_then(|h| match h {
            Header::Bzip2(h) => Some(h),
            _ => None,
        });

        let mut candidates = Vec::new();

        if let Some(h) = bzip2_header {
            if let Ok(data) = compress_at_level(&src_bytes, h.level) {
                candidates.push(Candidate::new("header_match", data));
            }
        }

        let mut tools = vec!["bzip2"];
        if process::probe("pbzip2") {
            tools.push("pbzip2");
        }

        let src_str = raw_path.to_string_lossy().into_owned();
        for tool in tools {
            for level in [1u32, 6, 9] {
                let level_flag = format!("-{level}");
                let args = [level_flag.as_str(), "-c", src_str.as_str()];
                let Ok(data) = process::invoke(tool, &args, None) else {
                    continue;
                };
                candidates.push(Candidate::new(format!("{tool} -{level}"), data));
            }
        }

        candidates
    }
}

fn compress_at_level(data: &[u8], level: u8) -> std::io::Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level as u32));
    encoder.write_all(data)?;
    encoder.finish()
}

fn read_prefix(path: &Path, max: usize) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut f = fs::File::open(path).ok()?;
    let mut buf = vec![0u8; max];
    let n = f.read(&mut buf).ok()?;
    buf.truncate(n);
    Some(buf)
}

pub fn parse_bzip2_header(data: &[u8]) -> Option<Bzip2Header> {
    if data.len() < 4 || &data[0..3] != MAGIC {
        return None;
    }
    let level_byte = data[LEVEL_BYTE_POS];
    if !(b'1'..=b'9').contains(&level_byte) {
        return None;
    }
    let level = level_byte - b'0';
    Some(Bzip2Header {
        level,
        block_size: level as u32 * 100_000,
    })
}

pub fn format_bzip2_header(header: &Bzip2Header) -> String {
    format!(
        "compression level: {}\nblock size: {} bytes ({} KB)",
        header.level,
        header.block_size,
        header.block_size / 1000
    )
}

/// Rewrite the single compression-level byte in `data` to match `header`.
pub fn patch_bzip2_header(data: &[u8], header: &Bzip2Header) -> Vec<u8> {
    if data.len() < 4 || &data[0..3] != MAGIC {
        return data.to_vec();
    }
    let mut patched = data.to_vec();
    patched[LEVEL_BYTE_POS] = b'0' + header.level;
    patched
}
