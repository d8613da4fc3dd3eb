//! Zstandard frame header parsing, patching, and candidate generation.

use std::fs;
use std::path::Path;

use super::{Candidate, FormatPlugin, Header};
use crate::process;

const MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const FRAME_HEADER_MIN_SIZE: usize = 6;
const WINDOWLOG_MASK: u16 = 0x0F;
const SINGLE_SEGMENT_FLAG: u16 = 0x20;
const CHECKSUM_FLAG: u16 = 0x10;
const DICT_ID_FLAG: u16 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZstdHeader {
    pub window_log: u16,
    pub single_segment: bool,
    pub has_checksum: bool,
    pub has_dict_id: bool,
}

pub struct ZstdFormat;

impl FormatPlugin for ZstdFormat {
    fn extension(&self) -> &'static str {
        "zst"
    }

    fn parse_header(&self, path: &Path) -> Option<Header> {
        let data = read_prefix(path, FRAME_HEADER_MIN_SIZE)?;
        parse_zstd_header(&data).map(Header::Zstd)
    }

    fn format_header(&self, header: &Header) -> String {
        let Header::Zstd(h) = header else { return String::new() };
        format_zstd_header(h)
    }

    fn patch_header(&self, stream: &[u8], header: &Header) -> Vec<u8> {
        let Header::Zstd(h) = header else { return stream.to_vec() };
        patch_zstd_header(stream, h)
    }

    fn generate_candidates(&self, raw_path: &Path, header: Option<&Header>) -> Vec<Candidate> {
        let Ok(src_bytes) = fs::read(raw_path) else {
            return Vec::new();
        };
        let zstd_header = header.and_then(|h| match h {
            Header::Zstd(h) => Some(h),
            _ => None,
        });

        let mut candidates = Vec::new();

        if let Some(h) = zstd_header {
            if let Ok(data) = zstd::encode_all(src_bytes.as_slice(), 3) {
                candidates.push(Candidate::new("header_match", patch_zstd_header(&data, h)));
            }
        }

        let mut tools = vec!["zstd"];
        if process::probe("pzstd") {
            tools.push("pzstd");
        }

        let src_str = raw_path.to_string_lossy().into_owned();
        for tool in tools {
            for level in [1i32, 3, 22] {
                let level_flag = format!("-{level}");
                let args = [level_flag.as_str(), "-c", "--stdout", src_str.as_str()];
                let Ok(mut data) = process::invoke(tool, &args, None) else {
                    continue;
                };
                if let Some(h) = zstd_header {
                    data = patch_zstd_header(&data, h);
                }
                candidates.push(Candidate::new(format!("{tool} -{level}"), data));
            }
        }

        candidates
    }
}

fn read_prefix(path: &Path, max: usize) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut f = fs::File::open(path).ok()?;
    let mut buf = vec![0u8; max];
    let n = f.read(&mut buf).ok()?;
    buf.truncate(n);
    Some(buf)
}

pub fn parse_zstd_header(data: &[u8]) -> Option<ZstdHeader> {
    if data.len() < FRAME_HEADER_MIN_SIZE || data[0..4] != MAGIC {
        return None;
    }
    let frame_header = u16::from_le_bytes([data[4], data[5]]);
    Some(ZstdHeader {
        window_log: frame_header & WINDOWLOG_MASK,
        single_segment: frame_header & SINGLE_SEGMENT_FLAG != 0,
        has_checksum: frame_header & CHECKSUM_FLAG != 0,
        has_dict_id: frame_header & DICT_ID_FLAG != 0,
    })
}

pub fn format_zstd_header(header: &ZstdHeader) -> String {
    format!(
        "window_log: {}\nsingle_segment: {}\nhas_checksum: {}\nhas_dict_id: {}",
        header.window_log, header.single_segment, header.has_checksum, header.has_dict_id
    )
}

/// Rewrite the two-byte frame header (bytes 4-5) of `data` to match `header`.
pub fn patch_zstd_header(data: &[u8], header: &ZstdHeader) -> Vec<u8> {
    if data.len() < FRAME_HEADER_MIN_SIZE || data[0..4] != MAGIC {
        return data.to_vec();
    }
    let mut frame_header = header.window_log & WINDOWLOG_MASK;
    if header.single_segment {
        frame_header |= SINGLE_SEGMENT_FLAG;
    }
    if header.has_checksum {
        frame_header |= CHECKSUM_FLAG;
    }
    if header.has_dict_id {
        frame_header |= DICT_ID_FLAG;
    }
    let mut patched = data.to_vec();
    patched[4..6].copy_from_slice(&frame_header.to_le_bytes());
    patched
}
