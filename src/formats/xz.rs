//! XZ (`.xz`) header parsing, patching, and candidate generation.

use std::fs;
use std::io::Write;
use std::path::Path;

use xz2::write::XzEncoder;

use super::{Candidate, FormatPlugin, Header};
use crate::process;

const MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const HEADER_MIN_SIZE: usize = 12;
const STREAM_FLAGS_CRC64: u16 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XzHeader {
    pub flags: u16,
    pub has_crc64: bool,
}

pub struct XzFormat;

impl FormatPlugin for XzFormat {
    fn extension(&self) -> &'static str {
        "xz"
    }

    fn parse_header(&self, path: &Path) -> Option<Header> {
        let data = read_prefix(path, HEADER_MIN_SIZE)?;
        parse_xz_header(&data).map(Header::Xz)
    }

    fn format_header(&self, header: &Header) -> String {
        let Header::Xz(h) = header else { return String::new() };
        format_xz_header(h)
    }

    fn patch_header(&self, stream: &[u8], header: &Header) -> Vec<u8> {
        let Header::Xz(h) = header else { return stream.to_vec() };
        patch_xz_header(stream, h)
    }

    fn generate_candidates(&self, raw_path: &Path, header: Option<&Header>) -> Vec<Candidate> {
        let Ok(src_bytes) = fs::read(raw_path) else {
            return Vec::new();
        };
        let xz_header = header.and_then(|h| match h {
            Header::Xz(h) => Some(h),
            _ => None,
        });

        let mut candidates = Vec::new();

        if let Some(h) = xz_header {
            if let Ok(data) = compress_default(&src_bytes) {
                candidates.push(Candidate::new("header_match", patch_xz_header(&data, h)));
            }
        }

        let mut tools = vec!["xz"];
        if process::probe("pixz") {
            tools.push("pixz");
        }

        let src_str = raw_path.to_string_lossy().into_owned();
        for tool in tools {
            for level in [0u32, 6, 9] {
                let level_flag = format!("-{level}");
                let args = [level_flag.as_str(), "-c", "--stdout", src_str.as_str()];
                let Ok(mut data) = process::invoke(tool, &args, None) else {
                    continue;
                };
                if let Some(h) = xz_header {
                    data = patch_xz_header(&data, h);
                }
                candidates.push(Candidate::new(format!("{tool} -{level}"), data));
            }
        }

        candidates
    }
}

fn compress_default(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = XzEncoder::new(Vec::new(), 6);
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

pub fn parse_xz_header(data: &[u8]) -> Option<XzHeader> {
    if data.len() < HEADER_MIN_SIZE || data[0..6] != MAGIC {
        return None;
    }
    let flags = u16::from_le_bytes([data[6], data[7]]);
    let has_crc64 = flags & STREAM_FLAGS_CRC64 != 0;
    Some(XzHeader { flags, has_crc64 })
}

pub fn format_xz_header(header: &XzHeader) -> String {
    format!("flags: {:04x}\nhas_crc64: {}", header.flags, header.has_crc64)
}

/// Rewrite the stream-flags field (bytes 6-7) of `data` to match `header`.
/// The stored CRC32 is left untouched.
pub fn patch_xz_header(data: &[u8], header: &XzHeader) -> Vec<u8> {
    if data.len() < HEADER_MIN_SIZE || data[0..6] != MAGIC {
        return data.to_vec();
    }
    let mut patched = data.to_vec();
    patched[6..8].copy_from_slice(&header.flags.to_le_bytes());
    patched
}
