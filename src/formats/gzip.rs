//! Gzip (RFC 1952) header parsing, patching, and candidate generation.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Candidate, FormatPlugin, Header};
use crate::process;

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const FLAG_FHCRC: u8 = 1 << 1;
const FLAG_FEXTRA: u8 = 1 << 2;
const FLAG_FNAME: u8 = 1 << 3;
const FLAG_FCOMMENT: u8 = 1 << 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    pub mtime: u32,
    pub os: u8,
    pub flags: u8,
    pub extra: Option<Vec<u8>>,
    pub fname: Option<Vec<u8>>,
    pub fcomment: Option<Vec<u8>>,
}

pub struct GzipFormat;

impl FormatPlugin for GzipFormat {
    fn extension(&self) -> &'static str {
        "gz"
    }

    fn parse_header(&self, path: &Path) -> Option<Header> {
        let data = read_prefix(path, 256)?;
        parse_gzip_header(&data).map(Header::Gzip)
    }

    fn format_header(&self, header: &Header) -> String {
        let Header::Gzip(h) = header else { return String::new() };
        format_gzip_header(h)
    }

    fn patch_header(&self, stream: &[u8], header: &Header) -> Vec<u8> {
        let Header::Gzip(h) = header else { return stream.to_vec() };
        patch_gzip_header(stream, h)
    }

    fn generate_candidates(&self, raw_path: &Path, header: Option<&Header>) -> Vec<Candidate> {
        let Some(src_bytes) = fs::read(raw_path).ok() else {
            return Vec::new();
        };
        let gzip_header = header.and_then(|h| match h {
            Header::Gzip(h) => Some(h),
            _ => None,
        });

        let mut candidates = Vec::new();

        if let Some(h) = gzip_header {
            if let Ok(data) = compress_with_mtime(&src_bytes, h.mtime) {
                candidates.push(Candidate::new("header_match", patch_gzip_header(&data, h)));
            }
        }

        let mut tools = vec!["gzip"];
        if process::probe("pigz") {
            tools.push("pigz");
        }

        let src_str = raw_path.to_string_lossy().into_owned();
        for tool in tools {
            for level in [1u32, 6, 9] {
                for no_name in [true, false] {
                    let rsyncable_options: &[bool] = if tool == "gzip" { &[false, true] } else { &[false] };
                    for &rsyncable in rsyncable_options {
                        let level_flag = format!("-{level}");
                        let mut args = vec![level_flag.as_str()];
                        if no_name {
                            args.push("-n");
                        }
                        if rsyncable {
                            args.push("--rsyncable");
                        }
                        args.push("-c");
                        args.push(src_str.as_str());

                        let Ok(mut data) = process::invoke(tool, &args, None) else {
                            continue;
                        };
                        if let Some(h) = gzip_header {
                            data = patch_gzip_header(&data, h);
                        }
                        let mut label = format!("{tool} -{level}");
                        if no_name {
                            label.push_str(" -n");
                        }
                        if rsyncable {
                            label.push_str(" --rsyncable");
                        }
                        candidates.push(Candidate::new(label, data));
                    }
                }
            }
        }

        candidates
    }
}

fn compress_with_mtime(data: &[u8], mtime: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let mut bytes = encoder.finish()?;
    if bytes.len() >= 8 {
        bytes[4..8].copy_from_slice(&mtime.to_le_bytes());
    }
    Ok(bytes)
}

fn read_prefix(path: &Path, max: usize) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut f = fs::File::open(path).ok()?;
    let mut buf = vec![0u8; max];
    let n = f.read(&mut buf).ok()?;
    buf.truncate(n);
    Some(buf)
}

pub fn parse_gzip_header(data: &[u8]) -> Option<GzipHeader> {
    if data.len() < 10 || data[0..2] != MAGIC {
        return None;
    }
    if data[2] != 8 {
        return None;
    }
    let flags = data[3];
    let mtime = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let os = data[9];
    let mut pos = 10usize;

    let mut extra = None;
    let mut fname = None;
    let mut fcomment = None;

    if flags & FLAG_FEXTRA != 0 {
        if data.len() < pos + 2 {
            return None;
        }
        let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if data.len() < pos + xlen {
            return None;
        }
        extra = Some(data[pos..pos + xlen].to_vec());
        pos += xlen;
    }
    if flags & FLAG_FNAME != 0 {
        let end = find_nul(data, pos)?;
        fname = Some(data[pos..end].to_vec());
        pos = end + 1;
    }
    if flags & FLAG_FCOMMENT != 0 {
        let end = find_nul(data, pos)?;
        fcomment = Some(data[pos..end].to_vec());
    }

    Some(GzipHeader {
        mtime,
        os,
        flags,
        extra,
        fname,
        fcomment,
    })
}

fn find_nul(data: &[u8], from: usize) -> Option<usize> {
    data[from..].iter().position(|&b| b == 0).map(|i| from + i)
}

pub fn format_gzip_header(header: &GzipHeader) -> String {
    let mut lines = vec![
        format!("mtime: {}", header.mtime),
        format!("OS: {}", header.os),
        format!("flags: {:08b}", header.flags),
    ];

    let mut flag_names = Vec::new();
    if header.flags & 1 != 0 {
        flag_names.push("FTEXT");
    }
    if header.flags & FLAG_FHCRC != 0 {
        flag_names.push("FHCRC");
    }
    if header.flags & FLAG_FEXTRA != 0 {
        flag_names.push("FEXTRA");
    }
    if header.flags & FLAG_FNAME != 0 {
        flag_names.push("FNAME");
    }
    if header.flags & FLAG_FCOMMENT != 0 {
        flag_names.push("FCOMMENT");
    }
    lines.push(format!(
        "flag_names: {}",
        if flag_names.is_empty() {
            "(none)".to_string()
        } else {
            flag_names.join(", ")
        }
    ));
    if let Some(extra) = &header.extra {
        lines.push(format!("extra: {} bytes", extra.len()));
    }
    if let Some(fname) = &header.fname {
        lines.push(format!("fname: {}", String::from_utf8_lossy(fname)));
    }
    if let Some(fcomment) = &header.fcomment {
        lines.push(format!("fcomment: {}", String::from_utf8_lossy(fcomment)));
    }
    lines.join("\n")
}

/// Rewrite `data`'s flags, mtime, XFL, OS, and the FEXTRA/FNAME/FCOMMENT
/// blocks to match `header`. CRC fields are left untouched.
pub fn patch_gzip_header(data: &[u8], header: &GzipHeader) -> Vec<u8> {
    if data.len() < 10 {
        return data.to_vec();
    }

    let mut patched = data.to_vec();
    patched[3] = header.flags;
    patched[4..8].copy_from_slice(&header.mtime.to_le_bytes());
    patched[8] = 0; // XFL reset for consistency
    patched[9] = header.os;

    let mut pos = 10usize;

    if header.flags & FLAG_FEXTRA != 0 {
        if let Some(extra) = &header.extra {
            let mut rebuilt = patched[..pos].to_vec();
            rebuilt.extend_from_slice(&(extra.len() as u16).to_le_bytes());
            rebuilt.extend_from_slice(extra);
            rebuilt.extend_from_slice(&patched[pos..]);
            patched = rebuilt;
            pos += 2 + extra.len();
        } else if patched.len() >= pos + 2 {
            let xlen = u16::from_le_bytes([patched[pos], patched[pos + 1]]) as usize;
            let tail_start = (pos + 2 + xlen).min(patched.len());
            patched = [&patched[..pos], &patched[tail_start..]].concat();
        }
    }

    if header.flags & FLAG_FNAME != 0 {
        if let Some(fname) = &header.fname {
            let mut bytes = fname.clone();
            bytes.push(0);
            let mut rebuilt = patched[..pos].to_vec();
            rebuilt.extend_from_slice(&bytes);
            rebuilt.extend_from_slice(&patched[pos..]);
            pos += bytes.len();
            patched = rebuilt;
        } else if let Some(end) = find_nul(&patched, pos) {
            patched = [&patched[..pos], &patched[end + 1..]].concat();
            pos = patched.len();
        }
    }

    if header.flags & FLAG_FCOMMENT != 0 {
        if let Some(fcomment) = &header.fcomment {
            let mut bytes = fcomment.clone();
            bytes.push(0);
            let mut rebuilt = patched[..pos].to_vec();
            rebuilt.extend_from_slice(&bytes);
            rebuilt.extend_from_slice(&patched[pos..]);
            patched = rebuilt;
        } else if let Some(end) = find_nul(&patched, pos) {
            patched = [&patched[..pos], &patched[end + 1..]].concat();
        }
    }

    patched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_gzip_bytes(flags: u8, mtime: u32) -> Vec<u8> {
        let mut data = vec![0x1f, 0x8b, 8, flags];
        data.extend_from_slice(&mtime.to_le_bytes());
        data.push(0); // XFL
        data.push(3); // OS (unix)
        data
    }

    #[test]
    fn parses_minimal_header() {
        let data = minimal_gzip_bytes(0, 12345);
        let header = parse_gzip_header(&data).unwrap();
        assert_eq!(header.mtime, 12345);
        assert_eq!(header.os, 3);
        assert_eq!(header.flags, 0);
        assert!(header.fname.is_none());
    }

    #[test]
    fn rejects_wrong_magic() {
        let data = vec![0u8; 20];
        assert!(parse_gzip_header(&data).is_none());
    }

    #[test]
    fn parses_fname_field() {
        let mut data = minimal_gzip_bytes(FLAG_FNAME, 0);
        data.extend_from_slice(b"hello.txt\0");
        let header = parse_gzip_header(&data).unwrap();
        assert_eq!(header.fname.as_deref(), Some(b"hello.txt".as_slice()));
    }

    #[test]
    fn truncated_fname_without_terminator_is_rejected() {
        let mut data = minimal_gzip_bytes(FLAG_FNAME, 0);
        data.extend_from_slice(b"no_nul_here");
        assert!(parse_gzip_header(&data).is_none());
    }

    #[test]
    fn patch_header_rewrites_mtime_and_flags() {
        let data = minimal_gzip_bytes(0, 1);
        let header = GzipHeader {
            mtime: 999,
            os: 255,
            flags: 0,
            extra: None,
            fname: None,
            fcomment: None,
        };
        let patched = patch_gzip_header(&data, &header);
        assert_eq!(u32::from_le_bytes([patched[4], patched[5], patched[6], patched[7]]), 999);
        assert_eq!(patched[9], 255);
    }

    #[test]
    fn patch_header_inserts_fname_block() {
        let data = minimal_gzip_bytes(0, 0);
        let header = GzipHeader {
            mtime: 0,
            os: 3,
            flags: FLAG_FNAME,
            extra: None,
            fname: Some(b"archive.tar".to_vec()),
            fcomment: None,
        };
        let patched = patch_gzip_header(&data, &header);
        let reparsed = parse_gzip_header(&patched).unwrap();
        assert_eq!(reparsed.fname.as_deref(), Some(b"archive.tar".as_slice()));
    }

    #[test]
    fn format_header_lists_flag_names() {
        let header = GzipHeader {
            mtime: 0,
            os: 3,
            flags: FLAG_FNAME,
            extra: None,
            fname: Some(b"x".to_vec()),
            fcomment: None,
        };
        let text = format_gzip_header(&header);
        assert!(text.contains("FNAME"));
        assert!(text.contains("fname: x"));
    }
}
