//! Torrent metainfo parsing
//!
//! Builds a normalized [`TorrentMeta`] out of a decoded bencode tree,
//! surfacing BitTorrent v1, v2, and hybrid metainfo plus the BEP47
//! extension fields (padding files, per-file SHA1, attributes, symlinks).

use std::path::Path;

use crate::bencode::{self, Mode, Value};

/// Version of the metainfo as declared by the `info` dict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentVersion {
    V1,
    V2,
    Hybrid,
}

/// One file entry from the torrent's file list (or the synthesized single
/// entry for a single-file torrent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub rel_path: String,
    pub length: Option<u64>,
    pub offset: u64,
    /// BEP47 per-file SHA1 digest (20 bytes), when present.
    pub sha1: Option<[u8; 20]>,
    /// BEP47 attribute characters, drawn from `{l, x, h, p}`.
    pub attr: Option<String>,
    /// BEP47 symlink target path components.
    pub symlink_path: Option<Vec<String>>,
}

impl TorrentFile {
    /// Whether this entry is a BEP47 padding file that must never be
    /// produced on disk.
    pub fn is_padding(&self) -> bool {
        self.attr.as_deref().is_some_and(|a| a.contains('p'))
    }
}

/// Normalized torrent metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    pub name: String,
    pub files: Vec<TorrentFile>,
    pub piece_length: u64,
    /// Piece digests: 20 bytes (SHA-1) for v1, 32 bytes (SHA-256) for v2 or
    /// hybrid torrents' v2 layer. This implementation stores the v1 SHA-1
    /// piece list, which is present for `V1` and `Hybrid` torrents.
    pub pieces: Vec<[u8; 20]>,
    pub version: TorrentVersion,
}

impl TorrentMeta {
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length.unwrap_or(0)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    RootNotDict,
    MissingInfo,
    MissingOrInvalidPieceLength,
    MissingOrInvalidPieces,
    PiecesNotMultipleOf20,
    InvalidFilesEntry,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(kind: ParseErrorKind) -> Self {
        ParseError { kind }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self.kind {
            ParseErrorKind::RootNotDict => "torrent root must be a dict",
            ParseErrorKind::MissingInfo => "missing or invalid 'info' dict",
            ParseErrorKind::MissingOrInvalidPieceLength => "missing or invalid 'piece length'",
            ParseErrorKind::MissingOrInvalidPieces => "missing or invalid 'pieces'",
            ParseErrorKind::PiecesNotMultipleOf20 => "'pieces' length is not a multiple of 20",
            ParseErrorKind::InvalidFilesEntry => "invalid 'files' entry",
            ParseErrorKind::OutOfRange => "integer field does not fit in a 64-bit signed value",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("bencode decode failed: {0}")]
    Decode(#[from] bencode::DecodeError),
    #[error("torrent parse failed: {0}")]
    Parse(#[from] ParseError),
}

fn dict_get<'a>(dict: &'a std::collections::BTreeMap<Vec<u8>, Value>, key: &str) -> Option<&'a Value> {
    dict.get(key.as_bytes())
}

/// Narrow an arbitrary-precision bencode integer to `i64`, the width every
/// length-bearing field in this model is stored at. Bencode integers are
/// unbounded on the wire; only fields the model actually reads and narrows
/// (`piece length`, a file's `length`) can fail this way — an oversized
/// value in an untouched field never reaches this function.
fn narrow_i64(raw: i128) -> Result<i64, ParseError> {
    i64::try_from(raw).map_err(|_| ParseError::new(ParseErrorKind::OutOfRange))
}

/// Parse a `.torrent` file's already-decoded bytes into a [`TorrentMeta`].
///
/// `source_name_hint` supplies the file stem used as a fallback name when
/// `info.name` is absent.
pub fn parse(meta_bytes: &[u8], source_name_hint: &str) -> Result<TorrentMeta, TorrentError> {
    let root = bencode::decode(meta_bytes, Mode::Lenient)?;
    let root_dict = root.as_dict().ok_or(ParseError::new(ParseErrorKind::RootNotDict))?;

    let info_value = dict_get(root_dict, "info").ok_or(ParseError::new(ParseErrorKind::MissingInfo))?;
    let info = info_value.as_dict().ok_or(ParseError::new(ParseErrorKind::MissingInfo))?;

    let name = dict_get(info, "name")
        .and_then(Value::as_text_lossy)
        .unwrap_or_else(|| stem_of(source_name_hint));

    let version = detect_version(info);

    let piece_length_raw = dict_get(info, "piece length")
        .and_then(Value::as_int)
        .ok_or(ParseError::new(ParseErrorKind::MissingOrInvalidPieceLength))?;
    let piece_length = narrow_i64(piece_length_raw)?;
    if piece_length <= 0 {
        return Err(ParseError::new(ParseErrorKind::MissingOrInvalidPieceLength));
    }
    let piece_length = piece_length as u64;

    let pieces_raw = dict_get(info, "pieces")
        .and_then(Value::as_bytes)
        .ok_or(ParseError::new(ParseErrorKind::MissingOrInvalidPieces))?;
    if pieces_raw.len() % 20 != 0 {
        return Err(ParseError::new(ParseErrorKind::PiecesNotMultipleOf20).into());
    }
    let pieces: Vec<[u8; 20]> = pieces_raw
        .chunks_exact(20)
        .map(|c| {
            let mut h = [0u8; 20];
            h.copy_from_slice(c);
            h
        })
        .collect();

    let files = build_files(info, &name)?;

    Ok(TorrentMeta {
        name,
        files,
        piece_length,
        pieces,
        version,
    })
}

fn stem_of(source_name_hint: &str) -> String {
    Path::new(source_name_hint)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name_hint.to_string())
}

fn detect_version(info: &std::collections::BTreeMap<Vec<u8>, Value>) -> TorrentVersion {
    let is_v2 = dict_get(info, "meta version").and_then(Value::as_int) == Some(2)
        || dict_get(info, "piece layers").is_some();
    if !is_v2 {
        return TorrentVersion::V1;
    }
    if dict_get(info, "pieces").is_some() || dict_get(info, "piece length").is_some() {
        TorrentVersion::Hybrid
    } else {
        TorrentVersion::V2
    }
}

fn build_files(
    info: &std::collections::BTreeMap<Vec<u8>, Value>,
    name: &str,
) -> Result<Vec<TorrentFile>, ParseError> {
    let mut files = Vec::new();
    let mut offset: u64 = 0;

    if let Some(files_value) = dict_get(info, "files") {
        let entries = files_value
            .as_list()
            .ok_or(ParseError::new(ParseErrorKind::InvalidFilesEntry))?;
        for entry in entries {
            let Some(fe) = entry.as_dict() else { continue };

            let length = match dict_get(fe, "length").and_then(Value::as_int) {
                Some(raw) => Some(narrow_i64(raw)?.max(0) as u64),
                None => None,
            };

            let Some(parts_value) = dict_get(fe, "path") else { continue };
            let Some(parts) = parts_value.as_list() else { continue };
            if parts.is_empty() {
                continue;
            }
            let mut components = Vec::with_capacity(parts.len());
            let mut ok = true;
            for part in parts {
                match part.as_bytes() {
                    Some(b) => components.push(String::from_utf8_lossy(b).into_owned()),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                continue;
            }

            let sha1 = extract_sha1(fe);
            let attr = dict_get(fe, "attr").and_then(Value::as_text_lossy);
            let symlink_path = dict_get(fe, "symlink path")
                .and_then(Value::as_list)
                .map(|parts| parts.iter().filter_map(Value::as_text_lossy).collect());

            files.push(TorrentFile {
                rel_path: components.join("/"),
                length,
                offset,
                sha1,
                attr,
                symlink_path,
            });
            offset += length.unwrap_or(0);
        }
    } else {
        let length = match dict_get(info, "length").and_then(Value::as_int) {
            Some(raw) => Some(narrow_i64(raw)?.max(0) as u64),
            None => None,
        };
        let sha1 = extract_sha1(info);
        let attr = dict_get(info, "attr").and_then(Value::as_text_lossy);

        files.push(TorrentFile {
            rel_path: name.to_string(),
            length,
            offset,
            sha1,
            attr,
            symlink_path: None,
        });
    }

    Ok(files)
}

fn extract_sha1(dict: &std::collections::BTreeMap<Vec<u8>, Value>) -> Option<[u8; 20]> {
    let bytes = dict_get(dict, "sha1").and_then(Value::as_bytes)?;
    if bytes.len() == 20 {
        let mut h = [0u8; 20];
        h.copy_from_slice(bytes);
        Some(h)
    } else {
        None
    }
}
