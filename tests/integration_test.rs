use std::fs;
use std::io::Write;

use tempfile::TempDir;
use torrent_recovery::fsindex::build_index;
use torrent_recovery::torrent::{TorrentFile, TorrentMeta, TorrentVersion};
use torrent_recovery::{recover, RecoverOptions};

fn compress_gzip(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Shell out to the real `gzip` binary the same way the gzip plugin's
/// candidate sweep does, so the fixture bytes built here are exactly one of
/// the candidates `generate_candidates` will produce at recovery time.
fn gzip_cli(path: &std::path::Path, level: u32, no_name: bool) -> Vec<u8> {
    use std::process::Command;
    let mut args = vec![format!("-{level}")];
    if no_name {
        args.push("-n".to_string());
    }
    args.push("-c".to_string());
    args.push(path.to_string_lossy().into_owned());
    let output = Command::new("gzip").args(&args).output().unwrap();
    assert!(output.status.success(), "gzip invocation failed: {:?}", output.status);
    output.stdout
}

fn single_file_meta(rel_path: &str, length: u64, piece_length: u64, pieces: Vec<[u8; 20]>) -> TorrentMeta {
    TorrentMeta {
        name: "demo".to_string(),
        files: vec![TorrentFile {
            rel_path: rel_path.to_string(),
            length: Some(length),
            offset: 0,
            sha1: None,
            attr: None,
            symlink_path: None,
        }],
        piece_length,
        pieces,
        version: TorrentVersion::V1,
    }
}

#[test]
fn direct_partial_reuse_recovers_without_recompression() {
    let temp = TempDir::new().unwrap();
    let raw_dir = temp.path().join("raw");
    let partial_dir = temp.path().join("partial");
    let out_dir = temp.path().join("out");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::create_dir_all(&partial_dir).unwrap();

    let compressed = compress_gzip(b"hello world, this is the file contents");
    fs::write(partial_dir.join("hello.bin.gz"), &compressed).unwrap();

    let piece_length = compressed.len() as u64;
    let target_hash = torrent_recovery::hash::sha1_piece(&compressed);
    let meta = single_file_meta("hello.bin.gz", compressed.len() as u64, piece_length, vec![target_hash]);

    let raw_index = build_index([&raw_dir]);
    let partial_index = build_index([&partial_dir]);
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.recovered, 1);
    assert_eq!(result.missing, 0);
    let written = fs::read(out_dir.join("hello.bin.gz")).unwrap();
    assert_eq!(written, compressed);
}

#[test]
fn unmatched_piece_hash_is_reported_missing() {
    let temp = TempDir::new().unwrap();
    let raw_dir = temp.path().join("raw");
    let out_dir = temp.path().join("out");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::write(raw_dir.join("hello.bin"), b"raw source content").unwrap();

    // A target hash that cannot correspond to any real compression of the raw source.
    let meta = single_file_meta("hello.bin.gz", 100, 64, vec![[0xAB; 20]]);

    let raw_index = build_index([&raw_dir]);
    let partial_index = build_index(Vec::<std::path::PathBuf>::new());
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.recovered, 0);
    assert_eq!(result.reproduced_total(), 0);
    assert_eq!(result.missing, 1);
}

#[test]
fn padding_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("out");

    let mut meta = single_file_meta("pad/1", 10, 16, vec![[0u8; 20]]);
    meta.files[0].attr = Some("p".to_string());

    let raw_index = build_index(Vec::<std::path::PathBuf>::new());
    let partial_index = build_index(Vec::<std::path::PathBuf>::new());
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.total(), 1);
}

#[test]
fn unsupported_extension_is_skipped() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("out");

    let meta = single_file_meta("readme.txt", 10, 16, vec![[0u8; 20]]);

    let raw_index = build_index(Vec::<std::path::PathBuf>::new());
    let partial_index = build_index(Vec::<std::path::PathBuf>::new());
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.skipped, 1);
}

#[test]
fn existing_destination_is_skipped_without_overwrite() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("hello.bin.gz"), b"already here").unwrap();

    let meta = single_file_meta("hello.bin.gz", 10, 16, vec![[0u8; 20]]);

    let raw_index = build_index(Vec::<std::path::PathBuf>::new());
    let partial_index = build_index(Vec::<std::path::PathBuf>::new());
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.skipped, 1);
}

#[test]
fn brute_force_gzip_reproduction_recovers_from_raw_only() {
    let temp = TempDir::new().unwrap();
    let raw_dir = temp.path().join("raw");
    let partial_dir = temp.path().join("partial");
    let out_dir = temp.path().join("out");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::create_dir_all(&partial_dir).unwrap();

    let raw_content =
        b"quick brown fox jumps over the lazy dog repeatedly for testing brute force reproduction paths";
    let raw_path = raw_dir.join("article.txt");
    fs::write(&raw_path, raw_content).unwrap();

    // One of the exact (level, no_name, rsyncable) combinations the gzip
    // plugin's tool sweep tries; no partial file exists, so this can only be
    // recovered via brute-force reproduction off the raw source.
    let expected = gzip_cli(&raw_path, 6, true);
    let piece_length = expected.len() as u64;
    let target_hash = torrent_recovery::hash::sha1_piece(&expected);

    let meta = single_file_meta("article.txt.gz", piece_length, piece_length, vec![target_hash]);

    let raw_index = build_index([&raw_dir]);
    let partial_index = build_index([&partial_dir]);
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.reproduced_gzip, 1);
    assert_eq!(result.recovered, 0);
    assert_eq!(result.missing, 0);

    let written = fs::read(out_dir.join("article.txt.gz")).unwrap();
    assert_eq!(written, expected);
}

#[test]
fn bep47_sha1_gate_recovers_from_raw_when_partial_missing() {
    let temp = TempDir::new().unwrap();
    let raw_dir = temp.path().join("raw");
    let partial_dir = temp.path().join("partial");
    let out_dir = temp.path().join("out");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::create_dir_all(&partial_dir).unwrap();

    let raw_content = b"bep47 gated raw payload used to validate sha1 matched reproduction flow end to end";
    let raw_path = raw_dir.join("payload");
    fs::write(&raw_path, raw_content).unwrap();
    let raw_sha1 = torrent_recovery::hash::sha1_piece(raw_content);

    let expected = gzip_cli(&raw_path, 6, true);
    let piece_length = expected.len() as u64;
    let target_hash = torrent_recovery::hash::sha1_piece(&expected);

    let meta = TorrentMeta {
        name: "demo".to_string(),
        files: vec![
            TorrentFile {
                rel_path: "payload.gz".to_string(),
                length: Some(raw_content.len() as u64),
                offset: 0,
                sha1: Some(raw_sha1),
                attr: None,
                symlink_path: None,
            },
            TorrentFile {
                rel_path: ".padding/1".to_string(),
                length: Some(7),
                offset: raw_content.len() as u64,
                sha1: None,
                attr: Some("p".to_string()),
                symlink_path: None,
            },
        ],
        piece_length,
        pieces: vec![target_hash],
        version: TorrentVersion::V1,
    };

    let raw_index = build_index([&raw_dir]);
    let partial_index = build_index([&partial_dir]);
    let options = RecoverOptions::default();

    let result = recover(&meta, &raw_index, &partial_index, &out_dir, &options).unwrap();

    assert_eq!(result.reproduced_gzip, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.missing, 0);

    let written = fs::read(out_dir.join("payload.gz")).unwrap();
    assert_eq!(written, expected);
}

#[test]
fn parses_torrent_bytes_into_meta() {
    use torrent_recovery::bencode::{self, Mode, Value};
    use std::collections::BTreeMap;

    let mut info = BTreeMap::new();
    info.insert(b"name".to_vec(), Value::Bytes(b"single.bin".to_vec()));
    info.insert(b"length".to_vec(), Value::Int(2048));
    info.insert(b"piece length".to_vec(), Value::Int(1024));
    info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 40]));
    let info_bytes = bencode::encode(&Value::Dict(info));
    let info_value = bencode::decode(&info_bytes, Mode::Strict).unwrap();

    let mut root = BTreeMap::new();
    root.insert(b"info".to_vec(), info_value);
    root.insert(
        b"announce".to_vec(),
        Value::Bytes(b"http://tracker.example:6969/announce".to_vec()),
    );
    let data = bencode::encode(&Value::Dict(root));

    let meta = torrent_recovery::torrent::parse(&data, "single.torrent").unwrap();
    assert_eq!(meta.name, "single.bin");
    assert_eq!(meta.total_length(), 2048);
    assert_eq!(meta.pieces.len(), 2);
}
