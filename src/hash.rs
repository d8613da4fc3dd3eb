//! Piece digests.
//!
//! BitTorrent v1 pieces are verified with SHA-1; v2 and hybrid pieces with
//! SHA-256. Both are pure functions over a byte slice.

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::torrent::TorrentVersion;

pub fn sha1_piece(data: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256_piece(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// The hash algorithm used to compare a candidate's first piece against the
/// torrent's recorded digest. v1 torrents compare with SHA-1; v2 and hybrid
/// torrents compare with SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceHashAlgo {
    Sha1,
    Sha256,
}

impl PieceHashAlgo {
    pub fn for_version(version: TorrentVersion) -> Self {
        match version {
            TorrentVersion::V1 => PieceHashAlgo::Sha1,
            TorrentVersion::V2 | TorrentVersion::Hybrid => PieceHashAlgo::Sha256,
        }
    }

    /// Hash `data` with this algorithm and compare against `target`, the
    /// raw digest bytes recorded in the torrent's `pieces` list.
    ///
    /// `pieces` entries are always 20-byte SHA-1 digests (the classic v1
    /// field is present on hybrid torrents too). A v2/hybrid comparison
    /// hashes the candidate with SHA-256 and compares the resulting 32
    /// bytes against that 20-byte target, so it can never succeed; this
    /// mirrors the reference implementation's behavior rather than
    /// papering over it.
    pub fn matches_target(self, data: &[u8], target: &[u8]) -> bool {
        match self {
            PieceHashAlgo::Sha1 => sha1_piece(data).as_slice() == target,
            PieceHashAlgo::Sha256 => sha256_piece(data).as_slice() == target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_matches_known_digest() {
        let digest = sha1_piece(b"");
        assert_eq!(hex::encode(digest), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn sha256_is_deterministic_and_32_bytes() {
        let a = sha256_piece(b"piece data");
        let b = sha256_piece(b"piece data");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn algo_selection_follows_version() {
        assert_eq!(PieceHashAlgo::for_version(TorrentVersion::V1), PieceHashAlgo::Sha1);
        assert_eq!(PieceHashAlgo::for_version(TorrentVersion::V2), PieceHashAlgo::Sha256);
        assert_eq!(PieceHashAlgo::for_version(TorrentVersion::Hybrid), PieceHashAlgo::Sha256);
    }

    #[test]
    fn sha1_algo_matches_sha1_target() {
        let target = sha1_piece(b"piece data");
        assert!(PieceHashAlgo::Sha1.matches_target(b"piece data", &target));
        assert!(!PieceHashAlgo::Sha1.matches_target(b"other data", &target));
    }

    #[test]
    fn sha256_algo_never_matches_a_20_byte_target() {
        let target = sha1_piece(b"piece data");
        assert!(!PieceHashAlgo::Sha256.matches_target(b"piece data", &target));
    }
}
