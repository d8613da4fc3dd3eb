use thiserror::Error;

use crate::bencode::DecodeError;
use crate::torrent::{ParseError, TorrentError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("torrent parse failed: {0}")]
    Parse(#[from] ParseError),
}

impl From<TorrentError> for Error {
    fn from(err: TorrentError) -> Self {
        match err {
            TorrentError::Decode(e) => Error::Decode(e),
            TorrentError::Parse(e) => Error::Parse(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
