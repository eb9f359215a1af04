//! Streaming checksum calculation
//!
//! Checksums feed the diff comparer's content check. Files above the
//! configured ceiling are deliberately left without a checksum; the
//! comparer then falls back to size equality, which bounds list-time
//! I/O for large trees.

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Supported hash algorithms
///
/// The algorithm must stay consistent within one sync session so that
/// checksums from both endpoints are comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    Md5,
    #[default]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Parses a configuration name (`md5`, `sha256`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// Calculator configuration
#[derive(Debug, Clone, Copy)]
pub struct ChecksumOptions {
    /// Files larger than this are not checksummed (0 = unlimited)
    pub max_size: u64,

    /// Read buffer size
    pub buffer_size: usize,
}

impl Default for ChecksumOptions {
    fn default() -> Self {
        Self {
            max_size: 100 * 1024 * 1024,
            buffer_size: 32 * 1024,
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => hex_encode(&h.finalize()),
            Hasher::Sha256(h) => hex_encode(&h.finalize()),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Streams a reader through the hasher
///
/// Returns `None` when the stream exceeds `options.max_size`; the
/// caller records an empty checksum in that case.
pub async fn compute<R>(
    mut reader: R,
    algorithm: ChecksumAlgorithm,
    options: ChecksumOptions,
) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; options.buffer_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        if options.max_size > 0 && total > options.max_size {
            return Ok(None);
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Some(hasher.finalize_hex()))
}
