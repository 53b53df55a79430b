use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Computes the content hash used for deduplication.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, path: &Path) -> std::io::Result<String>;
}

/// Streaming SHA-256 over the file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, path: &Path) -> std::io::Result<String> {
        hash_file(path)
    }
}

/// SHA-256 of the file contents as lowercase hex. Depends only on the
/// bytes, never on the path.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    hash_reader(BufReader::new(file))
}

pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
