use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::AsyncReadExt;

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl HashAlgorithm {
    /// Guess the algorithm from the length of a hex digest.
    pub fn infer(hex_digest: &str) -> Option<Self> {
        match hex_digest.trim().len() {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(LauncherError::UnsupportedHash(other.to_string())),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

/// Incremental digest over one of the supported algorithms.
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Md5(h) => h.update(bytes),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// A digest a downloaded file must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedHash {
    pub fn new(algorithm: HashAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn sha1(hex: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Sha1, hex)
    }

    /// Accepts `algo:hex` or a bare hex digest. Bare digests of an
    /// unrecognised length are treated as SHA-256, the catalog default.
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let raw = raw.trim();
        if let Some((algo, digest)) = raw.split_once(':') {
            return Ok(Self::new(algo.parse()?, digest));
        }
        let algorithm = HashAlgorithm::infer(raw).unwrap_or(HashAlgorithm::Sha256);
        Ok(Self::new(algorithm, raw))
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex.trim())
    }
}

/// Stream a file through the given digest.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize_hex())
}

/// `Ok(false)` when the file is missing or differs; never errors on absence.
pub async fn file_matches(path: &Path, expected: &ExpectedHash) -> LauncherResult<bool> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(false);
    }
    let actual = hash_file(path, expected.algorithm).await?;
    Ok(expected.matches(&actual))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_algorithm_from_digest_length() {
        assert_eq!(
            HashAlgorithm::infer("d41d8cd98f00b204e9800998ecf8427e"),
            Some(HashAlgorithm::Md5)
        );
        assert_eq!(
            HashAlgorithm::infer("da39a3ee5e6b4b0d3255bfef95601890afd80709"),
            Some(HashAlgorithm::Sha1)
        );
        assert_eq!(HashAlgorithm::infer("abc123"), None);
    }

    #[test]
    fn parse_accepts_prefixed_and_bare_digests() {
        let e = ExpectedHash::parse("SHA-1:DA39A3EE5E6B4B0D3255BFEF95601890AFD80709").unwrap();
        assert_eq!(e.algorithm, HashAlgorithm::Sha1);
        assert_eq!(e.hex, "da39a3ee5e6b4b0d3255bfef95601890afd80709");

        let e = ExpectedHash::parse("abc123").unwrap();
        assert_eq!(e.algorithm, HashAlgorithm::Sha256);

        assert!(ExpectedHash::parse("crc32:0000").is_err());
    }

    #[tokio::test]
    async fn hashes_files_with_each_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(
            hash_file(&path, HashAlgorithm::Md5).await.unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha1).await.unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha256).await.unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn missing_file_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let expected = ExpectedHash::sha1("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert!(!file_matches(&dir.path().join("nope"), &expected).await.unwrap());
    }
}
