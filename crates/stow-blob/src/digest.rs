//! Content digests for content-addressed keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK: usize = 8 * 1024;

/// Digest function used to derive content keys. Keys are lowercase hex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, 40 hex characters.
    #[default]
    Sha1,
    /// BLAKE3, 64 hex characters.
    Blake3,
}

impl DigestAlgorithm {
    /// Length of a hex key produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Blake3 => 64,
        }
    }

    /// Start an incremental digest.
    pub fn hasher(self) -> ContentDigest {
        let state = match self {
            DigestAlgorithm::Sha1 => State::Sha1(Sha1::new()),
            DigestAlgorithm::Blake3 => State::Blake3(Box::new(blake3::Hasher::new())),
        };
        ContentDigest { state, bytes: 0 }
    }

    /// Digest a byte slice to lowercase hex.
    pub fn digest(self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize_hex()
    }

    /// Digest everything `reader` yields. Returns the hex digest and the
    /// number of bytes read.
    pub async fn digest_reader<R>(self, reader: &mut R) -> std::io::Result<(String, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut hasher = self.hasher();
        let mut buf = vec![0u8; CHUNK];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let bytes = hasher.bytes();
        Ok((hasher.finalize_hex(), bytes))
    }

    /// Whether `key` has the shape of a digest from this algorithm.
    pub fn is_digest_key(self, key: &str) -> bool {
        key.len() == self.hex_len()
            && key
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => write!(f, "sha1"),
            DigestAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(DigestAlgorithm::Sha1),
            "blake3" => Ok(DigestAlgorithm::Blake3),
            other => Err(format!("unknown digest algorithm: {other}")),
        }
    }
}

enum State {
    Sha1(Sha1),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental digest over streamed content.
pub struct ContentDigest {
    state: State,
    bytes: u64,
}

impl ContentDigest {
    pub fn update(&mut self, data: &[u8]) {
        self.bytes += data.len() as u64;
        match &mut self.state {
            State::Sha1(hasher) => hasher.update(data),
            State::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    /// Bytes fed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        match self.state {
            State::Sha1(hasher) => hex::encode(hasher.finalize()),
            State::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self.state {
            State::Sha1(_) => DigestAlgorithm::Sha1,
            State::Blake3(_) => DigestAlgorithm::Blake3,
        };
        f.debug_struct("ContentDigest")
            .field("algorithm", &algorithm)
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_bytes() -> Vec<u8> {
        (0..1024).map(|i| i as u8).collect()
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(
            DigestAlgorithm::Sha1.digest(&counting_bytes()),
            "5b00669c480d5cffbdfa8bdba99561160f2d1b77"
        );
        assert_eq!(
            DigestAlgorithm::Sha1.digest(b""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn blake3_matches_reference() {
        let data = counting_bytes();
        let key = DigestAlgorithm::Blake3.digest(&data);
        assert_eq!(key, blake3::hash(&data).to_hex().to_string());
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn incremental_equals_one_shot() {
        let data = counting_bytes();
        for algorithm in [DigestAlgorithm::Sha1, DigestAlgorithm::Blake3] {
            let mut hasher = algorithm.hasher();
            for chunk in data.chunks(100) {
                hasher.update(chunk);
            }
            assert_eq!(hasher.bytes(), 1024);
            assert_eq!(hasher.finalize_hex(), algorithm.digest(&data));
        }
    }

    #[tokio::test]
    async fn digest_reader_reports_length() {
        let data = counting_bytes();
        let mut reader = data.as_slice();
        let (key, bytes) = DigestAlgorithm::Sha1
            .digest_reader(&mut reader)
            .await
            .unwrap();
        assert_eq!(key, "5b00669c480d5cffbdfa8bdba99561160f2d1b77");
        assert_eq!(bytes, 1024);
    }

    #[test]
    fn digest_key_shape() {
        let key = DigestAlgorithm::Sha1.digest(b"x");
        assert!(DigestAlgorithm::Sha1.is_digest_key(&key));
        assert!(!DigestAlgorithm::Blake3.is_digest_key(&key));
        assert!(!DigestAlgorithm::Sha1.is_digest_key(&key.to_uppercase()));
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("SHA1".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha1);
        assert_eq!("blake3".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Blake3);
        assert!("md5".parse::<DigestAlgorithm>().is_err());
        assert_eq!(DigestAlgorithm::Blake3.to_string(), "blake3");
        assert_eq!(DigestAlgorithm::default(), DigestAlgorithm::Sha1);
    }
}
