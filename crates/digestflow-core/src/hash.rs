//! Content hashes and the pluggable digest algorithm.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-size content fingerprint of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// All-zero hash, carried by results whose read failed.
    pub const ZERO: Self = Self([0; 32]);

    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Whether this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Incremental hashing state for one file.
pub trait DigestSink: Send {
    /// Feed the next chunk of content.
    fn update(&mut self, chunk: &[u8]);

    /// Consume the state and produce the final hash.
    fn finish(self: Box<Self>) -> ContentHash;
}

/// A content digest algorithm.
///
/// Workers call [`Digester::begin`] once per file and stream the file
/// through the returned sink, so implementations never need the whole
/// content in memory.
pub trait Digester: Send + Sync {
    /// Short algorithm name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Start hashing a new file.
    fn begin(&self) -> Box<dyn DigestSink>;

    /// Hash an in-memory buffer in one go.
    fn digest_bytes(&self, bytes: &[u8]) -> ContentHash {
        let mut sink = self.begin();
        sink.update(bytes);
        sink.finish()
    }
}

/// BLAKE3, the default digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digester;

impl Digester for Blake3Digester {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn begin(&self) -> Box<dyn DigestSink> {
        Box::new(Blake3Sink(blake3::Hasher::new()))
    }

    fn digest_bytes(&self, bytes: &[u8]) -> ContentHash {
        ContentHash::new(*blake3::hash(bytes).as_bytes())
    }
}

struct Blake3Sink(blake3::Hasher);

impl DigestSink for Blake3Sink {
    fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    fn finish(self: Box<Self>) -> ContentHash {
        ContentHash::new(*self.0.finalize().as_bytes())
    }
}
