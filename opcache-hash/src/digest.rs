use std::fmt::{Debug, Display, Formatter};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Number of bytes of a [`Digest`]. BLAKE3 produces a 256 bit hash, comfortably inside the
/// 128-256 bit budget of a stamp: wide enough that two distinct inputs colliding is not a
/// practical concern.
pub const DIGEST_BYTES: usize = 32;

/// Size of the buffer used to stream a file or descriptor through the hasher. Chosen to match
/// `ReadFileIterator`'s chunk size: large enough to amortize syscalls, small enough to never hold
/// more than one chunk of a multi-gigabyte output in memory at a time.
const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// Error produced when decoding a [`Digest`] from a user-supplied hex string. Always surfaced to
/// the caller rather than silently absorbed — a corrupt digest on disk should never be treated as
/// a cache miss.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum DigestError {
    /// The string contained non-hex characters.
    #[error("invalid digest: {0:?} is not valid hex")]
    InvalidHex(String),
    /// The string was valid hex but not exactly [`DIGEST_BYTES`] * 2 characters long.
    #[error("invalid digest: expected {expected} hex characters, found {found}")]
    WrongLength {
        /// Expected length, in hex characters.
        expected: usize,
        /// Length actually found.
        found: usize,
    },
}

/// A fixed-width cryptographic hash over a byte sequence or a file's content.
///
/// Two byte sequences with identical content always produce identical digests, and two distinct
/// byte sequences produce distinct digests with overwhelming probability — the two properties
/// every cache key, fingerprint and content address in this crate is built on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_BYTES]);

impl Digest {
    /// Digest of an in-memory byte slice.
    pub fn of_bytes(data: &[u8]) -> Digest {
        Digest(*blake3::hash(data).as_bytes())
    }

    /// Digest of a string, hashed as its UTF-8 bytes.
    pub fn of_string(data: &str) -> Digest {
        Digest::of_bytes(data.as_bytes())
    }

    /// Digest of a file's content, read from disk. Streams the file through a fixed-size buffer:
    /// never loads the whole file in memory.
    pub fn of_file(path: &Path) -> anyhow::Result<Digest> {
        let file = crate::retry::retry_eintr(|| File::open(path))
            .map_err(|e| anyhow::anyhow!("failed to open {} for hashing: {e}", path.display()))?;
        Digest::of_fd(&file)
    }

    /// Digest of the content of an already-open file descriptor, from its current position to
    /// EOF. Used by the file-stamp memo, which has to open the file anyway to distinguish
    /// "missing" from "unreadable".
    pub fn of_fd(file: &File) -> anyhow::Result<Digest> {
        let mut hasher = blake3::Hasher::new();
        let mut reader = file;
        let mut buf = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = match crate::retry::retry_eintr(|| reader.read(&mut buf)) {
                Ok(n) => n,
                Err(e) => return Err(anyhow::anyhow!("failed to read while hashing: {e}")),
            };
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest(*hasher.finalize().as_bytes()))
    }

    /// Lower-case hex encoding of this digest.
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a digest previously produced by [`Digest::to_hex`]. Fails on non-hex input or on
    /// input of the wrong length — a corrupted or hand-edited cache key is reported, never
    /// silently accepted.
    pub fn from_hex(s: &str) -> Result<Digest, DigestError> {
        let expected = DIGEST_BYTES * 2;
        if s.len() != expected {
            return Err(DigestError::WrongLength {
                expected,
                found: s.len(),
            });
        }
        let mut out = [0u8; DIGEST_BYTES];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let byte_str = std::str::from_utf8(chunk).map_err(|_| invalid_hex(s))?;
            out[i] = u8::from_str_radix(byte_str, 16).map_err(|_| invalid_hex(s))?;
        }
        Ok(Digest(out))
    }

    /// Raw bytes of this digest.
    pub fn as_bytes(&self) -> &[u8; DIGEST_BYTES] {
        &self.0
    }
}

fn invalid_hex(s: &str) -> DigestError {
    DigestError::InvalidHex(s.to_owned())
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}
