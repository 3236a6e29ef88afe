use std::path::Path;

use opcache_hash::Digest;

/// Builds a [`Digest`] over a sequence of length-prefixed segments.
///
/// Concatenating raw byte strings before hashing is ambiguous — `"a"` followed by `"bc"` hashes
/// identically to `"ab"` followed by `"c"`. Every multi-part digest in this crate (the spawn
/// fingerprint, the write key) goes through this builder instead of plain concatenation so that
/// distinct inputs always produce distinct digests.
#[derive(Default)]
pub struct FingerprintBuilder {
    buf: Vec<u8>,
}

impl FingerprintBuilder {
    /// A fresh, empty builder.
    pub fn new() -> FingerprintBuilder {
        FingerprintBuilder::default()
    }

    /// Append a length-prefixed byte segment.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append a length-prefixed UTF-8 segment.
    pub fn push_str(&mut self, s: &str) -> &mut Self {
        self.push_bytes(s.as_bytes())
    }

    /// Append a length-prefixed path, using the platform's native byte representation so no
    /// information is lost to lossy UTF-8 conversion.
    pub fn push_path(&mut self, path: &Path) -> &mut Self {
        self.push_bytes(&path_bytes(path))
    }

    /// Append a digest's raw bytes as one length-prefixed segment (the length is always
    /// [`opcache_hash::DIGEST_BYTES`], but prefixing keeps the encoding uniform).
    pub fn push_digest(&mut self, digest: Digest) -> &mut Self {
        self.push_bytes(digest.as_bytes())
    }

    /// Hash everything appended so far.
    pub fn finish(&self) -> Digest {
        Digest::of_bytes(&self.buf)
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}
