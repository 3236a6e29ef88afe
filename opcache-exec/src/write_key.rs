use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

use opcache_hash::Digest;

use crate::fingerprint::FingerprintBuilder;

/// Names one cache entry: the digest of `(operation stamp, write path)`.
///
/// Two operations that happen to produce byte-identical output to two different logical
/// destinations still get distinct entries, and two different writes of the same operation never
/// collide with each other.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteKey(Digest);

impl WriteKey {
    /// Compute the key for writing `path` from an operation fingerprinted as `stamp`.
    pub fn new(stamp: Digest, path: &Path) -> WriteKey {
        let mut builder = FingerprintBuilder::new();
        builder.push_digest(stamp).push_path(path);
        WriteKey(builder.finish())
    }

    /// The underlying digest.
    pub fn digest(self) -> Digest {
        self.0
    }

    /// Hex encoding, i.e. the basename this key is stored under in a [`opcache_store::CacheStore`].
    pub fn to_hex(self) -> String {
        self.0.to_hex()
    }
}

impl Display for WriteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for WriteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "WriteKey({})", self.to_hex())
    }
}
