use serde::Serialize;
use tarn_hashes::{Hash, Hasher, ObjectDigest};

/// Digest over the canonical binary encoding of an object. Identifiers and
/// signature messages are all derived this way.
pub fn object_digest<T: Serialize + ?Sized>(obj: &T) -> Hash {
    let encoded = bincode::serialize(obj).expect("canonical encoding cannot fail");
    ObjectDigest::hash(encoded)
}
