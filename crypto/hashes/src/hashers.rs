use crate::{Hash, HASH_SIZE};

pub trait HasherBase {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self;
}

pub trait Hasher: HasherBase + Clone + Default {
    fn finalize(self) -> Hash;
    fn reset(&mut self);
    fn hash<A: AsRef<[u8]>>(data: A) -> Hash {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Declares a blake2b-256 hasher keyed with a fixed domain string, so digests
/// from different domains can never collide.
macro_rules! blake2b_hasher {
    ($(#[$attr:meta])* $name:ident, $domain_sep:literal) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name(blake2b_simd::State);

        impl $name {
            #[inline]
            pub fn new() -> Self {
                Self(
                    blake2b_simd::Params::new()
                        .hash_length(HASH_SIZE)
                        .key($domain_sep)
                        .to_state(),
                )
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl HasherBase for $name {
            #[inline]
            fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
                self.0.update(data.as_ref());
                self
            }
        }

        impl Hasher for $name {
            #[inline]
            fn finalize(self) -> Hash {
                Hash::from_slice(self.0.finalize().as_bytes())
            }

            #[inline]
            fn reset(&mut self) {
                *self = Self::new();
            }
        }
    };
}

blake2b_hasher!(
    /// Hashes a single segment of sector data into a merkle leaf.
    SectorLeafHash,
    b"TarnSectorLeaf"
);
blake2b_hasher!(
    /// Joins two merkle subtree roots into their parent.
    MerkleBranchHash,
    b"TarnMerkleBranch"
);
blake2b_hasher!(
    /// Digest over a canonically encoded object, used for identifiers and
    /// signature messages.
    ObjectDigest,
    b"TarnObjectDigest"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_do_not_collide() {
        let data = b"equal input";
        assert_ne!(SectorLeafHash::hash(data), MerkleBranchHash::hash(data));
        assert_ne!(MerkleBranchHash::hash(data), ObjectDigest::hash(data));
    }

    #[test]
    fn update_is_streaming() {
        let mut streaming = ObjectDigest::new();
        streaming.update(b"ab").update(b"cd");
        assert_eq!(streaming.finalize(), ObjectDigest::hash(b"abcd"));
    }
}
