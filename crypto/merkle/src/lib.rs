use tarn_hashes::{Hash, HasherBase, Hasher, MerkleBranchHash, SectorLeafHash, ZERO_HASH};

/// Granularity of sector hashing. Storage proofs cover a single segment, so
/// sector roots are merkle roots over `SEGMENT_SIZE` leaves.
pub const SEGMENT_SIZE: usize = 64;

/// A push-only merkle accumulator. Every hash pushed into the tree is taken to
/// be the root of a full subtree holding `2^height` leaves; the accumulator
/// joins equal-sized subtrees as it goes, so it stores at most one pending
/// subtree per level.
///
/// The `height` parameter is the number of levels above the leaves of each
/// pushed subtree. It does not change the resulting root, only how the pushed
/// hashes are interpreted when producing range proofs, which keeps this
/// accumulator byte-compatible with the sector-root convention of the wire
/// protocol.
pub struct CachedTree {
    height: u64,
    // (levels above a pushed element, subtree root), larger subtrees first
    stack: Vec<(u64, Hash)>,
}

impl CachedTree {
    pub fn new(height: u64) -> Self {
        Self { height, stack: Vec::new() }
    }

    /// The subtree height this tree was constructed with.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn push(&mut self, root: Hash) {
        self.stack.push((0, root));
        while self.stack.len() >= 2 {
            let (rh, right) = self.stack[self.stack.len() - 1];
            let (lh, left) = self.stack[self.stack.len() - 2];
            if lh != rh {
                break;
            }
            self.stack.truncate(self.stack.len() - 2);
            self.stack.push((lh + 1, branch_hash(left, right)));
        }
    }

    /// Collapses the pending subtrees into a single root. An empty tree yields
    /// the zero hash, matching the declared merkle root of a zero-size file.
    pub fn root(&self) -> Hash {
        let mut iter = self.stack.iter().rev();
        let Some(&(_, smallest)) = iter.next() else {
            return ZERO_HASH;
        };
        iter.fold(smallest, |acc, &(_, left)| branch_hash(left, acc))
    }
}

fn branch_hash(left: Hash, right: Hash) -> Hash {
    let mut hasher = MerkleBranchHash::new();
    hasher.update(left).update(right);
    hasher.finalize()
}

fn leaf_hash(segment: &[u8]) -> Hash {
    SectorLeafHash::hash(segment)
}

/// Merkle root of raw sector data, hashed in `SEGMENT_SIZE` leaves. The final
/// segment may be short when the data length is not a multiple of the segment
/// size.
pub fn sector_root(data: &[u8]) -> Hash {
    let mut tree = CachedTree::new(0);
    for segment in data.chunks(SEGMENT_SIZE) {
        tree.push(leaf_hash(segment));
    }
    tree.root()
}
