use std::collections::HashMap;

use tarn_consensus_core::tx::{BlockHeight, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId};

/// Read-only view over the current consensus state. The validation pipeline
/// only ever needs unspent-output lookups and the chain position; everything
/// else the block-application engine knows stays behind this seam.
pub trait ConsensusStateView {
    fn unspent_coin_output_get(&self, id: &CoinOutputId) -> Option<CoinOutput>;
    fn unspent_block_stake_output_get(&self, id: &BlockStakeOutputId) -> Option<BlockStakeOutput>;
    fn block_height(&self) -> BlockHeight;
}

/// A plain in-memory state view, for tests and for nodes that have not been
/// wired to a database yet.
#[derive(Default)]
pub struct MemConsensusState {
    pub coin_outputs: HashMap<CoinOutputId, CoinOutput>,
    pub block_stake_outputs: HashMap<BlockStakeOutputId, BlockStakeOutput>,
    pub height: BlockHeight,
}

impl ConsensusStateView for MemConsensusState {
    fn unspent_coin_output_get(&self, id: &CoinOutputId) -> Option<CoinOutput> {
        self.coin_outputs.get(id).cloned()
    }

    fn unspent_block_stake_output_get(&self, id: &BlockStakeOutputId) -> Option<BlockStakeOutput> {
        self.block_stake_outputs.get(id).cloned()
    }

    fn block_height(&self) -> BlockHeight {
        self.height
    }
}
