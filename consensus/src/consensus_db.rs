use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tarn_consensus_core::tx::{BlockHeight, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId};
use tarn_database::{Database, StoreResult, StoreResultExtensions};
use tarn_hashes::Hash;

use crate::state_view::ConsensusStateView;

const BUCKET_COIN_OUTPUTS: &str = "CoinOutputs";
const BUCKET_BLOCK_STAKE_OUTPUTS: &str = "BlockStakeOutputs";
const BUCKET_BLOCK_MAP: &str = "BlockMap";
const BUCKET_BLOCK_PATH: &str = "BlockPath";
const BUCKET_CHAIN_META: &str = "ChainMeta";
/// Delayed coin outputs are grouped per maturity height in dynamically named
/// buckets carrying this prefix.
const PREFIX_DSCO: &str = "dsco_";

const KEY_BLOCK_HEIGHT: &[u8] = b"BlockHeight";

/// Minimal per-block record kept in the block map; the block-application
/// engine itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedBlock {
    pub parent_id: Hash,
    pub height: BlockHeight,
    pub timestamp: u64,
}

/// Database-backed consensus state. All writes go through `update`
/// transactions; a failing closure leaves the chain state untouched.
pub struct ConsensusDb {
    db: Arc<Database>,
}

impl ConsensusDb {
    pub fn new(db: Arc<Database>) -> StoreResult<Self> {
        db.update(|tx| {
            for bucket in [
                BUCKET_COIN_OUTPUTS,
                BUCKET_BLOCK_STAKE_OUTPUTS,
                BUCKET_BLOCK_MAP,
                BUCKET_BLOCK_PATH,
                BUCKET_CHAIN_META,
            ] {
                tx.create_bucket_if_not_exists(bucket);
            }
            Ok(())
        })?;
        Ok(Self { db })
    }

    pub fn db_block_height(&self) -> StoreResult<BlockHeight> {
        Ok(self
            .db
            .view(|tx| tx.get_obj::<BlockHeight>(BUCKET_CHAIN_META, KEY_BLOCK_HEIGHT))
            .unwrap_option()
            .unwrap_or(0))
    }

    /// Appends a block to the current path: stores its record, advances the
    /// height cursor and indexes the block id by height.
    pub fn push_path(&self, block_id: Hash, block: &ProcessedBlock) -> StoreResult<()> {
        self.db.update(|tx| {
            let height = block.height;
            tx.put_obj(BUCKET_BLOCK_MAP, block_id.as_ref(), block)?;
            tx.put_obj(BUCKET_CHAIN_META, KEY_BLOCK_HEIGHT, &height)?;
            tx.put_obj(BUCKET_BLOCK_PATH, &height.to_be_bytes(), &block_id)
        })
    }

    pub fn get_path(&self, height: BlockHeight) -> StoreResult<Hash> {
        self.db.view(|tx| tx.get_obj(BUCKET_BLOCK_PATH, &height.to_be_bytes()))
    }

    pub fn get_block_map(&self, block_id: Hash) -> StoreResult<ProcessedBlock> {
        self.db.view(|tx| tx.get_obj(BUCKET_BLOCK_MAP, block_id.as_ref()))
    }

    pub fn add_coin_output(&self, id: CoinOutputId, output: &CoinOutput) -> StoreResult<()> {
        self.db.update(|tx| tx.put_obj(BUCKET_COIN_OUTPUTS, id.0.as_ref(), output))
    }

    pub fn remove_coin_output(&self, id: CoinOutputId) -> StoreResult<()> {
        self.db.update(|tx| {
            // spending an unknown output is a consensus bug, keep it loud
            tx.get(BUCKET_COIN_OUTPUTS, id.0.as_ref())?;
            tx.delete(BUCKET_COIN_OUTPUTS, id.0.as_ref())
        })
    }

    pub fn add_block_stake_output(&self, id: BlockStakeOutputId, output: &BlockStakeOutput) -> StoreResult<()> {
        self.db.update(|tx| tx.put_obj(BUCKET_BLOCK_STAKE_OUTPUTS, id.0.as_ref(), output))
    }

    pub fn remove_block_stake_output(&self, id: BlockStakeOutputId) -> StoreResult<()> {
        self.db.update(|tx| {
            tx.get(BUCKET_BLOCK_STAKE_OUTPUTS, id.0.as_ref())?;
            tx.delete(BUCKET_BLOCK_STAKE_OUTPUTS, id.0.as_ref())
        })
    }

    /// Parks a coin output until `maturity_height` is reached.
    pub fn add_delayed_coin_output(
        &self,
        maturity_height: BlockHeight,
        id: CoinOutputId,
        output: &CoinOutput,
    ) -> StoreResult<()> {
        self.db.update(|tx| {
            let bucket = dsco_bucket(maturity_height);
            tx.create_bucket_if_not_exists(&bucket);
            tx.put_obj(&bucket, id.0.as_ref(), output)
        })
    }

    /// Moves every delayed output maturing at `height` into the unspent set.
    /// Returns how many outputs matured.
    pub fn apply_matured_outputs(&self, height: BlockHeight) -> StoreResult<usize> {
        let bucket = dsco_bucket(height);
        let items = match self.db.view(|tx| tx.items(&bucket)) {
            Ok(items) => items,
            Err(tarn_database::StoreError::BucketNotFound(_)) => return Ok(0),
            Err(err) => return Err(err),
        };
        let count = items.len();
        self.db.update(|tx| {
            for (key, value) in items {
                tx.put(BUCKET_COIN_OUTPUTS, &key, value)?;
                tx.delete(&bucket, &key)?;
            }
            Ok(())
        })?;
        Ok(count)
    }
}

fn dsco_bucket(height: BlockHeight) -> String {
    format!("{PREFIX_DSCO}{height}")
}

impl ConsensusStateView for ConsensusDb {
    fn unspent_coin_output_get(&self, id: &CoinOutputId) -> Option<CoinOutput> {
        self.db.view(|tx| tx.get_obj(BUCKET_COIN_OUTPUTS, id.0.as_ref())).unwrap_option()
    }

    fn unspent_block_stake_output_get(&self, id: &BlockStakeOutputId) -> Option<BlockStakeOutput> {
        self.db.view(|tx| tx.get_obj(BUCKET_BLOCK_STAKE_OUTPUTS, id.0.as_ref())).unwrap_option()
    }

    fn block_height(&self) -> BlockHeight {
        self.db_block_height().unwrap_or(0)
    }
}
