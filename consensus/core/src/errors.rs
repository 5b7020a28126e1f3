use thiserror::Error;

use crate::tx::{BlockHeight, BlockStakeOutputId, CoinOutputId, TransactionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxRuleError {
    #[error("transaction output has a zero value")]
    ZeroOutput,

    #[error("transaction spends the same parent output more than once")]
    DoubleSpend,

    #[error("transaction has a miner fee below the required minimum")]
    TooSmallMinerFee,

    #[error("tx {0} does not contain any miner fees while at least one was expected")]
    MissingMinerFee(TransactionId),

    #[error("encoded transaction size {0} exceeds the block size limit {1}")]
    TransactionTooLarge(u64, u64),

    #[error("arbitrary data of {0} bytes exceeds the {1} byte limit")]
    ArbitraryDataTooLarge(usize, u64),

    #[error("no parent ID defined for coin input {0}")]
    MissingCoinInputParent(usize),

    #[error("no parent ID defined for block stake input {0}")]
    MissingBlockStakeInputParent(usize),

    #[error("unrecognized fulfillment type")]
    NonStandardFulfillment,

    #[error("time lock conditions may not be nested")]
    NestedTimeLock,

    #[error("multi-signature condition over {0} unlock hashes cannot require {1} signatures")]
    UnmeetableMultiSignature(usize, u64),

    #[error("public key has invalid length {0}")]
    InvalidPublicKeyLength(usize),

    #[error("signature has invalid length {0}")]
    InvalidSignatureLength(usize),

    #[error("unable to find parent ID {parent_id} as an unspent coin output in the current consensus state at block height {height}")]
    MissingCoinOutput { parent_id: CoinOutputId, height: BlockHeight },

    #[error("unable to find parent ID {parent_id} as an unspent block stake output in the current consensus state at block height {height}")]
    MissingBlockStakeOutput { parent_id: BlockStakeOutputId, height: BlockHeight },

    #[error("unbalanced coin outputs: the sum of coin inputs ({input_sum}) for tx {tx_id} is less than its sum of coin outputs ({output_sum})")]
    CoinInputsBelowOutputs { tx_id: TransactionId, input_sum: String, output_sum: String },

    #[error("unbalanced coin outputs: the sum of coin inputs ({input_sum}) for tx {tx_id} is greater than its sum of coin outputs ({output_sum})")]
    CoinInputsAboveOutputs { tx_id: TransactionId, input_sum: String, output_sum: String },

    #[error("unbalanced block stake outputs: the sum of block stake inputs ({input_sum}) for tx {tx_id} is less than its sum of block stake outputs ({output_sum})")]
    BlockStakeInputsBelowOutputs { tx_id: TransactionId, input_sum: String, output_sum: String },

    #[error("unbalanced block stake outputs: the sum of block stake inputs ({input_sum}) for tx {tx_id} is greater than its sum of block stake outputs ({output_sum})")]
    BlockStakeInputsAboveOutputs { tx_id: TransactionId, input_sum: String, output_sum: String },
}

pub type TxResult<T> = std::result::Result<T, TxRuleError>;
