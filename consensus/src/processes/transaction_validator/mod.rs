pub mod tx_validation_any_height;
pub mod tx_validation_at_creation;

use tarn_consensus_core::condition::ValidationContext;
use tarn_consensus_core::constants::{ARBITRARY_DATA_SIZE_LIMIT, BLOCK_SIZE_LIMIT, MINIMUM_MINER_FEE};
use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::errors::TxResult;
use tarn_consensus_core::tx::{BlockHeight, Transaction};

use crate::state_view::ConsensusStateView;

/// Context for validation rules that hold at any chain height and need no
/// state lookups; this is the mempool admission context.
#[derive(Debug, Clone)]
pub struct TransactionValidationContext {
    pub block_size_limit: u64,
    pub arbitrary_data_size_limit: u64,
    pub minimum_miner_fee: Currency,
    /// Block-creating transactions are produced during block construction and
    /// are exempt from the miner-fee-presence rule.
    pub is_block_creating_tx: bool,
    pub validation: ValidationContext,
}

impl Default for TransactionValidationContext {
    fn default() -> Self {
        Self {
            block_size_limit: BLOCK_SIZE_LIMIT,
            arbitrary_data_size_limit: ARBITRARY_DATA_SIZE_LIMIT,
            minimum_miner_fee: Currency::from(MINIMUM_MINER_FEE),
            is_block_creating_tx: false,
            validation: ValidationContext::default(),
        }
    }
}

/// Context for validation at block-build and block-apply time, where the
/// consensus state is available for parent-output lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreationValidationContext {
    pub block_height: BlockHeight,
}

/// A single any-height validation rule. The pipeline runs these in a fixed
/// order and the first error wins.
pub type AnyHeightValidator = fn(&Transaction, &TransactionValidationContext) -> TxResult<()>;

/// A single creation-time validation rule, with access to the consensus state.
pub type CreationValidator =
    fn(&Transaction, &CreationValidationContext, &dyn ConsensusStateView) -> TxResult<()>;

pub fn validate_transaction_any_height(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for validator in tx_validation_any_height::ANY_HEIGHT_VALIDATORS {
        validator(tx, ctx)?;
    }
    Ok(())
}

pub fn validate_transaction_at_creation(
    tx: &Transaction,
    ctx: &CreationValidationContext,
    state: &dyn ConsensusStateView,
) -> TxResult<()> {
    for validator in tx_validation_at_creation::CREATION_VALIDATORS {
        validator(tx, ctx, state)?;
    }
    Ok(())
}
