use std::collections::HashSet;

use tarn_consensus_core::errors::{TxResult, TxRuleError};
use tarn_consensus_core::tx::Transaction;

use super::{AnyHeightValidator, TransactionValidationContext};

/// The mempool admission pipeline, in the order the rules run. Cheap structural
/// checks come first; the first failing rule short-circuits.
pub const ANY_HEIGHT_VALIDATORS: [AnyHeightValidator; 10] = [
    validate_transaction_fits_in_a_block,
    validate_transaction_arbitrary_data,
    validate_coin_outputs_are_valid,
    validate_coin_inputs_are_valid,
    validate_block_stake_outputs_are_valid,
    validate_block_stake_inputs_are_valid,
    validate_miner_fee_is_present,
    validate_miner_fees_are_valid,
    validate_double_coin_spends,
    validate_double_block_stake_spends,
];

pub fn validate_transaction_fits_in_a_block(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    let size = tx.encoded_len();
    if size > ctx.block_size_limit {
        return Err(TxRuleError::TransactionTooLarge(size, ctx.block_size_limit));
    }
    Ok(())
}

pub fn validate_transaction_arbitrary_data(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    if tx.arbitrary_data.len() as u64 > ctx.arbitrary_data_size_limit {
        return Err(TxRuleError::ArbitraryDataTooLarge(tx.arbitrary_data.len(), ctx.arbitrary_data_size_limit));
    }
    Ok(())
}

/// All coin outputs must carry a non-zero value and a standard condition.
pub fn validate_coin_outputs_are_valid(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for co in &tx.coin_outputs {
        if co.value.is_zero() {
            return Err(TxRuleError::ZeroOutput);
        }
        co.condition.is_standard_condition(&ctx.validation)?;
    }
    Ok(())
}

/// All coin inputs must name a parent output and carry a standard fulfillment.
pub fn validate_coin_inputs_are_valid(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for (index, ci) in tx.coin_inputs.iter().enumerate() {
        if ci.parent_id.is_default() {
            return Err(TxRuleError::MissingCoinInputParent(index));
        }
        ci.fulfillment.is_standard_fulfillment(&ctx.validation)?;
    }
    Ok(())
}

pub fn validate_block_stake_outputs_are_valid(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for bso in &tx.block_stake_outputs {
        if bso.value.is_zero() {
            return Err(TxRuleError::ZeroOutput);
        }
        bso.condition.is_standard_condition(&ctx.validation)?;
    }
    Ok(())
}

pub fn validate_block_stake_inputs_are_valid(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for (index, bsi) in tx.block_stake_inputs.iter().enumerate() {
        if bsi.parent_id.is_default() {
            return Err(TxRuleError::MissingBlockStakeInputParent(index));
        }
        bsi.fulfillment.is_standard_fulfillment(&ctx.validation)?;
    }
    Ok(())
}

pub fn validate_miner_fee_is_present(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    if ctx.is_block_creating_tx {
        // validation does not apply to block creation tx
        return Ok(());
    }
    if tx.miner_fees.is_empty() {
        return Err(TxRuleError::MissingMinerFee(tx.id()));
    }
    Ok(())
}

pub fn validate_miner_fees_are_valid(tx: &Transaction, ctx: &TransactionValidationContext) -> TxResult<()> {
    for fee in &tx.miner_fees {
        if *fee < ctx.minimum_miner_fee {
            return Err(TxRuleError::TooSmallMinerFee);
        }
    }
    Ok(())
}

/// No coin output may be spent twice within a single transaction.
pub fn validate_double_coin_spends(tx: &Transaction, _ctx: &TransactionValidationContext) -> TxResult<()> {
    let mut spent = HashSet::with_capacity(tx.coin_inputs.len());
    for ci in &tx.coin_inputs {
        if !spent.insert(ci.parent_id) {
            return Err(TxRuleError::DoubleSpend);
        }
    }
    Ok(())
}

/// No block stake output may be spent twice within a single transaction.
pub fn validate_double_block_stake_spends(tx: &Transaction, _ctx: &TransactionValidationContext) -> TxResult<()> {
    let mut spent = HashSet::with_capacity(tx.block_stake_inputs.len());
    for bsi in &tx.block_stake_inputs {
        if !spent.insert(bsi.parent_id) {
            return Err(TxRuleError::DoubleSpend);
        }
    }
    Ok(())
}
