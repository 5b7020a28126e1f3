use std::cmp::Ordering;

use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::errors::{TxResult, TxRuleError};
use tarn_consensus_core::tx::Transaction;

use super::{CreationValidationContext, CreationValidator};
use crate::state_view::ConsensusStateView;

/// The block-build / block-apply pipeline. These rules resolve parents against
/// the consensus state and therefore only run where a state view exists.
pub const CREATION_VALIDATORS: [CreationValidator; 2] =
    [validate_coin_outputs_are_balanced, validate_block_stake_outputs_are_balanced];

/// The sum of resolved coin inputs must equal the transaction's coin output
/// sum (outputs plus miner fees).
pub fn validate_coin_outputs_are_balanced(
    tx: &Transaction,
    ctx: &CreationValidationContext,
    state: &dyn ConsensusStateView,
) -> TxResult<()> {
    let mut input_sum = Currency::zero();
    for ci in &tx.coin_inputs {
        let parent = state.unspent_coin_output_get(&ci.parent_id).ok_or(TxRuleError::MissingCoinOutput {
            parent_id: ci.parent_id,
            height: ctx.block_height,
        })?;
        input_sum += &parent.value;
    }

    let output_sum = tx.coin_output_sum();
    match input_sum.cmp(&output_sum) {
        Ordering::Less => Err(TxRuleError::CoinInputsBelowOutputs {
            tx_id: tx.id(),
            input_sum: input_sum.to_string(),
            output_sum: output_sum.to_string(),
        }),
        Ordering::Greater => Err(TxRuleError::CoinInputsAboveOutputs {
            tx_id: tx.id(),
            input_sum: input_sum.to_string(),
            output_sum: output_sum.to_string(),
        }),
        Ordering::Equal => Ok(()),
    }
}

/// The sum of resolved block stake inputs must equal the plain sum of block
/// stake outputs; stakes pay no fees.
pub fn validate_block_stake_outputs_are_balanced(
    tx: &Transaction,
    ctx: &CreationValidationContext,
    state: &dyn ConsensusStateView,
) -> TxResult<()> {
    let mut input_sum = Currency::zero();
    for bsi in &tx.block_stake_inputs {
        let parent =
            state.unspent_block_stake_output_get(&bsi.parent_id).ok_or(TxRuleError::MissingBlockStakeOutput {
                parent_id: bsi.parent_id,
                height: ctx.block_height,
            })?;
        input_sum += &parent.value;
    }

    let output_sum: Currency = tx.block_stake_outputs.iter().map(|bso| &bso.value).sum();
    match input_sum.cmp(&output_sum) {
        Ordering::Less => Err(TxRuleError::BlockStakeInputsBelowOutputs {
            tx_id: tx.id(),
            input_sum: input_sum.to_string(),
            output_sum: output_sum.to_string(),
        }),
        Ordering::Greater => Err(TxRuleError::BlockStakeInputsAboveOutputs {
            tx_id: tx.id(),
            input_sum: input_sum.to_string(),
            output_sum: output_sum.to_string(),
        }),
        Ordering::Equal => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::validate_transaction_at_creation;
    use super::*;
    use crate::state_view::MemConsensusState;
    use tarn_consensus_core::condition::{PublicKey, UnlockCondition, UnlockFulfillment, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
    use tarn_consensus_core::tx::{
        BlockStakeInput, BlockStakeOutput, BlockStakeOutputId, CoinInput, CoinOutput, CoinOutputId,
    };
    use tarn_hashes::Hash;

    fn fulfillment() -> UnlockFulfillment {
        UnlockFulfillment::SingleSignature {
            public_key: PublicKey::new_schnorr(vec![2; PUBLIC_KEY_SIZE]),
            signature: vec![3; SIGNATURE_SIZE],
        }
    }

    fn output(value: u64) -> CoinOutput {
        CoinOutput { value: Currency::from(value), condition: UnlockCondition::UnlockHash(Hash::new_unique()) }
    }

    fn state_with_parent(value: u64) -> (MemConsensusState, CoinOutputId) {
        let mut state = MemConsensusState { height: 42, ..Default::default() };
        let parent_id = CoinOutputId(Hash::new_unique());
        state.coin_outputs.insert(parent_id, output(value));
        (state, parent_id)
    }

    #[test]
    fn balanced_coin_transaction_passes() {
        let (state, parent_id) = state_with_parent(100);
        let tx = Transaction {
            coin_inputs: vec![CoinInput { parent_id, fulfillment: fulfillment() }],
            coin_outputs: vec![output(90)],
            miner_fees: vec![Currency::from(10u64)],
            ..Default::default()
        };
        validate_transaction_at_creation(&tx, &CreationValidationContext { block_height: 42 }, &state).unwrap();
    }

    #[test]
    fn missing_parent_reports_id_and_height() {
        let state = MemConsensusState::default();
        let parent_id = CoinOutputId(Hash::new_unique());
        let tx = Transaction {
            coin_inputs: vec![CoinInput { parent_id, fulfillment: fulfillment() }],
            ..Default::default()
        };
        let err = validate_coin_outputs_are_balanced(&tx, &CreationValidationContext { block_height: 7 }, &state)
            .unwrap_err();
        assert_eq!(err, TxRuleError::MissingCoinOutput { parent_id, height: 7 });
    }

    #[test]
    fn imbalance_direction_is_reported() {
        let (state, parent_id) = state_with_parent(100);
        let ctx = CreationValidationContext { block_height: 42 };

        let mut tx = Transaction {
            coin_inputs: vec![CoinInput { parent_id, fulfillment: fulfillment() }],
            coin_outputs: vec![output(95)],
            miner_fees: vec![Currency::from(10u64)],
            ..Default::default()
        };
        assert!(matches!(
            validate_coin_outputs_are_balanced(&tx, &ctx, &state),
            Err(TxRuleError::CoinInputsBelowOutputs { .. })
        ));

        tx.coin_outputs[0] = output(80);
        assert!(matches!(
            validate_coin_outputs_are_balanced(&tx, &ctx, &state),
            Err(TxRuleError::CoinInputsAboveOutputs { .. })
        ));
    }

    #[test]
    fn block_stake_balance_ignores_fees() {
        let mut state = MemConsensusState::default();
        let parent_id = BlockStakeOutputId(Hash::new_unique());
        state.block_stake_outputs.insert(
            parent_id,
            BlockStakeOutput { value: Currency::from(50u64), condition: UnlockCondition::Nil },
        );

        // miner fees are coin-denominated and must not enter the stake balance
        let tx = Transaction {
            block_stake_inputs: vec![BlockStakeInput { parent_id, fulfillment: fulfillment() }],
            block_stake_outputs: vec![BlockStakeOutput {
                value: Currency::from(50u64),
                condition: UnlockCondition::Nil,
            }],
            miner_fees: vec![Currency::from(10u64)],
            ..Default::default()
        };
        validate_block_stake_outputs_are_balanced(&tx, &CreationValidationContext::default(), &state).unwrap();
    }
}
