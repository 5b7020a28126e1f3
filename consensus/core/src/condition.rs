use serde::{Deserialize, Serialize};
use tarn_hashes::Hash;

use crate::errors::{TxResult, TxRuleError};
use crate::tx::BlockHeight;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Secp256k1Schnorr,
    /// Announced by future software; never standard for this node version.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    pub key: Vec<u8>,
}

impl PublicKey {
    pub fn new_schnorr(key: Vec<u8>) -> Self {
        Self { algorithm: SignatureAlgorithm::Secp256k1Schnorr, key }
    }

    fn check_standard(&self) -> TxResult<()> {
        match self.algorithm {
            SignatureAlgorithm::Secp256k1Schnorr => {}
            SignatureAlgorithm::Unknown => return Err(TxRuleError::NonStandardFulfillment),
        }
        if self.key.len() != PUBLIC_KEY_SIZE {
            return Err(TxRuleError::InvalidPublicKeyLength(self.key.len()));
        }
        Ok(())
    }
}

/// The context in which a condition or fulfillment is judged. Standardness may
/// depend on whether the transaction is already confirmed and on the chain
/// position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext {
    pub confirmed: bool,
    pub block_height: BlockHeight,
}

/// The standard set of spending conditions an output may carry. Anything not
/// expressible here is rejected at the mempool boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockCondition {
    /// Spendable by anyone; used for void outputs.
    Nil,
    UnlockHash(Hash),
    TimeLock {
        lock_height: BlockHeight,
        condition: Box<UnlockCondition>,
    },
    MultiSignature {
        unlock_hashes: Vec<Hash>,
        signatures_required: u64,
    },
}

impl UnlockCondition {
    /// A condition is standard when this node version knows how to evaluate
    /// it. The first offending detail is reported.
    pub fn is_standard_condition(&self, ctx: &ValidationContext) -> TxResult<()> {
        match self {
            UnlockCondition::Nil => Ok(()),
            UnlockCondition::UnlockHash(_) => Ok(()),
            UnlockCondition::TimeLock { condition, .. } => match condition.as_ref() {
                UnlockCondition::TimeLock { .. } => Err(TxRuleError::NestedTimeLock),
                inner => inner.is_standard_condition(ctx),
            },
            UnlockCondition::MultiSignature { unlock_hashes, signatures_required } => {
                if unlock_hashes.is_empty()
                    || *signatures_required == 0
                    || *signatures_required > unlock_hashes.len() as u64
                {
                    return Err(TxRuleError::UnmeetableMultiSignature(
                        unlock_hashes.len(),
                        *signatures_required,
                    ));
                }
                Ok(())
            }
        }
    }
}

/// The standard set of fulfillments an input may carry to satisfy its parent
/// output's condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockFulfillment {
    SingleSignature {
        public_key: PublicKey,
        signature: Vec<u8>,
    },
    MultiSignature {
        pairs: Vec<(PublicKey, Vec<u8>)>,
    },
}

impl UnlockFulfillment {
    pub fn is_standard_fulfillment(&self, _ctx: &ValidationContext) -> TxResult<()> {
        match self {
            UnlockFulfillment::SingleSignature { public_key, signature } => {
                public_key.check_standard()?;
                check_signature_len(signature)
            }
            UnlockFulfillment::MultiSignature { pairs } => {
                if pairs.is_empty() {
                    return Err(TxRuleError::NonStandardFulfillment);
                }
                for (public_key, signature) in pairs {
                    public_key.check_standard()?;
                    check_signature_len(signature)?;
                }
                Ok(())
            }
        }
    }
}

fn check_signature_len(signature: &[u8]) -> TxResult<()> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(TxRuleError::InvalidSignatureLength(signature.len()));
    }
    Ok(())
}
