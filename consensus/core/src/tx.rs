use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::condition::{UnlockCondition, UnlockFulfillment};
use crate::currency::Currency;
use crate::hashing::object_digest;
use tarn_hashes::Hash;

/// Represents the ID of a tarn transaction
pub type TransactionId = Hash;

/// Chain position, counted in blocks from genesis.
pub type BlockHeight = u64;

pub const TX_VERSION: u16 = 1;

macro_rules! output_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub Hash);

        impl $name {
            /// The all-zero ID, used as the "undefined parent" marker.
            pub fn is_default(&self) -> bool {
                self.0 == Hash::default()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Hash> for $name {
            fn from(hash: Hash) -> Self {
                Self(hash)
            }
        }
    };
}

output_id!(
    /// Identifies a coin output on the chain.
    CoinOutputId
);
output_id!(
    /// Identifies a block stake output on the chain.
    BlockStakeOutputId
);
output_id!(
    /// Identifies a file contract on the chain.
    FileContractId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInput {
    pub parent_id: CoinOutputId,
    pub fulfillment: UnlockFulfillment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinOutput {
    pub value: Currency,
    pub condition: UnlockCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeInput {
    pub parent_id: BlockStakeOutputId,
    pub fulfillment: UnlockFulfillment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeOutput {
    pub value: Currency,
    pub condition: UnlockCondition,
}

/// The conditions gating a file contract: both parties' public keys and the
/// number of signatures needed to revise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub timelock: BlockHeight,
    pub public_keys: Vec<crate::condition::PublicKey>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    pub fn unlock_hash(&self) -> Hash {
        object_digest(self)
    }
}

/// A signed delta re-pricing a file contract without creating a new one.
/// Immutable once signed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContractRevision {
    pub parent_id: FileContractId,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_file_merkle_root: Hash,
    pub new_window_start: BlockHeight,
    pub new_window_end: BlockHeight,
    // exactly two: [renter, host]
    pub new_valid_proof_outputs: Vec<CoinOutput>,
    // exactly three: [renter, host, void]
    pub new_missed_proof_outputs: Vec<CoinOutput>,
    pub new_unlock_hash: Hash,
}

impl FileContractRevision {
    /// The message both parties sign when exchanging revision signatures.
    pub fn sig_hash(&self) -> Hash {
        object_digest(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredFields {
    pub whole_transaction: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub parent_id: Hash,
    pub public_key_index: u64,
    pub timelock: BlockHeight,
    pub covered_fields: CoveredFields,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u16,
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    pub block_stake_inputs: Vec<BlockStakeInput>,
    pub block_stake_outputs: Vec<BlockStakeOutput>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<u8>,
    pub file_contract_revisions: Vec<FileContractRevision>,
    pub transaction_signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// The transaction ID covers everything except the signatures, so signing
    /// does not change identity.
    pub fn id(&self) -> TransactionId {
        object_digest(&(
            self.version,
            &self.coin_inputs,
            &self.coin_outputs,
            &self.block_stake_inputs,
            &self.block_stake_outputs,
            &self.miner_fees,
            &self.arbitrary_data,
            &self.file_contract_revisions,
        ))
    }

    /// Sum of everything paid out in coins: the coin outputs plus miner fees.
    pub fn coin_output_sum(&self) -> Currency {
        let outputs: Currency = self.coin_outputs.iter().map(|co| &co.value).sum();
        let fees: Currency = self.miner_fees.iter().sum();
        outputs + fees
    }

    pub fn encoded_len(&self) -> u64 {
        bincode::serialized_size(self).expect("canonical encoding cannot fail")
    }
}
