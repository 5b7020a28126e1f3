use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::tx::{BlockHeight, FileContractId, FileContractRevision, Transaction};
use tarn_hashes::Hash;

/// The host's ledger entry for one active contract: the sector set it is
/// bound to store, the signed revision chain, and what the host stands to
/// earn or lose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObligation {
    pub id: FileContractId,
    pub sector_roots: Vec<Hash>,
    /// Signed revision transactions, ordered, latest last.
    pub revision_transaction_set: Vec<Transaction>,
    pub potential_storage_revenue: Currency,
    pub potential_upload_revenue: Currency,
    pub risked_collateral: Currency,
}

impl StorageObligation {
    pub fn new(id: FileContractId, origin_revision_txn: Transaction) -> Self {
        Self {
            id,
            sector_roots: Vec::new(),
            revision_transaction_set: vec![origin_revision_txn],
            potential_storage_revenue: Currency::zero(),
            potential_upload_revenue: Currency::zero(),
            risked_collateral: Currency::zero(),
        }
    }

    /// The most recent signed revision of the contract.
    pub fn latest_revision(&self) -> Option<&FileContractRevision> {
        self.revision_transaction_set.last()?.file_contract_revisions.first()
    }

    /// Height at which the proof window opens; revisions must land before it.
    pub fn expiration(&self) -> BlockHeight {
        self.latest_revision().map(|rev| rev.new_window_start).unwrap_or(0)
    }

    /// Height at which the proof window closes; storage is priced until here.
    pub fn proof_deadline(&self) -> BlockHeight {
        self.latest_revision().map(|rev| rev.new_window_end).unwrap_or(0)
    }
}

/// Per-contract exclusive locks. A revision session holds its obligation's
/// lock for the whole connection; the guard releases on every exit path.
#[derive(Default)]
pub struct ObligationLocks {
    locks: Mutex<HashMap<FileContractId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ObligationLocks {
    pub async fn lock(&self, id: FileContractId) -> OwnedMutexGuard<()> {
        let entry = self.locks.lock().entry(id).or_default().clone();
        entry.lock_owned().await
    }

    /// Non-blocking variant, used by maintenance paths that must not stall
    /// behind an active renter session.
    pub fn try_lock(&self, id: FileContractId) -> Option<OwnedMutexGuard<()>> {
        let entry = self.locks.lock().entry(id).or_default().clone();
        entry.try_lock_owned().ok()
    }
}
