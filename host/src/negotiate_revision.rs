use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use tarn_consensus_core::constants::{
    ITERATED_CONNECTION_TIME, NEGOTIATE_FILE_CONTRACT_REVISION_TIME, NEGOTIATE_MAX_FILE_CONTRACT_REVISION_SIZE,
    NEGOTIATE_MAX_TRANSACTION_SIGNATURE_SIZE, REVISION_SUBMISSION_BUFFER, SECTOR_SIZE,
};
use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::tx::{
    BlockHeight, CoveredFields, FileContractRevision, Transaction, TransactionSignature, TX_VERSION,
};
use tarn_core::info;
use tarn_hashes::Hash;
use tarn_merkle::{sector_root, CachedTree, SEGMENT_SIZE};
use tarn_utils::object_stream::read_object;

use crate::errors::{NegotiationError, NegotiationResult};
use crate::negotiation::{
    read_negotiation_acceptance, write_negotiation_acceptance, write_negotiation_rejection, write_negotiation_stop,
    RevisionAction, ACTION_DELETE, ACTION_INSERT, ACTION_MODIFY,
};
use crate::settings::HostInternalSettings;
use crate::storage_obligation::StorageObligation;
use crate::Host;

/// Everything a batch of revision actions produces against a working copy of
/// the sector list, before any of it becomes durable.
#[derive(Debug)]
struct AppliedActions {
    new_roots: Vec<Hash>,
    bandwidth_revenue: Currency,
    storage_revenue: Currency,
    new_collateral: Currency,
    sectors_removed: Vec<Hash>,
    sectors_gained: Vec<Hash>,
    gained_sector_data: Vec<Vec<u8>>,
}

impl Host {
    /// Accepts a request to revise an existing contract. Revisions can add
    /// sectors, delete sectors, and modify existing sectors. Multiple
    /// iterations of revisions are allowed over the same connection, until
    /// the loop timeout passes or the renter sends a stop response.
    pub async fn handle_revise_contract<C>(&self, conn: &mut C) -> NegotiationResult<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let start_time = Instant::now();
        // The revision exchange hands back the storage obligation that will
        // pay for the data, locked. The guard unlocks it on every exit path.
        let (_lock, mut so) = self
            .managed_rpc_recent_revision(conn)
            .await
            .map_err(|err| err.extend("RPCRecentRevision failed"))?;

        let mut timeout_reached = false;
        while !timeout_reached {
            timeout_reached = start_time.elapsed() > ITERATED_CONNECTION_TIME;
            match self.managed_revision_iteration(conn, &mut so, timeout_reached).await {
                Ok(()) => {}
                Err(err) if err.is_stop() => return Ok(()),
                Err(err) => return Err(err.extend("revision iteration failed")),
            }
        }
        Ok(())
    }

    /// One iteration of the revision loop.
    async fn managed_revision_iteration<C>(
        &self,
        conn: &mut C,
        so: &mut StorageObligation,
        final_iter: bool,
    ) -> NegotiationResult<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // Send the settings to the renter. The host will keep serving even if
        // it is not accepting contracts, because this contract already exists.
        self.managed_rpc_settings(conn).await.map_err(|err| err.extend("RPCSettings failed"))?;

        // Everything after the settings runs under the per-iteration deadline.
        match timeout(NEGOTIATE_FILE_CONTRACT_REVISION_TIME, self.revision_iteration(conn, so, final_iter)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(NegotiationError::Connection("negotiation deadline exceeded".into())),
        }
    }

    async fn revision_iteration<C>(
        &self,
        conn: &mut C,
        so: &mut StorageObligation,
        final_iter: bool,
    ) -> NegotiationResult<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // The renter either accepts the settings, or stops the loop.
        read_negotiation_acceptance(conn).await.map_err(|err| err.extend("renter rejected settings"))?;

        let (settings, secret_key, block_height) = self.snapshot();

        // The renter sends its intended modifications, followed by the file
        // contract revision that pays for them.
        let modifications: Vec<RevisionAction> = read_object(conn, settings.max_revise_batch_size)
            .await
            .map_err(|err| {
                NegotiationError::Connection(err.to_string()).extend("unable to read revision modifications")
            })?;
        let revision: FileContractRevision = read_object(conn, NEGOTIATE_MAX_FILE_CONTRACT_REVISION_SIZE)
            .await
            .map_err(|err| NegotiationError::Connection(err.to_string()).extend("unable to read proposed revision"))?;

        // Apply the modifications to a working copy of the sector list, then
        // check that the revision pays for exactly what changed.
        let applied = self
            .apply_revision_actions(so, &settings, block_height, &modifications)
            .and_then(|applied| {
                let new_revenue = &applied.storage_revenue + &applied.bandwidth_revenue;
                verify_revision(so, &applied.new_roots, &revision, block_height, &new_revenue, &applied.new_collateral)
                    .map_err(|err| err.extend("unable to verify revision"))?;
                Ok(applied)
            });
        let applied = match applied {
            Ok(applied) => applied,
            Err(err) => {
                // Error is ignored so that the typed cause is preserved.
                let _ = write_negotiation_rejection(conn, &err).await;
                return Err(err.extend("rejected proposed modifications"));
            }
        };
        write_negotiation_acceptance(conn)
            .await
            .map_err(|err| err.extend("could not accept revision modifications"))?;

        // The renter sends a transaction signature for the revision; verify it
        // and counter-sign.
        let renter_sig: TransactionSignature = read_object(conn, NEGOTIATE_MAX_TRANSACTION_SIGNATURE_SIZE)
            .await
            .map_err(|err| {
                NegotiationError::Connection(err.to_string()).extend("could not read renter transaction signature")
            })?;
        let txn = match create_revision_signature(&revision, renter_sig, &secret_key) {
            Ok(txn) => txn,
            Err(err) => {
                let _ = write_negotiation_rejection(conn, &err).await;
                return Err(err.extend("could not create revision signature"));
            }
        };

        so.sector_roots = applied.new_roots;
        so.potential_storage_revenue += &applied.storage_revenue;
        so.risked_collateral += &applied.new_collateral;
        so.potential_upload_revenue += &applied.bandwidth_revenue;
        so.revision_transaction_set = vec![txn.clone()];
        if let Err(err) = self.modify_storage_obligation(
            so,
            &applied.sectors_removed,
            &applied.sectors_gained,
            &applied.gained_sector_data,
        ) {
            let err = NegotiationError::Internal(err.to_string());
            let _ = write_negotiation_rejection(conn, &err).await;
            return Err(err.extend("could not modify storage obligation"));
        }
        info!(
            "host committed revision {} of contract {}",
            revision.new_revision_number, so.id
        );

        // This iteration is complete. Stop instead of accepting when the loop
        // has reached its overall deadline.
        let signal = if final_iter {
            write_negotiation_stop(conn).await
        } else {
            write_negotiation_acceptance(conn).await
        };
        signal.map_err(|err| err.extend("iteration signal failed to send"))?;
        tarn_utils::object_stream::write_object(conn, &txn.transaction_signatures[1])
            .await
            .map_err(|err| NegotiationError::Connection(err.to_string()).extend("failed to write revision signatures"))?;
        Ok(())
    }

    /// Walks the modification batch over a working copy of the sector roots,
    /// accumulating the proposed financial deltas. Nothing durable changes
    /// here; a failure discards the whole batch.
    fn apply_revision_actions(
        &self,
        so: &StorageObligation,
        settings: &HostInternalSettings,
        block_height: BlockHeight,
        modifications: &[RevisionAction],
    ) -> NegotiationResult<AppliedActions> {
        let mut applied = AppliedActions {
            new_roots: so.sector_roots.clone(),
            bandwidth_revenue: Currency::zero(),
            storage_revenue: Currency::zero(),
            new_collateral: Currency::zero(),
            sectors_removed: Vec::new(),
            sectors_gained: Vec::new(),
            gained_sector_data: Vec::new(),
        };

        for modification in modifications {
            // The index must point at an existing sector root, except that
            // inserting at the end is permitted.
            let roots_len = applied.new_roots.len() as u64;
            if modification.action_type == ACTION_INSERT {
                if modification.sector_index > roots_len {
                    return Err(NegotiationError::BadModificationIndex);
                }
            } else if modification.sector_index >= roots_len {
                return Err(NegotiationError::BadModificationIndex);
            }
            if modification.data.len() as u64 > SECTOR_SIZE {
                return Err(NegotiationError::LargeSector);
            }
            let index = modification.sector_index as usize;

            match modification.action_type {
                ACTION_DELETE => {
                    // No financial change; removing the root is enough.
                    applied.sectors_removed.push(applied.new_roots.remove(index));
                }
                ACTION_INSERT => {
                    if modification.data.len() as u64 != SECTOR_SIZE {
                        return Err(NegotiationError::BadSectorSize);
                    }

                    let blocks_remaining = so.proof_deadline().saturating_sub(block_height);
                    let block_bytes = Currency::from(blocks_remaining).mul64(SECTOR_SIZE);
                    applied.bandwidth_revenue += &settings.min_upload_bandwidth_price.mul64(SECTOR_SIZE);
                    applied.storage_revenue += &(&settings.min_storage_price * &block_bytes);
                    applied.new_collateral += &(&settings.collateral * &block_bytes);

                    let new_root = sector_root(&modification.data);
                    applied.sectors_gained.push(new_root);
                    applied.gained_sector_data.push(modification.data.clone());
                    applied.new_roots.insert(index, new_root);
                }
                ACTION_MODIFY => {
                    // The length is already known to be small enough; the
                    // offset needs the same guard or the sum could overflow.
                    if modification.offset > SECTOR_SIZE
                        || modification.offset + modification.data.len() as u64 > SECTOR_SIZE
                    {
                        return Err(NegotiationError::IllegalOffsetAndLength);
                    }

                    let mut sector = self
                        .read_sector(&applied.new_roots[index])
                        .map_err(|err| err.extend("could not read sector"))?;
                    let offset = modification.offset as usize;
                    sector[offset..offset + modification.data.len()].copy_from_slice(&modification.data);

                    applied.bandwidth_revenue +=
                        &settings.min_upload_bandwidth_price.mul64(modification.data.len() as u64);

                    let new_root = sector_root(&sector);
                    applied.sectors_removed.push(applied.new_roots[index]);
                    applied.sectors_gained.push(new_root);
                    applied.gained_sector_data.push(sector);
                    applied.new_roots[index] = new_root;
                }
                _ => return Err(NegotiationError::UnknownModification),
            }
        }
        Ok(applied)
    }
}

/// Checks that the proposed revision pays the host correctly and attempts no
/// unexpected changes. `sector_roots` is the working copy with the batch
/// already applied. The merkle root comparison runs last because it is by far
/// the most expensive predicate.
pub fn verify_revision(
    so: &StorageObligation,
    sector_roots: &[Hash],
    revision: &FileContractRevision,
    block_height: BlockHeight,
    new_revenue: &Currency,
    new_collateral: &Currency,
) -> NegotiationResult<()> {
    if revision.new_valid_proof_outputs.len() != 2 || revision.new_missed_proof_outputs.len() != 3 {
        return Err(NegotiationError::BadContractOutputCounts);
    }

    // The time to finalize and submit the revision must not have passed.
    if so.expiration().saturating_sub(REVISION_SUBMISSION_BUFFER) <= block_height {
        return Err(NegotiationError::LateRevision);
    }

    let old = so
        .latest_revision()
        .ok_or_else(|| NegotiationError::Internal("storage obligation has no revision".into()))?;

    // All non-volatile fields must stay the same.
    if old.parent_id != revision.parent_id {
        return Err(NegotiationError::BadContractParent);
    }
    if old.unlock_conditions.unlock_hash() != revision.unlock_conditions.unlock_hash() {
        return Err(NegotiationError::BadUnlockConditions);
    }
    if old.new_revision_number >= revision.new_revision_number {
        return Err(NegotiationError::BadRevisionNumber);
    }
    if revision.new_file_size != sector_roots.len() as u64 * SECTOR_SIZE {
        return Err(NegotiationError::BadFileSize);
    }
    if old.new_window_start != revision.new_window_start {
        return Err(NegotiationError::BadWindowStart);
    }
    if old.new_window_end != revision.new_window_end {
        return Err(NegotiationError::BadWindowEnd);
    }
    if old.new_unlock_hash != revision.new_unlock_hash {
        return Err(NegotiationError::BadUnlockHash);
    }

    // The new revenue comes out of the renter's valid output...
    if &revision.new_valid_proof_outputs[0].value + new_revenue > old.new_valid_proof_outputs[0].value {
        return Err(NegotiationError::HighRenterValidOutput);
    }
    // ...and lands in the host's valid output.
    if revision.new_valid_proof_outputs[1].value < &old.new_valid_proof_outputs[1].value + new_revenue {
        return Err(NegotiationError::LowHostValidOutput);
    }
    // On a missed proof the renter still gives up the revenue...
    if &revision.new_missed_proof_outputs[0].value + new_revenue > old.new_missed_proof_outputs[0].value {
        return Err(NegotiationError::HighRenterMissedOutput);
    }
    // ...and the host puts the new collateral at risk.
    if &revision.new_missed_proof_outputs[1].value + new_collateral > old.new_missed_proof_outputs[1].value {
        return Err(NegotiationError::LowHostMissedOutput);
    }

    let mut height = 0u64;
    while (1u64 << height) < SECTOR_SIZE / SEGMENT_SIZE as u64 {
        height += 1;
    }
    let mut tree = CachedTree::new(height);
    for root in sector_roots {
        tree.push(*root);
    }
    if revision.new_file_merkle_root != tree.root() {
        return Err(NegotiationError::BadFileMerkleRoot);
    }

    Ok(())
}

/// Verifies the renter's signature over the revision and produces the signed
/// revision transaction carrying both signatures, renter first.
pub fn create_revision_signature(
    revision: &FileContractRevision,
    renter_sig: TransactionSignature,
    secret_key: &secp256k1::KeyPair,
) -> NegotiationResult<Transaction> {
    let digest = revision.sig_hash();
    let msg = secp256k1::Message::from_slice(digest.as_ref()).expect("digest is 32 bytes");

    let renter_key = revision
        .unlock_conditions
        .public_keys
        .first()
        .ok_or(NegotiationError::BadSignature)?;
    let renter_pk =
        secp256k1::XOnlyPublicKey::from_slice(&renter_key.key).map_err(|_| NegotiationError::BadSignature)?;
    let signature = secp256k1::schnorr::Signature::from_slice(&renter_sig.signature)
        .map_err(|_| NegotiationError::BadSignature)?;
    signature.verify(&msg, &renter_pk).map_err(|_| NegotiationError::BadSignature)?;

    let host_signature = TransactionSignature {
        parent_id: revision.parent_id.0,
        public_key_index: 1,
        timelock: 0,
        covered_fields: CoveredFields { whole_transaction: true },
        signature: secret_key.sign_schnorr(msg).as_ref().to_vec(),
    };

    Ok(Transaction {
        version: TX_VERSION,
        file_contract_revisions: vec![revision.clone()],
        transaction_signatures: vec![renter_sig, host_signature],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::{ActionSpecifier, NegotiationResponse};
    use crate::settings::SignedSettings;
    use crate::storage_obligation::StorageObligation;
    use std::sync::Arc;
    use tarn_consensus_core::condition::PublicKey;
    use tarn_consensus_core::tx::{CoinOutput, FileContractId, UnlockConditions};
    use tarn_consensus_core::condition::UnlockCondition;
    use tarn_database::Database;
    use tarn_utils::object_stream::write_object;

    const TEST_HEIGHT: BlockHeight = 1000;
    const WINDOW_START: BlockHeight = 2000;
    const WINDOW_END: BlockHeight = 2300;

    fn keypair() -> secp256k1::KeyPair {
        let secp = secp256k1::Secp256k1::new();
        secp256k1::KeyPair::new(&secp, &mut rand::thread_rng())
    }

    fn wire_key(kp: &secp256k1::KeyPair) -> PublicKey {
        PublicKey::new_schnorr(kp.x_only_public_key().0.serialize().to_vec())
    }

    fn priced_settings() -> HostInternalSettings {
        HostInternalSettings {
            min_storage_price: Currency::from(2u64),
            min_upload_bandwidth_price: Currency::from(3u64),
            collateral: Currency::from(1u64),
            ..Default::default()
        }
    }

    fn coin_output(value: Currency) -> CoinOutput {
        CoinOutput { value, condition: UnlockCondition::Nil }
    }

    /// A fresh host at `TEST_HEIGHT` with one zero-sector obligation whose
    /// windows leave plenty of room before the submission buffer.
    fn host_with_obligation(renter_kp: &secp256k1::KeyPair) -> (Host, StorageObligation) {
        let host = Host::new(Arc::new(Database::new()), priced_settings(), keypair()).unwrap();
        host.set_block_height(TEST_HEIGHT);

        let unlock_conditions = UnlockConditions {
            timelock: 0,
            public_keys: vec![wire_key(renter_kp), host.public_key()],
            signatures_required: 2,
        };
        let big = Currency::from(10u64).pow(18);
        let origin = FileContractRevision {
            parent_id: FileContractId(Hash::new_unique()),
            unlock_conditions,
            new_revision_number: 0,
            new_file_size: 0,
            new_file_merkle_root: Hash::default(),
            new_window_start: WINDOW_START,
            new_window_end: WINDOW_END,
            new_valid_proof_outputs: vec![coin_output(big.clone()), coin_output(Currency::zero())],
            new_missed_proof_outputs: vec![coin_output(big.clone()), coin_output(big), coin_output(Currency::zero())],
            new_unlock_hash: Hash::new_unique(),
        };
        let txn = Transaction { file_contract_revisions: vec![origin], ..Default::default() };
        let so = StorageObligation::new(FileContractId(Hash::new_unique()), txn);
        host.add_storage_obligation(&so).unwrap();
        (host, so)
    }

    fn roots_merkle_root(roots: &[Hash]) -> Hash {
        let mut height = 0u64;
        while (1u64 << height) < SECTOR_SIZE / SEGMENT_SIZE as u64 {
            height += 1;
        }
        let mut tree = CachedTree::new(height);
        roots.iter().for_each(|&root| tree.push(root));
        tree.root()
    }

    /// A revision that correctly pays for `revenue`/`collateral` over the
    /// given sector roots.
    fn paying_revision(
        so: &StorageObligation,
        roots: &[Hash],
        revenue: &Currency,
        collateral: &Currency,
    ) -> FileContractRevision {
        let old = so.latest_revision().unwrap();
        let mut revision = old.clone();
        revision.new_revision_number = old.new_revision_number + 1;
        revision.new_file_size = roots.len() as u64 * SECTOR_SIZE;
        revision.new_file_merkle_root = roots_merkle_root(roots);
        revision.new_valid_proof_outputs = vec![
            coin_output(old.new_valid_proof_outputs[0].value.checked_sub(revenue).unwrap()),
            coin_output(&old.new_valid_proof_outputs[1].value + revenue),
        ];
        revision.new_missed_proof_outputs = vec![
            coin_output(old.new_missed_proof_outputs[0].value.checked_sub(revenue).unwrap()),
            coin_output(old.new_missed_proof_outputs[1].value.checked_sub(collateral).unwrap()),
            coin_output(old.new_missed_proof_outputs[2].value.clone()),
        ];
        revision
    }

    fn insert_action(index: u64, data: Vec<u8>) -> RevisionAction {
        RevisionAction { action_type: ACTION_INSERT, sector_index: index, offset: 0, data }
    }

    #[test]
    fn insert_is_allowed_at_the_end_but_not_past_it() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let settings = host.settings();
        let sector = vec![0u8; SECTOR_SIZE as usize];

        let ok = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[insert_action(0, sector.clone())])
            .unwrap();
        assert_eq!(ok.new_roots.len(), 1);

        let err = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[insert_action(1, sector)])
            .unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadModificationIndex));
    }

    #[test]
    fn insert_financials_follow_remaining_blocks() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let settings = host.settings();
        let sector = vec![0u8; SECTOR_SIZE as usize];

        let applied = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[insert_action(0, sector.clone())])
            .unwrap();

        let remaining = WINDOW_END - TEST_HEIGHT;
        assert_eq!(applied.storage_revenue, Currency::from(2u64).mul64(remaining).mul64(SECTOR_SIZE));
        assert_eq!(applied.bandwidth_revenue, Currency::from(3u64).mul64(SECTOR_SIZE));
        assert_eq!(applied.new_collateral, Currency::from(1u64).mul64(remaining).mul64(SECTOR_SIZE));
        assert_eq!(applied.new_roots, vec![sector_root(&sector)]);
        assert_eq!(applied.sectors_gained, applied.new_roots);
    }

    #[test]
    fn sector_size_is_enforced_on_insert() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let settings = host.settings();

        let err = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[insert_action(0, vec![0; SECTOR_SIZE as usize + 1])])
            .unwrap_err();
        assert!(matches!(err.root(), NegotiationError::LargeSector));

        let err = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[insert_action(0, vec![0; 100])])
            .unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadSectorSize));
    }

    #[test]
    fn modify_respects_the_sector_boundary() {
        let renter = keypair();
        let (host, mut so) = host_with_obligation(&renter);
        let settings = host.settings();

        let sector = vec![7u8; SECTOR_SIZE as usize];
        let root = sector_root(&sector);
        host.store_sector(&root, &sector).unwrap();
        so.sector_roots.push(root);

        let modify = |offset: u64, data: Vec<u8>| RevisionAction {
            action_type: ACTION_MODIFY,
            sector_index: 0,
            offset,
            data,
        };

        // offset + len == SECTOR_SIZE is the last legal position
        let applied = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[modify(SECTOR_SIZE - 4, vec![1; 4])])
            .unwrap();
        assert_eq!(applied.bandwidth_revenue, Currency::from(3u64).mul64(4));
        assert_eq!(applied.sectors_removed, vec![root]);
        assert_eq!(applied.new_roots.len(), 1);
        assert_ne!(applied.new_roots[0], root);
        // storage and collateral stay untouched on modify
        assert!(applied.storage_revenue.is_zero());
        assert!(applied.new_collateral.is_zero());

        let err = host
            .apply_revision_actions(&so, &settings, TEST_HEIGHT, &[modify(SECTOR_SIZE - 3, vec![1; 4])])
            .unwrap_err();
        assert!(matches!(err.root(), NegotiationError::IllegalOffsetAndLength));
    }

    #[test]
    fn delete_then_insert_restores_the_sector_list() {
        let renter = keypair();
        let (host, mut so) = host_with_obligation(&renter);
        let settings = host.settings();

        let sector = vec![9u8; SECTOR_SIZE as usize];
        let root = sector_root(&sector);
        host.store_sector(&root, &sector).unwrap();
        so.sector_roots.push(root);

        let batch = [
            RevisionAction { action_type: ACTION_DELETE, sector_index: 0, offset: 0, data: vec![] },
            insert_action(0, sector),
        ];
        let applied = host.apply_revision_actions(&so, &settings, TEST_HEIGHT, &batch).unwrap();
        assert_eq!(applied.new_roots, so.sector_roots);
        assert_eq!(roots_merkle_root(&applied.new_roots), roots_merkle_root(&so.sector_roots));
    }

    #[test]
    fn unknown_action_specifier_is_rejected() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let settings = host.settings();

        // the index guard treats non-insert actions as positional, so give it
        // a sector to point at
        let mut so = so;
        so.sector_roots.push(Hash::new_unique());
        let action = RevisionAction {
            action_type: ActionSpecifier(*b"Shrink\0\0"),
            sector_index: 0,
            offset: 0,
            data: vec![],
        };
        let err = host.apply_revision_actions(&so, &settings, TEST_HEIGHT, &[action]).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::UnknownModification));
    }

    #[test]
    fn verify_rejects_late_revisions_exactly_at_the_buffer() {
        let renter = keypair();
        let (_host, so) = host_with_obligation(&renter);
        let revision = paying_revision(&so, &[], &Currency::zero(), &Currency::zero());

        // at expiration - buffer the revision is already late
        let late_height = WINDOW_START - REVISION_SUBMISSION_BUFFER;
        let err =
            verify_revision(&so, &[], &revision, late_height, &Currency::zero(), &Currency::zero()).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::LateRevision));

        // one block earlier is still in time
        verify_revision(&so, &[], &revision, late_height - 1, &Currency::zero(), &Currency::zero()).unwrap();
    }

    #[test]
    fn verify_rejects_stale_revision_numbers() {
        let renter = keypair();
        let (_host, so) = host_with_obligation(&renter);
        let mut revision = paying_revision(&so, &[], &Currency::zero(), &Currency::zero());
        revision.new_revision_number = 0;

        let err =
            verify_revision(&so, &[], &revision, TEST_HEIGHT, &Currency::zero(), &Currency::zero()).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadRevisionNumber));
    }

    #[test]
    fn verify_walks_the_payment_predicates() {
        let renter = keypair();
        let (_host, so) = host_with_obligation(&renter);
        let revenue = Currency::from(1000u64);
        let collateral = Currency::from(500u64);

        let good = paying_revision(&so, &[], &revenue, &collateral);
        verify_revision(&so, &[], &good, TEST_HEIGHT, &revenue, &collateral).unwrap();

        let mut bad = good.clone();
        bad.new_valid_proof_outputs[0].value = &bad.new_valid_proof_outputs[0].value + &Currency::from(1u64);
        let err = verify_revision(&so, &[], &bad, TEST_HEIGHT, &revenue, &collateral).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::HighRenterValidOutput));

        let mut bad = good.clone();
        bad.new_valid_proof_outputs[1].value = revenue.checked_sub(&Currency::from(1u64)).unwrap();
        let err = verify_revision(&so, &[], &bad, TEST_HEIGHT, &revenue, &collateral).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::LowHostValidOutput));

        let mut bad = good.clone();
        bad.new_missed_proof_outputs[0].value = &bad.new_missed_proof_outputs[0].value + &Currency::from(1u64);
        let err = verify_revision(&so, &[], &bad, TEST_HEIGHT, &revenue, &collateral).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::HighRenterMissedOutput));

        let mut bad = good.clone();
        bad.new_missed_proof_outputs[1].value = &bad.new_missed_proof_outputs[1].value + &Currency::from(1u64);
        let err = verify_revision(&so, &[], &bad, TEST_HEIGHT, &revenue, &collateral).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::LowHostMissedOutput));

        let mut bad = good;
        bad.new_file_merkle_root = Hash::new_unique();
        let err = verify_revision(&so, &[], &bad, TEST_HEIGHT, &revenue, &collateral).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadFileMerkleRoot));
    }

    #[test]
    fn revision_signature_requires_a_valid_renter_signature() {
        let renter = keypair();
        let host_kp = keypair();
        let (_host, so) = host_with_obligation(&renter);
        let revision = paying_revision(&so, &[], &Currency::zero(), &Currency::zero());

        let msg = secp256k1::Message::from_slice(revision.sig_hash().as_ref()).unwrap();
        let good_sig = TransactionSignature {
            parent_id: revision.parent_id.0,
            public_key_index: 0,
            timelock: 0,
            covered_fields: CoveredFields { whole_transaction: true },
            signature: renter.sign_schnorr(msg).as_ref().to_vec(),
        };
        let txn = create_revision_signature(&revision, good_sig.clone(), &host_kp).unwrap();
        assert_eq!(txn.transaction_signatures.len(), 2);
        assert_eq!(txn.transaction_signatures[0], good_sig);
        assert_eq!(txn.transaction_signatures[1].public_key_index, 1);

        let mut bad_sig = good_sig;
        bad_sig.signature[0] ^= 0xff;
        let err = create_revision_signature(&revision, bad_sig, &host_kp).unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadSignature));
    }

    /// Drives the renter's half of a full revision session over an in-memory
    /// connection: one sector insert, then a stop on the following iteration.
    async fn renter_insert_session(
        conn: &mut (impl tokio::io::AsyncRead + AsyncWrite + Unpin + Send),
        renter_kp: &secp256k1::KeyPair,
        so: &StorageObligation,
        stale_revision: bool,
    ) -> Result<(), String> {
        write_object(conn, &so.id).await.map_err(|e| e.to_string())?;
        read_negotiation_acceptance(conn).await.map_err(|e| e.to_string())?;
        let _recent: Vec<Transaction> = read_object(conn, 1 << 20).await.map_err(|e| e.to_string())?;

        // iteration 1: insert one sector of zeros
        let signed: SignedSettings =
            read_object(conn, crate::settings::MAX_SETTINGS_LEN).await.map_err(|e| e.to_string())?;
        write_negotiation_acceptance(conn).await.map_err(|e| e.to_string())?;

        let sector = vec![0u8; SECTOR_SIZE as usize];
        let actions = vec![insert_action(0, sector.clone())];
        write_object(conn, &actions).await.map_err(|e| e.to_string())?;

        let remaining = WINDOW_END - TEST_HEIGHT;
        let storage = signed.settings.storage_price.mul64(remaining).mul64(SECTOR_SIZE);
        let bandwidth = signed.settings.upload_bandwidth_price.mul64(SECTOR_SIZE);
        let collateral = signed.settings.collateral.mul64(remaining).mul64(SECTOR_SIZE);
        let revenue = &storage + &bandwidth;

        let mut revision = paying_revision(so, &[sector_root(&sector)], &revenue, &collateral);
        if stale_revision {
            revision.new_revision_number = so.latest_revision().unwrap().new_revision_number;
        }
        write_object(conn, &revision).await.map_err(|e| e.to_string())?;

        match read_object::<_, NegotiationResponse>(conn, 1 << 12).await.map_err(|e| e.to_string())? {
            NegotiationResponse::Acceptance => {}
            NegotiationResponse::Rejection(reason) => return Err(reason),
            NegotiationResponse::Stop => return Err("unexpected stop".into()),
        }

        let msg = secp256k1::Message::from_slice(revision.sig_hash().as_ref()).unwrap();
        let renter_sig = TransactionSignature {
            parent_id: revision.parent_id.0,
            public_key_index: 0,
            timelock: 0,
            covered_fields: CoveredFields { whole_transaction: true },
            signature: renter_kp.sign_schnorr(msg).as_ref().to_vec(),
        };
        write_object(conn, &renter_sig).await.map_err(|e| e.to_string())?;

        match read_object::<_, NegotiationResponse>(conn, 1 << 12).await.map_err(|e| e.to_string())? {
            NegotiationResponse::Acceptance | NegotiationResponse::Stop => {}
            NegotiationResponse::Rejection(reason) => return Err(reason),
        }
        let _host_sig: TransactionSignature = read_object(conn, 1 << 12).await.map_err(|e| e.to_string())?;

        // iteration 2: stop the loop
        let _signed: SignedSettings =
            read_object(conn, crate::settings::MAX_SETTINGS_LEN).await.map_err(|e| e.to_string())?;
        write_negotiation_stop(conn).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    #[tokio::test]
    async fn successful_insert_iteration_commits_the_obligation() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let (mut host_conn, mut renter_conn) = tokio::io::duplex(1 << 23);

        let (host_result, renter_result) = tokio::join!(
            host.handle_revise_contract(&mut host_conn),
            renter_insert_session(&mut renter_conn, &renter, &so, false)
        );
        renter_result.unwrap();
        host_result.unwrap();

        let committed = host.storage_obligation(so.id).unwrap();
        let sector = vec![0u8; SECTOR_SIZE as usize];
        let remaining = WINDOW_END - TEST_HEIGHT;
        assert_eq!(committed.sector_roots, vec![sector_root(&sector)]);
        assert_eq!(committed.potential_storage_revenue, Currency::from(2u64).mul64(remaining).mul64(SECTOR_SIZE));
        assert_eq!(committed.potential_upload_revenue, Currency::from(3u64).mul64(SECTOR_SIZE));
        assert_eq!(committed.risked_collateral, Currency::from(1u64).mul64(remaining).mul64(SECTOR_SIZE));

        // committed obligation invariants
        let latest = committed.latest_revision().unwrap();
        assert_eq!(latest.new_revision_number, 1);
        assert_eq!(latest.new_file_size, committed.sector_roots.len() as u64 * SECTOR_SIZE);
        assert_eq!(latest.new_file_merkle_root, roots_merkle_root(&committed.sector_roots));

        // the sector itself is durable and content-addressed
        assert_eq!(host.read_sector(&committed.sector_roots[0]).unwrap(), sector);

        // the host signature the renter received verifies under the host key
        let host_sig = &committed.revision_transaction_set[0].transaction_signatures[1];
        let msg = secp256k1::Message::from_slice(latest.sig_hash().as_ref()).unwrap();
        let sig = secp256k1::schnorr::Signature::from_slice(&host_sig.signature).unwrap();
        let host_pk = secp256k1::XOnlyPublicKey::from_slice(&host.public_key().key).unwrap();
        sig.verify(&msg, &host_pk).unwrap();
    }

    #[tokio::test]
    async fn stale_revision_is_rejected_without_state_change() {
        let renter = keypair();
        let (host, so) = host_with_obligation(&renter);
        let (mut host_conn, mut renter_conn) = tokio::io::duplex(1 << 23);

        let (host_result, renter_result) = tokio::join!(
            host.handle_revise_contract(&mut host_conn),
            renter_insert_session(&mut renter_conn, &renter, &so, true)
        );

        let reason = renter_result.unwrap_err();
        assert!(reason.contains("revision number"), "unexpected rejection reason: {reason}");
        let err = host_result.unwrap_err();
        assert!(matches!(err.root(), NegotiationError::BadRevisionNumber));

        // nothing durable changed
        assert_eq!(host.storage_obligation(so.id).unwrap(), so);
    }
}
