pub mod errors;
mod negotiate_revision;
pub mod negotiation;
pub mod settings;
pub mod storage_obligation;

pub use negotiate_revision::{create_revision_signature, verify_revision};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};

use tarn_consensus_core::condition::PublicKey;
use tarn_consensus_core::hashing::object_digest;
use tarn_consensus_core::tx::{BlockHeight, FileContractId};
use tarn_core::debug;
use tarn_database::{Database, StoreResult};
use tarn_hashes::Hash;
use tarn_utils::object_stream::{read_object, write_object};

use crate::errors::{NegotiationError, NegotiationResult};
use crate::negotiation::RpcId;
use crate::settings::{HostInternalSettings, SignedSettings};
use crate::storage_obligation::{ObligationLocks, StorageObligation};

const BUCKET_OBLIGATIONS: &str = "StorageObligations";
const BUCKET_SECTORS: &str = "HostSectors";

const MAX_RPC_ID_SIZE: u64 = 64;

struct HostState {
    settings: HostInternalSettings,
    secret_key: secp256k1::KeyPair,
    block_height: BlockHeight,
    /// Bumped on every settings change so renters can order advertisements.
    settings_revision: u64,
}

/// A storage host. One instance serves many renter connections; obligations
/// are guarded by per-contract locks, while the fields below share a single
/// read-write lock that is only held for field snapshots.
pub struct Host {
    db: Arc<Database>,
    state: RwLock<HostState>,
    obligation_locks: ObligationLocks,
}

impl Host {
    pub fn new(db: Arc<Database>, settings: HostInternalSettings, secret_key: secp256k1::KeyPair) -> StoreResult<Self> {
        db.update(|tx| {
            tx.create_bucket_if_not_exists(BUCKET_OBLIGATIONS);
            tx.create_bucket_if_not_exists(BUCKET_SECTORS);
            Ok(())
        })?;
        Ok(Self {
            db,
            state: RwLock::new(HostState { settings, secret_key, block_height: 0, settings_revision: 0 }),
            obligation_locks: ObligationLocks::default(),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        let (xonly, _parity) = self.state.read().secret_key.x_only_public_key();
        PublicKey::new_schnorr(xonly.serialize().to_vec())
    }

    pub fn block_height(&self) -> BlockHeight {
        self.state.read().block_height
    }

    pub fn set_block_height(&self, height: BlockHeight) {
        self.state.write().block_height = height;
    }

    pub fn settings(&self) -> HostInternalSettings {
        self.state.read().settings.clone()
    }

    pub fn set_settings(&self, settings: HostInternalSettings) {
        let mut state = self.state.write();
        state.settings = settings;
        state.settings_revision += 1;
    }

    /// One brief read-lock acquisition for everything an iteration needs.
    pub(crate) fn snapshot(&self) -> (HostInternalSettings, secp256k1::KeyPair, BlockHeight) {
        let state = self.state.read();
        (state.settings.clone(), state.secret_key, state.block_height)
    }

    /// The current external settings, signed with the host key so a scanner
    /// can verify them against the announced public key.
    pub fn signed_settings(&self) -> SignedSettings {
        let state = self.state.read();
        let settings = state.settings.external(state.settings_revision);
        let digest = object_digest(&settings);
        let msg = secp256k1::Message::from_slice(digest.as_ref()).expect("digest is 32 bytes");
        let signature = state.secret_key.sign_schnorr(msg).as_ref().to_vec();
        SignedSettings { settings, signature }
    }

    pub(crate) async fn managed_rpc_settings<C>(&self, conn: &mut C) -> NegotiationResult<()>
    where
        C: AsyncWrite + Unpin,
    {
        let signed = self.signed_settings();
        write_object(conn, &signed).await.map_err(|err| NegotiationError::Connection(err.to_string()))
    }

    /// Dispatches one inbound connection by its leading RPC identifier.
    pub async fn handle_connection<C>(&self, conn: &mut C) -> NegotiationResult<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let rpc: RpcId = read_object(conn, MAX_RPC_ID_SIZE)
            .await
            .map_err(|err| NegotiationError::Connection(err.to_string()))?;
        debug!("host serving inbound rpc {:?}", rpc);
        match rpc {
            RpcId::Settings => self.managed_rpc_settings(conn).await,
            RpcId::RecentRevision => {
                // the lock guard drops right away; this RPC only reads
                let _ = self.managed_rpc_recent_revision(conn).await?;
                Ok(())
            }
            RpcId::ReviseContract => self.handle_revise_contract(conn).await,
        }
    }

    pub fn add_storage_obligation(&self, so: &StorageObligation) -> StoreResult<()> {
        self.db.update(|tx| tx.put_obj(BUCKET_OBLIGATIONS, so.id.0.as_ref(), so))
    }

    pub fn storage_obligation(&self, id: FileContractId) -> StoreResult<StorageObligation> {
        self.db.view(|tx| tx.get_obj(BUCKET_OBLIGATIONS, id.0.as_ref()))
    }

    /// Sector data is content-addressed by its merkle root.
    pub fn read_sector(&self, root: &Hash) -> NegotiationResult<Vec<u8>> {
        self.db
            .view(|tx| tx.get(BUCKET_SECTORS, root.as_ref()))
            .map_err(|err| NegotiationError::Internal(err.to_string()))
    }

    pub fn store_sector(&self, root: &Hash, data: &[u8]) -> StoreResult<()> {
        self.db.update(|tx| tx.put(BUCKET_SECTORS, root.as_ref(), data.to_vec()))
    }

    /// Commits a revised obligation together with its sector-set delta in one
    /// transaction: either the record, the gained sectors and the removals all
    /// land, or none of them do.
    pub(crate) fn modify_storage_obligation(
        &self,
        so: &StorageObligation,
        sectors_removed: &[Hash],
        sectors_gained: &[Hash],
        gained_sector_data: &[Vec<u8>],
    ) -> StoreResult<()> {
        self.db.update(|tx| {
            tx.put_obj(BUCKET_OBLIGATIONS, so.id.0.as_ref(), so)?;
            for root in sectors_removed {
                // a root may have been replaced within the same batch
                let _ = tx.delete(BUCKET_SECTORS, root.as_ref());
            }
            for (root, data) in sectors_gained.iter().zip(gained_sector_data) {
                tx.put(BUCKET_SECTORS, root.as_ref(), data.clone())?;
            }
            Ok(())
        })
    }

    /// Opens a revision session: reads the contract ID, takes the contract's
    /// exclusive lock, and replies with the most recent revision transaction
    /// set. The returned guard keeps the obligation locked until dropped.
    pub(crate) async fn managed_rpc_recent_revision<C>(
        &self,
        conn: &mut C,
    ) -> NegotiationResult<(tokio::sync::OwnedMutexGuard<()>, StorageObligation)>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let id: FileContractId = read_object(conn, negotiation::MAX_CONTRACT_ID_SIZE)
            .await
            .map_err(|err| NegotiationError::Connection(err.to_string()))?;
        let guard = self.obligation_locks.lock(id).await;
        let so = self.storage_obligation(id).map_err(|err| {
            NegotiationError::Internal(err.to_string()).extend("could not fetch storage obligation")
        })?;
        negotiation::write_negotiation_acceptance(conn).await?;
        write_object(conn, &so.revision_transaction_set)
            .await
            .map_err(|err| NegotiationError::Connection(err.to_string()))?;
        Ok((guard, so))
    }
}
