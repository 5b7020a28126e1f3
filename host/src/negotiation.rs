//! Wire vocabulary of the negotiation protocol: RPC identifiers, the
//! acceptance/rejection/stop tokens, and revision actions.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::{NegotiationError, NegotiationResult};
use tarn_utils::object_stream::{read_object, write_object};

/// Cap on a negotiation response token (the rejection variant carries an
/// error string).
pub const MAX_NEGOTIATION_RESPONSE_SIZE: u64 = 2048;

/// Cap on the contract identifier frame opening a revision session.
pub const MAX_CONTRACT_ID_SIZE: u64 = 256;

/// First frame of every inbound host connection, selecting the RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcId {
    Settings,
    RecentRevision,
    ReviseContract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationResponse {
    Acceptance,
    Rejection(String),
    Stop,
}

/// Reads the peer's response token. A rejection or a stop surfaces as the
/// corresponding error so call sites can use `?` throughout.
pub async fn read_negotiation_acceptance<C>(conn: &mut C) -> NegotiationResult<()>
where
    C: AsyncRead + Unpin,
{
    match read_object(conn, MAX_NEGOTIATION_RESPONSE_SIZE).await? {
        NegotiationResponse::Acceptance => Ok(()),
        NegotiationResponse::Rejection(reason) => Err(NegotiationError::PeerRejected(reason)),
        NegotiationResponse::Stop => Err(NegotiationError::StopResponse),
    }
}

pub async fn write_negotiation_acceptance<C>(conn: &mut C) -> NegotiationResult<()>
where
    C: AsyncWrite + Unpin,
{
    Ok(write_object(conn, &NegotiationResponse::Acceptance).await?)
}

/// Sends the error text back as a rejection. Callers deliberately ignore the
/// result so the original typed error is what propagates.
pub async fn write_negotiation_rejection<C>(conn: &mut C, err: &NegotiationError) -> NegotiationResult<()>
where
    C: AsyncWrite + Unpin,
{
    Ok(write_object(conn, &NegotiationResponse::Rejection(err.to_string())).await?)
}

pub async fn write_negotiation_stop<C>(conn: &mut C) -> NegotiationResult<()>
where
    C: AsyncWrite + Unpin,
{
    Ok(write_object(conn, &NegotiationResponse::Stop).await?)
}

/// Distinguishes revision action types on the wire. An eight-byte specifier
/// rather than an enum, so future action types decode cleanly and fall through
/// to the unknown-modification rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpecifier(pub [u8; 8]);

pub const ACTION_INSERT: ActionSpecifier = ActionSpecifier(*b"Insert\0\0");
pub const ACTION_DELETE: ActionSpecifier = ActionSpecifier(*b"Delete\0\0");
pub const ACTION_MODIFY: ActionSpecifier = ActionSpecifier(*b"Modify\0\0");

/// One sector modification requested by the renter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionAction {
    pub action_type: ActionSpecifier,
    pub sector_index: u64,
    pub offset: u64,
    pub data: Vec<u8>,
}
