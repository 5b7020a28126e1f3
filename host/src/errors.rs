use tarn_database::StoreError;
use tarn_utils::object_stream::ObjectStreamError;
use thiserror::Error;

/// Errors produced while negotiating with a renter. Revision-logic failures
/// are typed so they can be matched on after crossing the wire as rejection
/// text; transport and host-side failures are folded into `Connection` and
/// `Internal` respectively.
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The renter ended the loop; not a failure from the outer loop's
    /// perspective.
    #[error("sent a stop response")]
    StopResponse,

    #[error("negotiation rejected by peer: {0}")]
    PeerRejected(String),

    #[error("renter has made a modification that points to a nonexistent sector")]
    BadModificationIndex,

    #[error("renter has sent a sector that exceeds the maximum sector size")]
    LargeSector,

    #[error("renter has sent a sector with the wrong size")]
    BadSectorSize,

    #[error("renter is trying to modify a sector with an illegal offset and length")]
    IllegalOffsetAndLength,

    #[error("renter is attempting an unknown modification type")]
    UnknownModification,

    #[error("revision does not carry 2 valid and 3 missed proof outputs")]
    BadContractOutputCounts,

    #[error("revision submitted too close to the proof window")]
    LateRevision,

    #[error("revision does not have the correct parent contract")]
    BadContractParent,

    #[error("revision changed the unlock conditions")]
    BadUnlockConditions,

    #[error("revision number was not increased")]
    BadRevisionNumber,

    #[error("revision declares the wrong file size")]
    BadFileSize,

    #[error("revision changed the proof window start")]
    BadWindowStart,

    #[error("revision changed the proof window end")]
    BadWindowEnd,

    #[error("revision changed the new unlock hash")]
    BadUnlockHash,

    #[error("renter valid proof output does not give up the revenue")]
    HighRenterValidOutput,

    #[error("host valid proof output does not receive the revenue")]
    LowHostValidOutput,

    #[error("renter missed proof output does not give up the revenue")]
    HighRenterMissedOutput,

    #[error("host missed proof output does not give up the collateral")]
    LowHostMissedOutput,

    #[error("revision declares the wrong file merkle root")]
    BadFileMerkleRoot,

    #[error("transaction signature is invalid")]
    BadSignature,

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        source: Box<NegotiationError>,
    },
}

impl NegotiationError {
    /// Prefixes the error with the negotiation phase it surfaced in.
    pub fn extend(self, context: &'static str) -> Self {
        Self::Context { context, source: Box::new(self) }
    }

    /// Unwraps the context chain down to the originating cause.
    pub fn root(&self) -> &NegotiationError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.root(), Self::StopResponse)
    }
}

impl From<ObjectStreamError> for NegotiationError {
    fn from(err: ObjectStreamError) -> Self {
        NegotiationError::Connection(err.to_string())
    }
}

impl From<StoreError> for NegotiationError {
    fn from(err: StoreError) -> Self {
        NegotiationError::Internal(err.to_string())
    }
}

pub type NegotiationResult<T> = std::result::Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_chain_displays_outermost_first() {
        let err = NegotiationError::BadRevisionNumber
            .extend("unable to verify revision")
            .extend("revision iteration failed");
        assert_eq!(
            err.to_string(),
            "revision iteration failed: unable to verify revision: revision number was not increased"
        );
        assert!(matches!(err.root(), NegotiationError::BadRevisionNumber));
    }

    #[test]
    fn stop_survives_extension() {
        assert!(NegotiationError::StopResponse.extend("renter rejected settings").is_stop());
        assert!(!NegotiationError::BadFileSize.extend("x").is_stop());
    }
}
