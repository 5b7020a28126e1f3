use std::time::Duration;

use crate::tx::BlockHeight;

/// Size in bytes of a full sector of renter data. Sectors are the atomic unit
/// of contract modifications; their roots identify the data.
pub const SECTOR_SIZE: u64 = 1 << 22;

/// A revision must land this many blocks before the contract expires so the
/// host has time to finalize and submit it.
pub const REVISION_SUBMISSION_BUFFER: BlockHeight = 144;

/// Total time a renter may keep iterating revisions over one connection.
pub const ITERATED_CONNECTION_TIME: Duration = Duration::from_secs(1200);

/// Deadline for completing a single revision iteration.
pub const NEGOTIATE_FILE_CONTRACT_REVISION_TIME: Duration = Duration::from_secs(600);

/// Wire size caps enforced when reading negotiation objects.
pub const NEGOTIATE_MAX_FILE_CONTRACT_REVISION_SIZE: u64 = 3000;
pub const NEGOTIATE_MAX_TRANSACTION_SIGNATURE_SIZE: u64 = 2000;

pub const BLOCK_SIZE_LIMIT: u64 = 2_000_000;
pub const ARBITRARY_DATA_SIZE_LIMIT: u64 = 83;

/// Smallest miner fee a relayed transaction may carry, in base units.
pub const MINIMUM_MINER_FEE: u64 = 100_000_000;
