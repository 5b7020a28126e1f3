use serde::{Deserialize, Serialize};

use tarn_core::warn;
use tarn_database::{StoreResult, StoreResultExtensions};

use crate::entry::HostEntry;
use crate::scan::MAX_ACTIVE_HOSTS;
use crate::{HostDb, HostDbState};

const BUCKET_HOSTDB: &str = "HostDb";
/// Versioned record key; bump on layout changes.
const KEY_HOSTDB: &[u8] = b"hostdb.v1";

#[derive(Serialize, Deserialize)]
struct HostDbPersist {
    hosts: Vec<HostEntry>,
}

impl HostDb {
    /// Persists all host entries. Called with the scanner lock held, after
    /// every mutation; a failing write is logged rather than crashing the
    /// scanner.
    pub(crate) fn save_locked(&self, state: &HostDbState) {
        let record = HostDbPersist { hosts: state.all_hosts.values().cloned().collect() };
        let result = self.db.update(|tx| {
            tx.create_bucket_if_not_exists(BUCKET_HOSTDB);
            tx.put_obj(BUCKET_HOSTDB, KEY_HOSTDB, &record)
        });
        if let Err(err) = result {
            warn!("could not save host database: {}", err);
        }
    }

    /// Restores entries from disk and rebuilds the active set from the hosts
    /// that were online, up to the active cap.
    pub(crate) fn load(&self) -> StoreResult<()> {
        let record: Option<HostDbPersist> = self
            .db
            .view(|tx| {
                if !tx.bucket_exists(BUCKET_HOSTDB) {
                    return Ok(None);
                }
                tx.get_obj(BUCKET_HOSTDB, KEY_HOSTDB).map(Some)
            })
            .unwrap_option()
            .flatten();
        let Some(record) = record else { return Ok(()) };

        let mut state = self.state().lock();
        for entry in record.hosts {
            if entry.online && !entry.reliability.is_zero() && state.active_hosts.len() < MAX_ACTIVE_HOSTS {
                state.active_hosts.insert(entry.net_address().clone());
            }
            state.all_hosts.insert(entry.net_address().clone(), entry);
        }
        Ok(())
    }
}
