pub mod entry;
pub mod hostweight;
mod persist;
pub mod scan;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use tokio::sync::mpsc;

use tarn_consensus_core::condition::PublicKey;
use tarn_consensus_core::currency::Currency;
use tarn_core::warn;
use tarn_database::{Database, StoreResult};
use tarn_host::settings::HostExternalSettings;
use tarn_utils::networking::NetAddress;
use tarn_utils::triggers::SingleTrigger;

use crate::entry::HostEntry;
use crate::hostweight::calculate_host_weight;
use crate::scan::{ProbeTarget, MAX_ACTIVE_HOSTS, MAX_RELIABILITY, UNREACHABLE_PENALTY};

pub(crate) struct HostDbState {
    /// Owns every known host entry, keyed by announced address.
    pub all_hosts: HashMap<NetAddress, HostEntry>,
    /// Addresses of hosts eligible for selection; entries stay owned by
    /// `all_hosts`, removal from here never destroys one.
    pub active_hosts: HashSet<NetAddress>,
}

/// The host database tracks every announced host, probes them periodically
/// and maintains a weighted active set for renter-side host selection.
pub struct HostDb {
    db: Arc<Database>,
    state: Mutex<HostDbState>,
    scan_pool: Mutex<Option<mpsc::Sender<ProbeTarget>>>,
    shutdown: SingleTrigger,
}

impl HostDb {
    pub fn new(db: Arc<Database>) -> StoreResult<Arc<Self>> {
        let hostdb = Arc::new(Self {
            db,
            state: Mutex::new(HostDbState { all_hosts: HashMap::new(), active_hosts: HashSet::new() }),
            scan_pool: Mutex::new(None),
            shutdown: SingleTrigger::new(),
        });
        hostdb.load()?;
        Ok(hostdb)
    }

    /// Registers a newly announced host. Announcements never carry settings,
    /// so the entry starts offline with default reliability until a scan
    /// confirms it.
    pub fn insert_host(&self, net_address: NetAddress, public_key: PublicKey) {
        let mut state = self.state.lock();
        if state.all_hosts.contains_key(&net_address) {
            return;
        }
        state.all_hosts.insert(net_address.clone(), HostEntry::new(net_address, public_key));
        self.save_locked(&state);
    }

    pub fn host(&self, net_address: &NetAddress) -> Option<HostEntry> {
        self.state.lock().all_hosts.get(net_address).cloned()
    }

    pub fn all_hosts(&self) -> Vec<HostEntry> {
        self.state.lock().all_hosts.values().cloned().collect_vec()
    }

    pub fn active_hosts(&self) -> Vec<HostEntry> {
        let state = self.state.lock();
        state.active_hosts.iter().map(|addr| state.all_hosts[addr].clone()).collect_vec()
    }

    /// Draws up to `n` distinct active hosts, selection probability
    /// proportional to weight.
    pub fn random_hosts(&self, n: usize, exclude: &HashSet<NetAddress>) -> Vec<HostEntry> {
        let state = self.state.lock();
        let candidates: Vec<&HostEntry> = state
            .active_hosts
            .iter()
            .filter(|addr| !exclude.contains(*addr))
            .map(|addr| &state.all_hosts[addr])
            .collect();
        let weights: Vec<f64> = candidates.iter().map(|entry| entry.weight.to_f64_lossy()).collect();

        let Ok(mut index) = WeightedIndex::new(weights) else { return Vec::new() };
        let mut rng = rand::thread_rng();
        let mut selected = Vec::new();
        for _ in 0..n.min(candidates.len()) {
            let i = index.sample(&mut rng);
            selected.push(candidates[i].clone());
            // zero the taken entry; stop once every weight is gone
            if index.update_weights(&[(i, &0.0)]).is_err() {
                break;
            }
        }
        selected
    }

    /// Folds a probe result back into the database. On success the entry is
    /// refreshed and (re)inserted into the active set; on failure its
    /// reliability drains, evicting it entirely at zero.
    pub fn managed_update_entry(&self, target: &ProbeTarget, settings: Option<HostExternalSettings>) {
        let mut state = self.state.lock();

        // Regardless of whether the host responded, make sure it is known.
        let prior_key = match state.all_hosts.get(&target.net_address) {
            Some(prior) => Some(prior.public_key.key.clone()),
            None => {
                state
                    .all_hosts
                    .insert(target.net_address.clone(), HostEntry::new(target.net_address.clone(), target.public_key.clone()));
                None
            }
        };

        let Some(new_settings) = settings else {
            // Only penalize when the recorded public key matches the probed
            // one: the failure may just be a failed signature, meaning the
            // announcement key was wrong rather than the host being down.
            if matches!(prior_key, Some(key) if key == target.public_key.key) {
                Self::decrement_reliability(&mut state, &target.net_address, &UNREACHABLE_PENALTY);
                self.save_locked(&state);
            }
            return;
        };

        // The tree invariants require that a node's weight never changes while
        // it is in the active set, so remove the entry before touching it.
        state.active_hosts.remove(&target.net_address);

        let active_len = state.active_hosts.len();
        let entry = state.all_hosts.get_mut(&target.net_address).expect("entry inserted above");
        // The announced address outlives whatever the host claims about itself.
        let recorded_address = entry.settings.net_address.clone();
        entry.settings = new_settings;
        entry.settings.net_address = recorded_address;
        entry.reliability = MAX_RELIABILITY.clone();
        entry.weight = calculate_host_weight(entry);
        entry.online = true;

        if active_len < MAX_ACTIVE_HOSTS {
            state.active_hosts.insert(target.net_address.clone());
        }
        self.save_locked(&state);
    }

    /// Drains reliability, demoting the host from the active set and deleting
    /// it outright once the score reaches zero.
    fn decrement_reliability(state: &mut HostDbState, net_address: &NetAddress, penalty: &Currency) {
        let Some(entry) = state.all_hosts.get_mut(net_address) else {
            warn!("reliability penalty for unknown host {}", net_address);
            return;
        };
        entry.reliability = entry.reliability.saturating_sub(penalty);
        entry.online = false;
        state.active_hosts.remove(net_address);

        if entry.reliability.is_zero() {
            state.all_hosts.remove(net_address);
        }
    }

    /// Signals the scanner to terminate. Workers drain their queue and exit.
    pub fn close(&self) {
        self.shutdown.trigger.trigger();
        *self.scan_pool.lock() = None;
    }

    pub(crate) fn state(&self) -> &Mutex<HostDbState> {
        &self.state
    }

    pub(crate) fn shutdown(&self) -> &SingleTrigger {
        &self.shutdown
    }

    pub(crate) fn scan_pool(&self) -> Option<mpsc::Sender<ProbeTarget>> {
        self.scan_pool.lock().clone()
    }

    pub(crate) fn set_scan_pool(&self, sender: mpsc::Sender<ProbeTarget>) {
        *self.scan_pool.lock() = Some(sender);
    }
}
