use serde::{Deserialize, Serialize};
use tarn_consensus_core::condition::PublicKey;
use tarn_consensus_core::currency::Currency;
use tarn_host::settings::HostExternalSettings;
use tarn_utils::networking::NetAddress;

use crate::hostweight::calculate_host_weight;
use crate::scan::default_reliability;

/// One known host: its announced address and key, the settings from the last
/// successful scan, and the bookkeeping the scanner maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    pub settings: HostExternalSettings,
    pub public_key: PublicKey,
    /// Uptime score; drains on failed scans, entry dies at zero.
    pub reliability: Currency,
    pub weight: Currency,
    pub online: bool,
}

impl HostEntry {
    /// A freshly announced host: not yet online, default reliability.
    pub fn new(net_address: NetAddress, public_key: PublicKey) -> Self {
        let settings = HostExternalSettings { net_address, ..Default::default() };
        let mut entry =
            Self { settings, public_key, reliability: default_reliability(), weight: Currency::zero(), online: false };
        entry.weight = calculate_host_weight(&entry);
        entry
    }

    pub fn net_address(&self) -> &NetAddress {
        &self.settings.net_address
    }
}
