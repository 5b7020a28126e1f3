use serde::{Deserialize, Serialize};
use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::tx::BlockHeight;
use tarn_utils::networking::NetAddress;

/// Cap on a settings object read off the wire.
pub const MAX_SETTINGS_LEN: u64 = 2000;

/// Host configuration as the operator sets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInternalSettings {
    pub accepting_contracts: bool,
    /// Byte cap on a batch of revision modifications read in one iteration.
    pub max_revise_batch_size: u64,
    pub net_address: NetAddress,
    pub window_size: BlockHeight,

    pub collateral: Currency,
    pub contract_price: Currency,
    pub min_download_bandwidth_price: Currency,
    /// Per block, per byte.
    pub min_storage_price: Currency,
    /// Per byte.
    pub min_upload_bandwidth_price: Currency,
}

impl Default for HostInternalSettings {
    fn default() -> Self {
        Self {
            accepting_contracts: false,
            max_revise_batch_size: 17 << 20,
            net_address: NetAddress::from(""),
            window_size: 144,
            collateral: Currency::zero(),
            contract_price: Currency::zero(),
            min_download_bandwidth_price: Currency::zero(),
            min_storage_price: Currency::zero(),
            min_upload_bandwidth_price: Currency::zero(),
        }
    }
}

impl HostInternalSettings {
    pub fn external(&self, revision_number: u64) -> HostExternalSettings {
        HostExternalSettings {
            accepting_contracts: self.accepting_contracts,
            max_revise_batch_size: self.max_revise_batch_size,
            net_address: self.net_address.clone(),
            window_size: self.window_size,
            collateral: self.collateral.clone(),
            contract_price: self.contract_price.clone(),
            download_bandwidth_price: self.min_download_bandwidth_price.clone(),
            storage_price: self.min_storage_price.clone(),
            upload_bandwidth_price: self.min_upload_bandwidth_price.clone(),
            revision_number,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The price vector and limits a host advertises to renters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostExternalSettings {
    pub accepting_contracts: bool,
    pub max_revise_batch_size: u64,
    pub net_address: NetAddress,
    pub window_size: BlockHeight,

    pub collateral: Currency,
    pub contract_price: Currency,
    pub download_bandwidth_price: Currency,
    pub storage_price: Currency,
    pub upload_bandwidth_price: Currency,

    pub revision_number: u64,
    pub version: String,
}

impl Default for HostExternalSettings {
    fn default() -> Self {
        HostInternalSettings::default().external(0)
    }
}

/// Settings as served over the wire: signed with the host key so scanners can
/// verify them against the announced public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSettings {
    pub settings: HostExternalSettings,
    pub signature: Vec<u8>,
}
