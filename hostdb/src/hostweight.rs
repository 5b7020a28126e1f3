use once_cell::sync::Lazy;
use tarn_consensus_core::currency::Currency;

use crate::entry::HostEntry;

/// Most weights would otherwise be fractional, so the base weight is 10^150
/// to keep plenty of precision through the repeated divisions below.
pub static BASE_WEIGHT: Lazy<Currency> = Lazy::new(|| Currency::from(10u32).pow(150));

/// Returns the selection weight of a host according to its advertised
/// settings. Currently only the price is considered.
///
/// Prices are tiered as follows:
///   - the storage price is presented as 'per block per byte'
///   - the contract price is presented as a flat rate
///   - the upload and download bandwidth prices are per byte
///
/// The adjustments assume a contract covers 6 weeks (6048 blocks) and 10 GB
/// of storage, one upload per 24 weeks and one download per 12 weeks.
pub fn calculate_host_weight(entry: &HostEntry) -> Currency {
    let settings = &entry.settings;
    let adjusted_contract_price = settings.contract_price.div64(6048).div64(10_000_000_000);
    let adjusted_upload_price = settings.upload_bandwidth_price.div64(24192);
    let adjusted_download_price = settings.download_bandwidth_price.div64(12096);
    let adjusted_prices = &(&adjusted_contract_price + &adjusted_upload_price) + &adjusted_download_price;
    let fee = (&adjusted_prices + &settings.collateral).mul_tax();
    let total_price = &(&settings.storage_price + &adjusted_prices) + &fee;

    // Divide the base weight by the price raised to the fifth power: a host
    // with half the total price is 32x as likely to be selected.
    let mut weight = BASE_WEIGHT.clone();
    if !total_price.is_zero() {
        for _ in 0..5 {
            weight = &weight / &total_price;
        }
    }

    if settings.collateral.is_zero() {
        // Instead of zeroing out the weight, return it as though the
        // collateral were a single base unit: competitively, that is
        // effectively zero.
        return weight;
    }
    &weight * &settings.collateral
}
