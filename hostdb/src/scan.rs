//! Periodic scanning of the known hosts: who is online, with what settings,
//! and how reliable they have been.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::RngCore;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tarn_consensus_core::condition::PublicKey;
use tarn_consensus_core::currency::Currency;
use tarn_consensus_core::hashing::object_digest;
use tarn_core::{debug, info, warn};
use tarn_host::negotiation::RpcId;
use tarn_host::settings::{HostExternalSettings, SignedSettings, MAX_SETTINGS_LEN};
use tarn_utils::networking::NetAddress;
use tarn_utils::object_stream::{read_object, write_object, ObjectStreamError};

use crate::HostDb;

pub(crate) const DEFAULT_SCAN_SLEEP: Duration = Duration::from_secs(97 * 60);
pub(crate) const MAX_SCAN_SLEEP: Duration = Duration::from_secs(4 * 60 * 60);
pub(crate) const MIN_SCAN_SLEEP: Duration = Duration::from_secs(60 * 60);

pub(crate) const MAX_ACTIVE_HOSTS: usize = 500;
pub(crate) const INACTIVE_HOST_CHECKUP_QUANTITY: usize = 250;

pub(crate) const HOST_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of workers probing hosts for their settings and checking for
/// reliability.
pub(crate) const SCANNING_THREADS: usize = 25;

// Reliability is a measure of a host's uptime. Given the scanning defaults,
// the maximum buys about 6 weeks of survival and the default about 2.
pub static MAX_RELIABILITY: Lazy<Currency> = Lazy::new(|| Currency::from(500u64));
pub static DEFAULT_RELIABILITY: Lazy<Currency> = Lazy::new(|| Currency::from(150u64));
pub static UNREACHABLE_PENALTY: Lazy<Currency> = Lazy::new(|| Currency::from(1u64));

pub(crate) fn default_reliability() -> Currency {
    DEFAULT_RELIABILITY.clone()
}

/// What a probe worker needs to contact one host: the address to dial and the
/// key the reply must be signed with.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub net_address: NetAddress,
    pub public_key: PublicKey,
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("dial failed: {0}")]
    Dial(String),

    #[error("host did not answer within {0:?}")]
    Timeout(Duration),

    #[error("settings exchange failed: {0}")]
    Stream(#[from] ObjectStreamError),

    #[error("settings signature did not verify against the announced key")]
    BadSignature,
}

impl HostDb {
    /// Spawns the probe worker pool and the scan driver. The driver wakes at
    /// a randomized interval, enqueues every active host plus a random sample
    /// of the inactive ones, and goes back to sleep.
    pub fn start(self: &Arc<Self>) {
        let (sender, receiver) = mpsc::channel::<ProbeTarget>(SCANNING_THREADS);
        self.set_scan_pool(sender);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for _ in 0..SCANNING_THREADS {
            let hostdb = self.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                // workers drain the queue and exit when it closes
                loop {
                    let target = { receiver.lock().await.recv().await };
                    let Some(target) = target else { break };
                    debug!("scanning {} {:?}", target.net_address, target.public_key.key);
                    let result = probe_host(&target).await;
                    match &result {
                        Ok(_) => debug!("scanning {} succeeded", target.net_address),
                        Err(err) => debug!("scanning {} failed: {}", target.net_address, err),
                    }
                    hostdb.managed_update_entry(&target, result.ok());
                }
            });
        }

        let hostdb = self.clone();
        tokio::spawn(async move {
            loop {
                if hostdb.shutdown().trigger.is_triggered() {
                    break;
                }
                hostdb.queue_scans();

                // Sleep a random amount of time before the next round; the
                // bounds keep the cadence reasonable while the randomness
                // keeps scans from always landing at the same time of day.
                let listener = hostdb.shutdown().listener.clone();
                tokio::select! {
                    _ = tokio::time::sleep(random_scan_sleep()) => {}
                    _ = listener => break,
                }
            }
            info!("host scanner exiting");
        });
    }

    /// Assembles this round's probe targets: every active host, then up to
    /// `INACTIVE_HOST_CHECKUP_QUANTITY` inactive ones in random order. The
    /// enqueueing itself runs on a detached task so a full probe queue can
    /// never deadlock the driver while it holds the scanner lock.
    fn queue_scans(&self) {
        let targets = self.scan_candidates();
        let Some(sender) = self.scan_pool() else { return };
        tokio::spawn(async move {
            for target in targets {
                if sender.send(target).await.is_err() {
                    return;
                }
            }
        });
    }

    pub(crate) fn scan_candidates(&self) -> Vec<ProbeTarget> {
        let state = self.state().lock();
        let mut targets: Vec<ProbeTarget> = Vec::new();

        for addr in &state.active_hosts {
            let entry = &state.all_hosts[addr];
            targets.push(ProbeTarget { net_address: addr.clone(), public_key: entry.public_key.clone() });
        }

        let mut inactive: Vec<ProbeTarget> = state
            .all_hosts
            .values()
            .filter(|entry| !state.active_hosts.contains(entry.net_address()))
            .map(|entry| ProbeTarget { net_address: entry.net_address().clone(), public_key: entry.public_key.clone() })
            .collect();
        inactive.shuffle(&mut rand::thread_rng());
        inactive.truncate(INACTIVE_HOST_CHECKUP_QUANTITY);
        targets.extend(inactive);
        targets
    }
}

/// Dials a host, requests its settings and verifies the signed reply against
/// the announced public key. A forged or garbled reply is indistinguishable
/// from unreachability to the caller.
pub async fn probe_host(target: &ProbeTarget) -> Result<HostExternalSettings, ProbeError> {
    let mut stream = match timeout(HOST_REQUEST_TIMEOUT, TcpStream::connect(target.net_address.as_str())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(ProbeError::Dial(err.to_string())),
        Err(_) => return Err(ProbeError::Timeout(HOST_REQUEST_TIMEOUT)),
    };

    let exchange = async {
        write_object(&mut stream, &RpcId::Settings).await?;
        read_object::<_, SignedSettings>(&mut stream, MAX_SETTINGS_LEN).await
    };
    let signed = match timeout(HOST_REQUEST_TIMEOUT, exchange).await {
        Ok(result) => result?,
        Err(_) => return Err(ProbeError::Timeout(HOST_REQUEST_TIMEOUT)),
    };

    verify_settings_signature(&signed, &target.public_key)?;
    Ok(signed.settings)
}

fn verify_settings_signature(signed: &SignedSettings, public_key: &PublicKey) -> Result<(), ProbeError> {
    let pk = secp256k1::XOnlyPublicKey::from_slice(&public_key.key).map_err(|_| ProbeError::BadSignature)?;
    let signature =
        secp256k1::schnorr::Signature::from_slice(&signed.signature).map_err(|_| ProbeError::BadSignature)?;
    let digest = object_digest(&signed.settings);
    let msg = secp256k1::Message::from_slice(digest.as_ref()).expect("digest is 32 bytes");
    signature.verify(&msg, &pk).map_err(|_| ProbeError::BadSignature)
}

/// Uniform draw from `[MIN_SCAN_SLEEP, MAX_SCAN_SLEEP)`. Falls back to the
/// fixed default interval if the system RNG fails.
fn random_scan_sleep() -> Duration {
    let mut bytes = [0u8; 8];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => {
            let span = (MAX_SCAN_SLEEP - MIN_SCAN_SLEEP).as_secs();
            let offset = u64::from_le_bytes(bytes) % span;
            MIN_SCAN_SLEEP + Duration::from_secs(offset)
        }
        Err(err) => {
            warn!("could not draw a random scan interval: {}", err);
            DEFAULT_SCAN_SLEEP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_database::Database;
    use tarn_host::settings::HostInternalSettings;
    use tarn_host::Host;

    #[test]
    fn scan_sleep_stays_within_bounds() {
        for _ in 0..64 {
            let sleep = random_scan_sleep();
            assert!(sleep >= MIN_SCAN_SLEEP && sleep < MAX_SCAN_SLEEP);
        }
        // the fallback interval respects the same bounds
        assert!(DEFAULT_SCAN_SLEEP >= MIN_SCAN_SLEEP && DEFAULT_SCAN_SLEEP < MAX_SCAN_SLEEP);
    }

    #[tokio::test]
    async fn probe_reads_and_verifies_signed_settings() {
        let secp = secp256k1::Secp256k1::new();
        let keypair = secp256k1::KeyPair::new(&secp, &mut rand::thread_rng());
        let settings = HostInternalSettings { min_storage_price: Currency::from(11u64), ..Default::default() };
        let host = Arc::new(Host::new(Arc::new(Database::new()), settings, keypair).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let serving = host.clone();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().await.unwrap();
                let _ = serving.handle_connection(&mut conn).await;
            }
        });

        let target = ProbeTarget {
            net_address: NetAddress::from(format!("127.0.0.1:{port}")),
            public_key: host.public_key(),
        };
        let scanned = probe_host(&target).await.unwrap();
        assert_eq!(scanned.storage_price, Currency::from(11u64));

        // a mismatched announced key is indistinguishable from a forged reply
        let wrong_key = ProbeTarget {
            net_address: target.net_address.clone(),
            public_key: PublicKey::new_schnorr(vec![1; 32]),
        };
        assert!(matches!(probe_host(&wrong_key).await, Err(ProbeError::BadSignature)));
    }

    #[tokio::test]
    async fn probe_of_an_unreachable_host_fails() {
        // a listener that is immediately dropped leaves a dead port behind
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ProbeTarget {
            net_address: NetAddress::from(format!("127.0.0.1:{port}")),
            public_key: PublicKey::new_schnorr(vec![1; 32]),
        };
        assert!(probe_host(&target).await.is_err());
    }
}
