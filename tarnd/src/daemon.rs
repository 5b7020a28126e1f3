use std::sync::Arc;
use std::time::Instant;

use tarn_consensus::consensus_db::ConsensusDb;
use tarn_core::{error, info};
use tarn_database::Database;
use tarn_host::settings::HostInternalSettings;
use tarn_host::Host;
use tarn_hostdb::HostDb;
use tarn_utils::networking::NetAddress;

use crate::args::Config;
use crate::config::process_config;

/// Initializes the enabled modules and serves until a stop signal arrives.
pub async fn start_daemon(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let config = process_config(config)?;

    info!("Loading tarnd...");
    let load_start = Instant::now();
    let db = Arc::new(Database::new());

    let module_count = config.modules.len();
    let mut loaded = 0;
    let mut consensus: Option<Arc<ConsensusDb>> = None;
    for letter in config.modules.chars() {
        loaded += 1;
        match letter {
            'c' => {
                info!("({loaded}/{module_count}) Loading consensus...");
                consensus = Some(Arc::new(ConsensusDb::new(db.clone())?));
            }
            // gateway, transaction pool, wallet and explorer are served by
            // external processes in this deployment
            'g' => info!("({loaded}/{module_count}) Skipping gateway (external)"),
            't' => info!("({loaded}/{module_count}) Skipping transaction pool (external)"),
            'w' => info!("({loaded}/{module_count}) Skipping wallet (external)"),
            'e' => info!("({loaded}/{module_count}) Skipping explorer (external)"),
            other => unreachable!("module letter {other} survived process_config"),
        }
    }

    // The host and its database are the reason this daemon exists; they are
    // always started.
    let secp = secp256k1::Secp256k1::new();
    let keypair = secp256k1::KeyPair::new(&secp, &mut rand::thread_rng());
    let settings = HostInternalSettings {
        net_address: NetAddress::from(config.host_addr.as_str()),
        ..Default::default()
    };
    let host = Arc::new(Host::new(db.clone(), settings, keypair)?);
    if let Some(consensus) = &consensus {
        host.set_block_height(consensus.db_block_height()?);
    }

    let hostdb = HostDb::new(db)?;
    hostdb.start();

    // a bare ":port" means all interfaces
    let listen_addr = if config.host_addr.starts_with(':') {
        format!("0.0.0.0{}", config.host_addr)
    } else {
        config.host_addr.clone()
    };
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("host listening on {}", listen_addr);
    let serving_host = host.clone();
    let accept_loop = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut conn, peer)) => {
                    let host = serving_host.clone();
                    tokio::spawn(async move {
                        if let Err(err) = host.handle_connection(&mut conn).await {
                            if !err.is_stop() {
                                error!("connection from {} failed: {}", peer, err);
                            }
                        }
                    });
                }
                Err(err) => {
                    error!("accept failed: {}", err);
                    break;
                }
            }
        }
    });

    info!("Finished loading in {:.3} seconds", load_start.elapsed().as_secs_f64());

    tokio::signal::ctrl_c().await?;
    info!("Caught stop signal, quitting...");
    hostdb.close();
    accept_loop.abort();
    Ok(())
}
