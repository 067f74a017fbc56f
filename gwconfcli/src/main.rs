use std::env;
use std::process;

use anyhow::Result;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gwconf::{
    this_host, update_host, FileStore, GatewayConfig, GatewayEntry, Section, Settings,
    GATEWAY_IQN_KEY,
};

static DEFAULT_POOL_DIR: &str = "/var/lib/gwconf/rbd";
static DEFAULT_TARGET_IQN: &str = "iqn.2003-01.com.redhat.iscsi-gw:ceph-igw";

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gwconf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run() {
        tracing::error!("{:#}", e);
        process::exit(1);
    }
}

// usage: gwconfcli [pool-dir] [portal-ip]
// registers this host in the shared document and prints the result
fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let pool_dir = args.next().unwrap_or_else(|| DEFAULT_POOL_DIR.to_string());
    let portal_ip = args.next().unwrap_or_else(|| "0.0.0.0".to_string());

    let settings = Settings::default();
    let store = FileStore::open(&pool_dir)?;
    let mut cfg = GatewayConfig::open(store, &settings)?;

    let host = this_host();

    // every gateway shares one target iqn; first registrar publishes it
    let iqn = match cfg.config().gateways().get(GATEWAY_IQN_KEY) {
        Some(Value::String(iqn)) => iqn.clone(),
        _ => {
            cfg.add_item(Section::Gateways, GATEWAY_IQN_KEY);
            cfg.update_item(
                Section::Gateways,
                GATEWAY_IQN_KEY,
                Value::String(DEFAULT_TARGET_IQN.to_string()),
            );
            DEFAULT_TARGET_IQN.to_string()
        }
    };

    if !cfg.config().gateways().contains_key(&host) {
        let entry = GatewayEntry {
            portal_ip,
            iqn,
            active_luns: 0,
            tpg_count: 1,
            inactive_portal_ips: vec![],
        };
        cfg.add_item(Section::Gateways, &host);
        cfg.update_item(Section::Gateways, &host, entry.to_value()?);
    }

    if cfg.changed() {
        cfg.commit()?;
        tracing::info!(host = %host, "registered this host with the shared document");
    }

    match update_host(cfg.config().gateways()) {
        Ok(writer) => tracing::info!(writer = %writer, "designated config writer for this run"),
        Err(e) => tracing::warn!("{}", e),
    }

    println!("{}", serde_json::to_string_pretty(cfg.config())?);
    Ok(())
}
