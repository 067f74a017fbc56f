use anyhow::Result;
use serde_json::Value;

use gwconf::{
    generate_wwn, lun_owner, update_host, wait_for_wwn, DiskEntry, GatewayConfig, GatewayEntry,
    MemStore, Section, Settings, GATEWAY_IQN_KEY,
};

static TARGET_IQN: &str = "iqn.2003-01.com.redhat.iscsi-gw:ceph-igw";

// Two gateway hosts coordinating through one shared pool. MemStore clones
// share their backing state, so each session below behaves like a separate
// host against the same configuration object.
fn main() -> Result<()> {
    let settings = Settings::default();
    let store = MemStore::new();

    // host igw-1 comes up first, seeds the object and registers itself
    let mut igw1 = GatewayConfig::open(store.clone(), &settings)?;
    igw1.add_item(Section::Gateways, GATEWAY_IQN_KEY);
    igw1.update_item(
        Section::Gateways,
        GATEWAY_IQN_KEY,
        Value::String(TARGET_IQN.to_string()),
    );
    register_gateway(&mut igw1, "igw-1", "10.0.0.1")?;
    igw1.commit()?;

    // host igw-2 registers concurrently; disjoint keys merge cleanly
    let mut igw2 = GatewayConfig::open(store.clone(), &settings)?;
    register_gateway(&mut igw2, "igw-2", "10.0.0.2")?;
    igw2.commit()?;

    // a new rbd image arrives: both hosts elect the same owner
    igw1.refresh()?;
    let owner = lun_owner(igw1.config().gateways())?;
    println!("elected owner for imgA: {}", owner);
    println!("config writer this run: {}", update_host(igw1.config().gateways())?);

    // the owner creates the image, generates its wwn and publishes both,
    // bumping its own active_luns count
    let wwn = generate_wwn();
    igw1.add_item(Section::Disks, "imgA");
    igw1.update_item(
        Section::Disks,
        "imgA",
        DiskEntry {
            wwn: wwn.clone(),
            owner: owner.clone(),
        }
        .to_value()?,
    );
    let mut gateway = GatewayEntry::from_value(
        igw1.config()
            .gateways()
            .get(&owner)
            .expect("owner registered above"),
    )?;
    gateway.active_luns += 1;
    igw1.update_item(Section::Gateways, &owner, gateway.to_value()?);
    igw1.commit()?;

    // the non-owning host polls until the owner's wwn shows up, then
    // exposes the image under the same serial
    let seen = wait_for_wwn(&mut igw2, "imgA")?;
    println!("igw-2 observed wwn {} for imgA", seen);
    assert_eq!(seen, wwn);

    println!("{}", serde_json::to_string_pretty(igw2.config())?);
    Ok(())
}

fn register_gateway(
    cfg: &mut GatewayConfig<MemStore>,
    host: &str,
    portal_ip: &str,
) -> Result<()> {
    let entry = GatewayEntry {
        portal_ip: portal_ip.to_string(),
        iqn: TARGET_IQN.to_string(),
        active_luns: 0,
        tpg_count: 2,
        inactive_portal_ips: vec![],
    };

    cfg.add_item(Section::Gateways, host);
    cfg.update_item(Section::Gateways, host, entry.to_value()?);
    Ok(())
}
