use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use crate::document::GatewayEntry;
use crate::GwConfError;

/// Pick the single host responsible for persisting a shared fact when
/// several hosts run the same orchestration step concurrently. Non-elected
/// hosts do all their local work but skip the commit.
///
/// Only object-valued entries are candidates; the reserved `iqn` key and
/// any other scalar entries are skipped. The result is the first candidate
/// hostname in sort order, so every host elects the same winner from the
/// same map.
pub fn update_host(gateways: &BTreeMap<String, Value>) -> Result<String> {
    gateways
        .iter()
        .find(|(_, value)| value.is_object())
        .map(|(host, _)| host.clone())
        .ok_or_else(|| GwConfError::ElectionEmpty.into())
}

/// Pick the gateway with the fewest active LUNs as the owner of a newly
/// created disk's primary path; ties go to the first hostname in sort
/// order. The elected owner generates and publishes the disk's wwn and is
/// the only host allowed to bump its own `active_luns` count.
pub fn lun_owner(gateways: &BTreeMap<String, Value>) -> Result<String> {
    let mut best: Option<(&String, u32)> = None;

    for (host, value) in gateways {
        if !value.is_object() {
            continue;
        }
        let entry: GatewayEntry = match serde_json::from_value(value.clone()) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        match best {
            Some((_, fewest)) if entry.active_luns >= fewest => {}
            _ => best = Some((host, entry.active_luns)),
        }
    }

    best.map(|(host, _)| host.clone())
        .ok_or_else(|| GwConfError::ElectionEmpty.into())
}
