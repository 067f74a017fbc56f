use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::GwConfError;

/// Reserved key in the `gateways` section carrying the cluster-wide target
/// IQN shared by every gateway host, rather than a per-host entry.
pub static GATEWAY_IQN_KEY: &str = "iqn";

/// One of the three top-level sections of the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Disks,
    Gateways,
    Clients,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Disks => "disks",
            Section::Gateways => "gateways",
            Section::Clients => "clients",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shared configuration document - the single source of truth every
/// gateway host reads and writes. Section values stay as raw JSON because
/// the `gateways` section legally mixes per-host object entries with the
/// string-valued reserved `iqn` key; `DiskEntry`/`GatewayEntry`/`ClientEntry`
/// are typed views over individual values.
///
/// `BTreeMap` sections keep the serialized form deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    disks: BTreeMap<String, Value>,
    #[serde(default)]
    gateways: BTreeMap<String, Value>,
    #[serde(default)]
    clients: BTreeMap<String, Value>,
}

impl ConfigDocument {
    /// The value written by whichever session first finds the backing
    /// object absent or empty.
    pub fn seed() -> Self {
        ConfigDocument::default()
    }

    /// Decode the stored representation. A document that cannot be parsed
    /// is fatal; there is no partial recovery.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let doc = serde_json::from_slice(data)
            .map_err(|e| GwConfError::CorruptConfig(e.to_string()))?;
        Ok(doc)
    }

    /// Encode to the stored representation (UTF-8 JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data = serde_json::to_vec(self)?;
        Ok(data)
    }

    pub fn disks(&self) -> &BTreeMap<String, Value> {
        &self.disks
    }

    pub fn gateways(&self) -> &BTreeMap<String, Value> {
        &self.gateways
    }

    pub fn clients(&self) -> &BTreeMap<String, Value> {
        &self.clients
    }

    pub fn section(&self, section: Section) -> &BTreeMap<String, Value> {
        match section {
            Section::Disks => &self.disks,
            Section::Gateways => &self.gateways,
            Section::Clients => &self.clients,
        }
    }

    pub(crate) fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Value> {
        match section {
            Section::Disks => &mut self.disks,
            Section::Gateways => &mut self.gateways,
            Section::Clients => &mut self.clients,
        }
    }

    pub fn get(&self, section: Section, key: &str) -> Option<&Value> {
        self.section(section).get(key)
    }
}

/// Per-image entry in the `disks` section. Both fields start empty; the
/// image's elected owner assigns the wwn exactly once and every other host
/// treats a non-empty wwn as immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskEntry {
    #[serde(default)]
    pub wwn: String,
    #[serde(default)]
    pub owner: String,
}

/// Per-host entry in the `gateways` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayEntry {
    #[serde(default)]
    pub portal_ip: String,
    #[serde(default)]
    pub iqn: String,
    #[serde(default)]
    pub active_luns: u32,
    #[serde(default)]
    pub tpg_count: u32,
    #[serde(default)]
    pub inactive_portal_ips: Vec<String>,
}

/// Per-initiator entry in the `clients` section. `credentials` is either
/// `"user/password"` or empty for clients configured without security.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientEntry {
    #[serde(default)]
    pub image_list: Vec<String>,
    #[serde(default)]
    pub credentials: String,
}

macro_rules! entry_value_impls {
    ($($entry:ty),*) => {
        $(impl $entry {
            /// View a raw section value as this entry type. Absent fields
            /// read as their empty values.
            pub fn from_value(value: &Value) -> Result<Self> {
                let entry = serde_json::from_value(value.clone())?;
                Ok(entry)
            }

            pub fn to_value(&self) -> Result<Value> {
                let value = serde_json::to_value(self)?;
                Ok(value)
            }
        })*
    };
}

entry_value_impls!(DiskEntry, GatewayEntry, ClientEntry);

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_seed_shape() -> Result<()> {
        let seed = ConfigDocument::seed();
        assert!(seed.disks().is_empty());
        assert!(seed.gateways().is_empty());
        assert!(seed.clients().is_empty());
        assert_eq!(
            String::from_utf8(seed.to_bytes()?)?,
            r#"{"disks":{},"gateways":{},"clients":{}}"#
        );
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let data = br#"{
            "disks": {"imgA": {"wwn": "36001", "owner": "igw-1"}},
            "gateways": {
                "igw-1": {"portal_ip": "10.0.0.1", "active_luns": 1},
                "iqn": "iqn.2003-01.com.example.iscsi-gw:igw"
            },
            "clients": {}
        }"#;

        let doc = ConfigDocument::parse(data)?;
        let bytes = doc.to_bytes()?;
        assert_eq!(ConfigDocument::parse(&bytes)?, doc);
        assert_eq!(ConfigDocument::parse(&bytes)?.to_bytes()?, bytes);
        Ok(())
    }

    #[test]
    fn test_missing_sections_parse_as_empty() -> Result<()> {
        let doc = ConfigDocument::parse(br#"{"disks": {}}"#)?;
        assert!(doc.gateways().is_empty());
        assert!(doc.clients().is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_document_is_fatal() {
        let err = ConfigDocument::parse(b"lock me in").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GwConfError>(),
            Some(GwConfError::CorruptConfig(_))
        ));
    }

    #[test]
    fn test_absent_field_reads_as_empty() -> Result<()> {
        let entry = DiskEntry::from_value(&json!({"owner": "igw-2"}))?;
        assert_eq!(entry.wwn, "");
        assert_eq!(entry.owner, "igw-2");

        let entry = DiskEntry::from_value(&json!({}))?;
        assert_eq!(entry, DiskEntry::default());
        Ok(())
    }

    #[test]
    fn test_gateway_entry_round_trip() -> Result<()> {
        let entry = GatewayEntry {
            portal_ip: "10.0.0.1".to_string(),
            iqn: "iqn.2003-01.com.example.iscsi-gw:igw".to_string(),
            active_luns: 2,
            tpg_count: 3,
            inactive_portal_ips: vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()],
        };
        assert_eq!(GatewayEntry::from_value(&entry.to_value()?)?, entry);
        Ok(())
    }

    #[test]
    fn test_section_lookup() -> Result<()> {
        let mut doc = ConfigDocument::seed();
        doc.section_mut(Section::Clients)
            .insert("iqn.1994-05.com.redhat:rh7-client".to_string(), json!({}));

        assert!(doc.get(Section::Clients, "iqn.1994-05.com.redhat:rh7-client").is_some());
        assert!(doc.get(Section::Disks, "iqn.1994-05.com.redhat:rh7-client").is_none());
        assert_eq!(Section::Gateways.to_string(), "gateways");
        Ok(())
    }
}
