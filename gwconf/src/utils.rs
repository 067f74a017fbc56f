use anyhow::Result;
use regex::Regex;
use uuid::Uuid;

use crate::GwConfError;

/// Check a size string of the form `<int><M|G|T>`, e.g. `10G`.
pub fn valid_size<S: AsRef<str>>(size: S) -> bool {
    parse_size(size.as_ref()).is_some()
}

/// Convert a size string to bytes.
pub fn size_to_bytes<S: AsRef<str>>(size: S) -> Result<u64> {
    let size_ref = size.as_ref();
    let (value, unit) = parse_size(size_ref)
        .ok_or_else(|| GwConfError::InvalidSize(size_ref.to_string()))?;

    let multiplier: u64 = match unit {
        'M' => 1024u64.pow(2),
        'G' => 1024u64.pow(3),
        _ => 1024u64.pow(4),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| GwConfError::InvalidSize(size_ref.to_string()).into())
}

fn parse_size(size: &str) -> Option<(u64, char)> {
    let unit = size.chars().last()?.to_ascii_uppercase();
    if !['M', 'G', 'T'].contains(&unit) {
        return None;
    }

    let value = size[..size.len() - 1].parse::<u64>().ok()?;
    Some((value, unit))
}

/// Syntactic check of an iSCSI qualified name, e.g.
/// `iqn.2003-01.com.redhat.iscsi-gw:ceph-igw`.
pub fn valid_iqn<S: AsRef<str>>(iqn: S) -> bool {
    match Regex::new(r"^iqn\.\d{4}-\d{2}\.[a-z0-9]([a-z0-9.-]*[a-z0-9])?(:.+)?$") {
        Ok(re) => re.is_match(iqn.as_ref()),
        Err(_) => false,
    }
}

/// Generate the serial a new disk presents to initiators. Generated once,
/// by the disk's elected owner, then published through the shared document
/// so every gateway exposes the same identity.
pub fn generate_wwn() -> String {
    Uuid::new_v4().to_string()
}

/// Short hostname of this gateway (first label only), the key this host
/// uses in the `gateways` section of the shared document.
pub fn this_host() -> String {
    let name = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default();

    name.split('.').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_valid_size() {
        assert!(valid_size("10G"));
        assert!(valid_size("512M"));
        assert!(valid_size("2T"));
        assert!(valid_size("2t"));
        assert!(!valid_size("10"));
        assert!(!valid_size("tenG"));
        assert!(!valid_size("10K"));
        assert!(!valid_size(""));
    }

    #[test]
    fn test_size_to_bytes() -> Result<()> {
        assert_eq!(size_to_bytes("2M")?, 2 * 1024 * 1024);
        assert_eq!(size_to_bytes("1G")?, 1024 * 1024 * 1024);
        assert_eq!(size_to_bytes("1T")?, 1024u64.pow(4));

        let err = size_to_bytes("1K").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GwConfError>(),
            Some(GwConfError::InvalidSize(_))
        ));
        Ok(())
    }

    #[test]
    fn test_valid_iqn() {
        assert!(valid_iqn("iqn.2003-01.com.redhat.iscsi-gw:ceph-igw"));
        assert!(valid_iqn("iqn.1994-05.com.redhat:rh7-client"));
        assert!(valid_iqn("iqn.2018-11.com.vine"));
        assert!(!valid_iqn("eui.02004567A425678D"));
        assert!(!valid_iqn("iqn.18-11.com.vine:vol"));
        assert!(!valid_iqn(""));
    }

    #[test]
    fn test_generate_wwn_is_unique() {
        let wwn = generate_wwn();
        assert!(!wwn.is_empty());
        assert_ne!(wwn, generate_wwn());
    }

    #[test]
    fn test_this_host_is_short_form() {
        assert!(!this_host().contains('.'));
    }
}
