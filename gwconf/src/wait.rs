use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::document::{ConfigDocument, DiskEntry};
use crate::store::BlobStore;
use crate::GwConfError;

/// Poll the shared document until `probe` yields a value or the time
/// budget is spent. This is the only way a host observes facts published
/// by another host's commit; there is no push notification.
///
/// The document is re-read before every probe, at fixed `delay` intervals.
/// Once the accumulated delay reaches `timeout` the wait fails with
/// [`GwConfError::WaitTimeout`]; a fact that never arrives costs exactly
/// `timeout / delay` polls.
pub fn wait_for<S, T, F>(
    cfg: &mut GatewayConfig<S>,
    timeout: Duration,
    delay: Duration,
    what: &str,
    probe: F,
) -> Result<T>
where
    S: BlobStore,
    F: Fn(&ConfigDocument) -> Option<T>,
{
    let mut elapsed = Duration::ZERO;
    loop {
        thread::sleep(delay);
        elapsed += delay;

        cfg.refresh()?;
        if let Some(found) = probe(cfg.config()) {
            return Ok(found);
        }

        debug!(what, ?elapsed, "waiting for the shared document to show the fact");
        if elapsed >= timeout {
            anyhow::bail!(GwConfError::WaitTimeout(what.to_string()));
        }
    }
}

/// Wait for a disk's elected owner to publish the image's wwn, using the
/// session's poll budget. Hosts that lost the ownership election call this
/// before exposing the image, so every gateway presents the same serial.
pub fn wait_for_wwn<S: BlobStore>(cfg: &mut GatewayConfig<S>, image: &str) -> Result<String> {
    let (timeout, delay) = cfg.wait_bounds();
    wait_for(cfg, timeout, delay, image, |doc| {
        doc.disks()
            .get(image)
            .and_then(|value| DiskEntry::from_value(value).ok())
            .filter(|entry| !entry.wwn.is_empty())
            .map(|entry| entry.wwn)
    })
}
