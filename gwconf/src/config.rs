use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::document::{ConfigDocument, Section};
use crate::settings::Settings;
use crate::store::BlobStore;
use crate::txn::{TxnBuffer, TxnOp};
use crate::GwConfError;

static LOCK_NAME: &str = "lock";
static LOCK_TAG: &str = "config";

/// Fixed interval between lock acquisition attempts.
static LOCK_RETRY: Duration = Duration::from_secs(1);

/// One session against the shared configuration object.
///
/// Every gateway host opens its own session; the only coordination between
/// hosts is the object itself plus its advisory exclusive lock. Mutations
/// are staged locally ([`add_item`](GatewayConfig::add_item) /
/// [`update_item`](GatewayConfig::update_item) /
/// [`del_item`](GatewayConfig::del_item)) and merged onto a freshly re-read
/// remote document by [`commit`](GatewayConfig::commit), so concurrent
/// sessions writing disjoint keys never clobber each other's updates.
#[derive(Debug)]
pub struct GatewayConfig<S> {
    store: S,
    object_name: String,
    lock_limit: Duration,
    lock_retry: Duration,
    wait_timeout: Duration,
    wait_delay: Duration,
    config: ConfigDocument,
    txns: TxnBuffer,
    changed: bool,
}

impl<S: BlobStore> GatewayConfig<S> {
    /// Open a session, seeding the shared object if this is the first
    /// session ever to touch it.
    ///
    /// ```no_run
    /// use gwconf::{FileStore, GatewayConfig, Settings};
    ///
    /// let settings = Settings::default();
    /// let store = FileStore::open("/var/lib/gwconf/rbd")?;
    /// let cfg = GatewayConfig::open(store, &settings)?;
    /// println!("{} disks defined", cfg.config().disks().len());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn open(store: S, settings: &Settings) -> Result<Self> {
        let object_name = settings.config_object().to_string();
        let lock_limit = settings.lock_time_limit();
        let config = fetch(&store, &object_name, lock_limit, LOCK_RETRY)?;

        Ok(GatewayConfig {
            store,
            object_name,
            lock_limit,
            lock_retry: LOCK_RETRY,
            wait_timeout: settings.time_out(),
            wait_delay: settings.loop_delay(),
            config,
            txns: TxnBuffer::default(),
            changed: false,
        })
    }

    /// The in-memory copy of the shared document, as of the last
    /// open/refresh/commit plus any uncommitted local mutations.
    pub fn config(&self) -> &ConfigDocument {
        &self.config
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Whether this session holds uncommitted mutations.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn wait_bounds(&self) -> (Duration, Duration) {
        (self.wait_timeout, self.wait_delay)
    }

    /// Re-read the shared document, replacing the in-memory copy. Staged
    /// transactions are untouched, but their effect on the in-memory copy
    /// is discarded until they are re-applied by commit. Used by hosts
    /// polling for facts published by another host.
    pub fn refresh(&mut self) -> Result<()> {
        debug!(object = %self.object_name, "refreshing the shared document");
        self.config = fetch(&self.store, &self.object_name, self.lock_limit, self.lock_retry)?;
        Ok(())
    }

    /// Stage a new (empty) entry. A duplicate add silently resets the
    /// entry.
    pub fn add_item<K: AsRef<str>>(&mut self, section: Section, key: K) {
        let key_ref = key.as_ref();
        self.config
            .section_mut(section)
            .insert(key_ref.to_string(), Value::Object(Map::new()));
        self.changed = true;

        self.txns.stage_put(section, key_ref, Value::Object(Map::new()));
        debug!(%section, key = key_ref, "staged new item");
    }

    /// Stage new content for an entry, replacing any content staged for the
    /// same `(section, key)` earlier in this session.
    pub fn update_item<K: AsRef<str>>(&mut self, section: Section, key: K, content: Value) {
        let key_ref = key.as_ref();
        self.config
            .section_mut(section)
            .insert(key_ref.to_string(), content.clone());
        self.changed = true;

        self.txns.stage_put(section, key_ref, content);
        debug!(%section, key = key_ref, "staged item update");
    }

    /// Stage the removal of an entry.
    pub fn del_item<K: AsRef<str>>(&mut self, section: Section, key: K) {
        let key_ref = key.as_ref();
        self.config.section_mut(section).remove(key_ref);
        self.changed = true;

        self.txns.stage_delete(section, key_ref);
        debug!(%section, key = key_ref, "staged item removal");
    }

    /// Acquire the advisory exclusive lock on the shared object. The lock
    /// is released when the returned guard drops, on every exit path.
    /// Fails with [`GwConfError::LockTimeout`] once the acquisition budget
    /// is spent.
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        acquire_lock(&self.store, &self.object_name, self.lock_limit, self.lock_retry)
    }

    /// Merge this session's staged transactions onto a freshly re-read
    /// remote document and overwrite the shared object with the result,
    /// all inside the lock's critical section.
    ///
    /// Only the staged keys are touched, so updates committed by other
    /// hosts since open/refresh survive as long as the keys are disjoint;
    /// overlapping keys resolve last-commit-wins. On [`GwConfError::LockTimeout`]
    /// nothing is written and the staged transactions remain buffered, so
    /// the caller may retry the commit later.
    pub fn commit(&mut self) -> Result<()> {
        if self.txns.is_empty() {
            debug!(object = %self.object_name, "commit with no staged transactions, nothing to do");
            return Ok(());
        }

        let guard = self.lock()?;

        // re-read to pick up other hosts' changes since open/refresh, then
        // apply only this session's staged keys
        let data = self.store.read(&self.object_name)?;
        let mut current = if data.is_empty() {
            ConfigDocument::seed()
        } else {
            ConfigDocument::parse(&data)?
        };

        for txn in self.txns.iter() {
            let section = current.section_mut(txn.section());
            match txn.op() {
                TxnOp::Put(content) => {
                    section.insert(txn.key().to_string(), content.clone());
                }
                TxnOp::Delete => {
                    section.remove(txn.key());
                }
            }
        }

        self.store.write_full(&self.object_name, &current.to_bytes()?)?;
        drop(guard);

        info!(
            object = %self.object_name,
            txns = self.txns.len(),
            "committed staged updates"
        );
        self.config = current;
        self.txns.clear();
        self.changed = false;

        Ok(())
    }
}

/// Holds the advisory exclusive lock on the shared object; unlocks on Drop.
pub struct LockGuard<'a> {
    store: &'a dyn BlobStore,
    name: &'a str,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.unlock(self.name, LOCK_NAME, LOCK_TAG) {
            error!(object = self.name, "unable to unlock - {}", e);
        }
    }
}

fn acquire_lock<'a>(
    store: &'a dyn BlobStore,
    name: &'a str,
    limit: Duration,
    retry: Duration,
) -> Result<LockGuard<'a>> {
    let mut waited = Duration::ZERO;
    loop {
        match store.lock_exclusive(name, LOCK_NAME, LOCK_TAG) {
            Ok(()) => return Ok(LockGuard { store, name }),
            Err(GwConfError::ObjectBusy(_)) => {
                if waited >= limit {
                    anyhow::bail!(GwConfError::LockTimeout {
                        object: name.to_string(),
                        limit,
                    });
                }
                debug!(object = name, "waiting for excl lock");
                thread::sleep(retry);
                waited += retry;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn fetch(
    store: &dyn BlobStore,
    name: &str,
    lock_limit: Duration,
    lock_retry: Duration,
) -> Result<ConfigDocument> {
    match store.read(name) {
        Ok(data) if data.is_empty() => {
            debug!(object = name, "config object exists but is empty, seeding it");
            seed(store, name, lock_limit, lock_retry)
        }
        Ok(data) => ConfigDocument::parse(&data),
        Err(GwConfError::ObjectNotFound(_)) => {
            debug!(object = name, "config object doesn't exist, seeding it");
            seed(store, name, lock_limit, lock_retry)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the seed document unless another session got there first. The
/// object is re-read under the lock, so at most one seed write lands; a
/// same-value overwrite of a still-empty object is harmless.
fn seed(
    store: &dyn BlobStore,
    name: &str,
    lock_limit: Duration,
    lock_retry: Duration,
) -> Result<ConfigDocument> {
    let guard = acquire_lock(store, name, lock_limit, lock_retry)?;

    let current = match store.read(name) {
        Ok(data) if !data.is_empty() => ConfigDocument::parse(&data)?,
        Ok(_) | Err(GwConfError::ObjectNotFound(_)) => {
            let seeded = ConfigDocument::seed();
            store.write_full(name, &seeded.to_bytes()?)?;
            info!(object = name, "seeded the shared configuration object");
            seeded
        }
        Err(e) => return Err(e.into()),
    };

    drop(guard);
    Ok(current)
}
