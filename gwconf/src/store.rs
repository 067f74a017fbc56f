use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::GwConfError;

pub type StoreResult<T> = std::result::Result<T, GwConfError>;

/// Access to the pool holding the shared configuration object. The store
/// only ever reads or overwrites whole objects - there are no partial
/// writes or appends - and exposes a named advisory exclusive lock per
/// object. `ObjectBusy` is surfaced to the caller, which owns the retry
/// policy.
pub trait BlobStore {
    fn read(&self, name: &str) -> StoreResult<Vec<u8>>;

    fn write_full(&self, name: &str, data: &[u8]) -> StoreResult<()>;

    fn lock_exclusive(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()>;

    fn unlock(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct MemInner {
    objects: HashMap<String, Vec<u8>>,
    locks: HashMap<String, (String, String)>,
}

/// In-memory pool. Cloning yields another handle onto the same backing
/// state, so several sessions built from clones behave like independent
/// hosts sharing one pool.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemStore {
    fn read(&self, name: &str) -> StoreResult<Vec<u8>> {
        self.inner()
            .objects
            .get(name)
            .cloned()
            .ok_or_else(|| GwConfError::ObjectNotFound(name.to_string()))
    }

    fn write_full(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        self.inner().objects.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn lock_exclusive(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()> {
        let mut inner = self.inner();
        if inner.locks.contains_key(name) {
            return Err(GwConfError::ObjectBusy(name.to_string()));
        }
        inner
            .locks
            .insert(name.to_string(), (locker.to_string(), tag.to_string()));
        Ok(())
    }

    fn unlock(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()> {
        let mut inner = self.inner();
        match inner.locks.get(name) {
            Some((l, t)) if l == locker && t == tag => {
                inner.locks.remove(name);
                Ok(())
            }
            Some(_) => Err(GwConfError::ObjectBusy(name.to_string())),
            None => Ok(()),
        }
    }
}

/// Directory-backed pool: one file per object under the pool root. The
/// exclusive lock is a sidecar `<name>.lock` file created with
/// `create_new`, which the filesystem guarantees to be a single winner.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at an existing pool directory.
    ///
    /// ```no_run
    /// use gwconf::FileStore;
    ///
    /// let store = FileStore::open("/var/lib/gwconf/rbd")?;
    /// # Ok::<(), gwconf::GwConfError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root_ref = root.as_ref();
        if !root_ref.is_dir() {
            return Err(GwConfError::BackendUnavailable(format!(
                "'{}' pool does not exist",
                root_ref.display()
            )));
        }

        Ok(FileStore {
            root: root_ref.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.lock", name))
    }
}

impl BlobStore for FileStore {
    fn read(&self, name: &str) -> StoreResult<Vec<u8>> {
        match fs::read(self.object_path(name)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(GwConfError::ObjectNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_full(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        // write-then-rename keeps the whole-object overwrite atomic; the
        // temp name cannot collide because writers serialize through the
        // object lock
        let tmp = self.root.join(format!("{}.tmp", name));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, self.object_path(name))?;
        Ok(())
    }

    fn lock_exclusive(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()> {
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create_new(true);

        match opts.open(self.lock_path(name)) {
            Ok(mut fd) => {
                fd.write_all(format!("{}/{}", locker, tag).as_bytes())?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(GwConfError::ObjectBusy(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&self, name: &str, locker: &str, tag: &str) -> StoreResult<()> {
        let path = self.lock_path(name);
        let held = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if held != format!("{}/{}", locker, tag) {
            return Err(GwConfError::ObjectBusy(name.to_string()));
        }

        fs::remove_file(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_mem_store_read_write() -> Result<()> {
        let store = MemStore::new();
        assert!(matches!(
            store.read("gateway.conf"),
            Err(GwConfError::ObjectNotFound(_))
        ));

        store.write_full("gateway.conf", b"{}")?;
        assert_eq!(store.read("gateway.conf")?, b"{}");

        // whole-object overwrite, no append semantics
        store.write_full("gateway.conf", b"[]")?;
        assert_eq!(store.read("gateway.conf")?, b"[]");
        Ok(())
    }

    #[test]
    fn test_mem_store_lock_contention() -> Result<()> {
        let store = MemStore::new();
        let other = store.clone();

        store.lock_exclusive("gateway.conf", "lock", "config")?;
        assert!(matches!(
            other.lock_exclusive("gateway.conf", "lock", "config"),
            Err(GwConfError::ObjectBusy(_))
        ));

        store.unlock("gateway.conf", "lock", "config")?;
        other.lock_exclusive("gateway.conf", "lock", "config")?;
        other.unlock("gateway.conf", "lock", "config")?;
        Ok(())
    }

    #[test]
    fn test_mem_store_unlock_checks_owner() -> Result<()> {
        let store = MemStore::new();
        store.lock_exclusive("gateway.conf", "lock", "config")?;
        assert!(matches!(
            store.unlock("gateway.conf", "lock", "other"),
            Err(GwConfError::ObjectBusy(_))
        ));
        store.unlock("gateway.conf", "lock", "config")?;
        // unlocking an unlocked object is not an error
        store.unlock("gateway.conf", "lock", "config")?;
        Ok(())
    }

    #[test]
    fn test_file_store_missing_pool() {
        let err = FileStore::open("/no/such/pool").unwrap_err();
        assert!(matches!(err, GwConfError::BackendUnavailable(_)));
    }

    #[test]
    fn test_file_store_read_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path())?;

        assert!(matches!(
            store.read("gateway.conf"),
            Err(GwConfError::ObjectNotFound(_))
        ));

        store.write_full("gateway.conf", b"{\"disks\":{}}")?;
        assert_eq!(store.read("gateway.conf")?, b"{\"disks\":{}}");

        store.write_full("gateway.conf", b"{}")?;
        assert_eq!(store.read("gateway.conf")?, b"{}");
        Ok(())
    }

    #[test]
    fn test_file_store_lock_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path())?;

        store.lock_exclusive("gateway.conf", "lock", "config")?;
        assert!(dir.path().join("gateway.conf.lock").exists());
        assert!(matches!(
            store.lock_exclusive("gateway.conf", "lock", "config"),
            Err(GwConfError::ObjectBusy(_))
        ));

        assert!(matches!(
            store.unlock("gateway.conf", "lock", "other"),
            Err(GwConfError::ObjectBusy(_))
        ));
        store.unlock("gateway.conf", "lock", "config")?;
        assert!(!dir.path().join("gateway.conf.lock").exists());
        Ok(())
    }
}
