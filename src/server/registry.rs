use crate::error::{Error, Result};
use crate::server::layout::ServerKey;
use crate::server::process::{ProcessHandle, ProcessId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Live processes under supervision, keyed by server.
///
/// Every operation holds the lock only for the map access itself. Handles
/// are shared, so a caller that looked one up can keep signalling and
/// waiting on it after another task removed it from the map.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    handles: Mutex<HashMap<ServerKey, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<ServerKey, Arc<ProcessHandle>>>> {
        self.handles
            .lock()
            .map_err(|_| Error::Other("Failed to lock process registry".to_string()))
    }

    /// Register a handle under its key.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] if the key already holds a handle; the
    /// registry is left unchanged.
    pub fn register(&self, handle: Arc<ProcessHandle>) -> Result<()> {
        let mut handles = self.guard()?;
        if handles.contains_key(handle.key()) {
            return Err(Error::AlreadyRunning(handle.key().server().to_string()));
        }
        tracing::trace!(server = %handle.key(), pid = handle.pid(), "Registering process");
        handles.insert(handle.key().clone(), handle);
        Ok(())
    }

    /// Get the handle registered for `key`
    pub fn lookup(&self, key: &ServerKey) -> Result<Option<Arc<ProcessHandle>>> {
        Ok(self.guard()?.get(key).cloned())
    }

    /// Remove whatever handle is registered for `key`
    pub fn remove(&self, key: &ServerKey) -> Result<Option<Arc<ProcessHandle>>> {
        Ok(self.guard()?.remove(key))
    }

    /// Remove the handle for `key` only if it is the handle `id`.
    ///
    /// Returns whether it was removed. Used by the two cleanup paths
    /// (monitor and stop) so that exactly one of them reconciles a given
    /// process, and neither evicts a handle registered after it.
    pub fn remove_if(&self, key: &ServerKey, id: ProcessId) -> Result<bool> {
        let mut handles = self.guard()?;
        match handles.get(key) {
            Some(handle) if handle.id() == id => {
                handles.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Check whether `key` holds a handle
    pub fn contains(&self, key: &ServerKey) -> Result<bool> {
        Ok(self.guard()?.contains_key(key))
    }

    /// Number of registered processes
    pub fn len(&self) -> Result<usize> {
        Ok(self.guard()?.len())
    }

    /// Check whether no process is registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.guard()?.is_empty())
    }

    /// Keys registered for `tenant`, sorted
    pub fn keys_for_tenant(&self, tenant: &str) -> Result<Vec<ServerKey>> {
        let mut keys: Vec<ServerKey> = self
            .guard()?
            .keys()
            .filter(|key| key.tenant() == tenant)
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Snapshot of all registered handles
    pub fn handles(&self) -> Result<Vec<Arc<ProcessHandle>>> {
        Ok(self.guard()?.values().cloned().collect())
    }
}
