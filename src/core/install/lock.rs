use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::core::error::{InstallError, InstallResult};

/// Per-modpack exclusivity for install, update and uninstall.
///
/// Acquiring is non-blocking: a second operation on an id that is already
/// held fails with [`InstallError::Busy`] instead of waiting.
#[derive(Clone, Default)]
pub struct InstallLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InstallLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, modpack_id: &str) -> InstallResult<InstallGuard> {
        if !self.lock_set().insert(modpack_id.to_string()) {
            return Err(InstallError::Busy(modpack_id.to_string()));
        }
        debug!("Acquired install lock for {}", modpack_id);
        Ok(InstallGuard {
            held: self.held.clone(),
            id: modpack_id.to_string(),
        })
    }

    pub fn is_held(&self, modpack_id: &str) -> bool {
        self.lock_set().contains(modpack_id)
    }

    fn lock_set(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Releases its modpack id when dropped.
pub struct InstallGuard {
    held: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InstallGuard {
    pub fn modpack_id(&self) -> &str {
        &self.id
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        let mut held = match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.id);
    }
}
