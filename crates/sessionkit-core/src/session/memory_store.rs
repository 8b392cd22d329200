use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;

use crate::error::{Result, SessionError};

use super::store::Store;
use super::Session;

struct Entry {
    session: Session,
    ttl: Duration,
}

/// In-process session store guarded by one reader/writer lock.
#[derive(Default)]
pub struct MemoryStore {
    shelf: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.shelf_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking update callback poisons the lock; the map itself is
    // still consistent, so keep serving it.
    fn shelf_read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.shelf.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn shelf_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.shelf.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn create(&self, id: &str, ttl: Duration) -> Result<()> {
        let entry = Entry {
            session: Session::new(),
            ttl,
        };
        self.shelf_write().insert(id.to_string(), entry);
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Session> {
        let shelf = self.shelf_read();
        match shelf.get(id) {
            Some(entry) if !entry.session.is_expired(entry.ttl, Utc::now()) => {
                Ok(entry.session.clone())
            }
            _ => Err(SessionError::NoRecord),
        }
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Session)) -> Result<()> {
        let mut shelf = self.shelf_write();
        let expired = match shelf.get_mut(id) {
            None => return Err(SessionError::NoRecord),
            Some(entry) if entry.session.is_expired(entry.ttl, Utc::now()) => true,
            Some(entry) => {
                f(&mut entry.session);
                entry.session.touch();
                false
            }
        };
        if expired {
            shelf.remove(id);
            return Err(SessionError::NoRecord);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.shelf_write().remove(id);
        Ok(())
    }

    fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut shelf = self.shelf_write();
        let before = shelf.len();
        shelf.retain(|_, entry| !entry.session.is_expired(entry.ttl, now));
        Ok(before - shelf.len())
    }
}
