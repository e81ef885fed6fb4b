use crate::error::{ChatError, Result};
use crate::storage::KeyValueStore;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Storage key holding the persisted session id
pub const SESSION_KEY: &str = "chatbotSessionId";

/// Owns the session identifier shared by every outgoing exchange.
///
/// The id is read from the backing store on first use, or generated and
/// persisted when absent. It only changes through [`SessionStore::rotate`].
pub struct SessionStore {
    backing: Arc<dyn KeyValueStore>,
    current: RwLock<Option<String>>,
}

impl SessionStore {
    pub fn new(backing: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backing,
            current: RwLock::new(None),
        }
    }

    /// Return the active session id, loading or creating it on first call.
    pub fn get_or_create(&self) -> Result<String> {
        if let Some(id) = self.current() {
            return Ok(id);
        }

        let mut current = self.write_lock()?;
        // Another caller may have won the race while we waited for the lock.
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.backing.get(SESSION_KEY)? {
            Some(id) if !id.trim().is_empty() => {
                debug!(session_id = %id, "restored session");
                id
            }
            _ => {
                let id = generate_session_id();
                self.backing.set(SESSION_KEY, &id)?;
                info!(session_id = %id, "created new session");
                id
            }
        };

        *current = Some(id.clone());
        Ok(id)
    }

    /// The cached id, if one has been loaded.
    pub fn current(&self) -> Option<String> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Replace the session id with one issued by the chat service.
    pub fn rotate(&self, new_id: &str) -> Result<()> {
        if new_id.trim().is_empty() {
            return Err(ChatError::validation("Session id cannot be empty"));
        }

        let mut current = self.write_lock()?;
        if current.as_deref() == Some(new_id) {
            return Ok(());
        }

        self.backing.set(SESSION_KEY, new_id)?;
        info!(
            old = current.as_deref().unwrap_or("<none>"),
            new = %new_id,
            "session rotated by server"
        );
        *current = Some(new_id.to_string());
        Ok(())
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<String>>> {
        self.current
            .write()
            .map_err(|_| ChatError::Storage("session lock poisoned".to_string()))
    }
}

/// `session_{unix_millis}_{random suffix}`
pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(generate_session_id(), id);
    }

    #[test]
    fn get_or_create_is_stable() {
        let backing = Arc::new(MemoryStore::new());
        let store = SessionStore::new(backing.clone());
        assert_eq!(store.current(), None);

        let first = store.get_or_create().unwrap();
        let second = store.get_or_create().unwrap();
        assert_eq!(first, second);
        assert_eq!(backing.get(SESSION_KEY).unwrap(), Some(first));
    }

    #[test]
    fn existing_id_is_restored() {
        let backing = Arc::new(MemoryStore::new());
        backing.set(SESSION_KEY, "S1").unwrap();

        let store = SessionStore::new(backing);
        assert_eq!(store.get_or_create().unwrap(), "S1");
    }

    #[test]
    fn rotate_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = SessionStore::new(Arc::new(FileStore::new(&path)));
        store.get_or_create().unwrap();
        store.rotate("S2").unwrap();
        assert_eq!(store.current(), Some("S2".to_string()));

        let restarted = SessionStore::new(Arc::new(FileStore::new(&path)));
        assert_eq!(restarted.get_or_create().unwrap(), "S2");
    }

    #[test]
    fn rotate_rejects_empty_id() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.rotate("S1").unwrap();
        assert!(store.rotate("  ").is_err());
        assert_eq!(store.current(), Some("S1".to_string()));
    }

    #[test]
    fn concurrent_readers_see_whole_ids() {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryStore::new())));
        store.rotate("session-a").unwrap();

        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let id = store.current().unwrap();
                    assert!(id == "session-a" || id == "session-b", "saw {id}");
                }
            })
        };
        for i in 0..100 {
            let id = if i % 2 == 0 { "session-b" } else { "session-a" };
            store.rotate(id).unwrap();
        }
        reader.join().unwrap();
    }
}
