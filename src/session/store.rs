use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::api::UserIdentity;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed state file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("state could not be encoded: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("could not locate a config directory")]
    NoConfigDir,
}

/// Durable client-side key-value state: the cached identity and the chat
/// session id. An explicit seam instead of ambient storage, so every
/// operation takes its state from here and tests can substitute a fake.
pub trait ClientStateStore: Send + Sync {
    fn identity(&self) -> Result<Option<UserIdentity>, StoreError>;
    fn set_identity(&mut self, identity: &UserIdentity) -> Result<(), StoreError>;
    fn clear_identity(&mut self) -> Result<(), StoreError>;

    fn session_id(&self) -> Result<Option<String>, StoreError>;
    fn set_session_id(&mut self, session_id: &str) -> Result<(), StoreError>;
    fn clear_session_id(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    chat_session_id: Option<String>,
    user: Option<UserIdentity>,
}

/// State store persisted as a TOML file under the platform config
/// directory. Reads and writes are synchronous; every mutation is written
/// through before the call returns.
pub struct FileStateStore {
    path: PathBuf,
    state: PersistedState,
}

impl FileStateStore {
    /// Open a store backed by the given file, loading any existing state
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let state = if path.exists() {
            toml::from_str(&fs::read_to_string(&path)?)?
        } else {
            PersistedState::default()
        };
        Ok(Self { path, state })
    }

    /// Open the store at its default location (`state.toml` next to the
    /// configuration file)
    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("", "", "kbchat").ok_or(StoreError::NoConfigDir)?;
        fs::create_dir_all(dirs.config_dir())?;
        Self::open(dirs.config_dir().join("state.toml"))
    }

    fn persist(&self) -> Result<(), StoreError> {
        fs::write(&self.path, toml::to_string_pretty(&self.state)?)?;
        Ok(())
    }
}

impl ClientStateStore for FileStateStore {
    fn identity(&self) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.state.user.clone())
    }

    fn set_identity(&mut self, identity: &UserIdentity) -> Result<(), StoreError> {
        self.state.user = Some(identity.clone());
        self.persist()
    }

    fn clear_identity(&mut self) -> Result<(), StoreError> {
        self.state.user = None;
        self.persist()
    }

    fn session_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.chat_session_id.clone())
    }

    fn set_session_id(&mut self, session_id: &str) -> Result<(), StoreError> {
        self.state.chat_session_id = Some(session_id.to_string());
        self.persist()
    }

    fn clear_session_id(&mut self) -> Result<(), StoreError> {
        self.state.chat_session_id = None;
        self.persist()
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    identity: Option<UserIdentity>,
    session_id: Option<String>,
}

impl MemoryStateStore {
    pub fn with_identity(identity: UserIdentity) -> Self {
        Self {
            identity: Some(identity),
            session_id: None,
        }
    }
}

impl ClientStateStore for MemoryStateStore {
    fn identity(&self) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.identity.clone())
    }

    fn set_identity(&mut self, identity: &UserIdentity) -> Result<(), StoreError> {
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn clear_identity(&mut self) -> Result<(), StoreError> {
        self.identity = None;
        Ok(())
    }

    fn session_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.session_id.clone())
    }

    fn set_session_id(&mut self, session_id: &str) -> Result<(), StoreError> {
        self.session_id = Some(session_id.to_string());
        Ok(())
    }

    fn clear_session_id(&mut self) -> Result<(), StoreError> {
        self.session_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UserIdentity {
        UserIdentity {
            user_id: "7".to_string(),
            username: "alice".to_string(),
        }
    }

    #[test]
    fn file_store_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut store = FileStateStore::open(path.clone()).unwrap();
        store.set_identity(&identity()).unwrap();
        store.set_session_id("abc-123").unwrap();

        // Reopen from disk and read back
        let store = FileStateStore::open(path).unwrap();
        assert_eq!(store.identity().unwrap(), Some(identity()));
        assert_eq!(store.session_id().unwrap().as_deref(), Some("abc-123"));
    }

    #[test]
    fn clearing_identity_keeps_the_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut store = FileStateStore::open(path.clone()).unwrap();
        store.set_identity(&identity()).unwrap();
        store.set_session_id("abc-123").unwrap();
        store.clear_identity().unwrap();

        let store = FileStateStore::open(path).unwrap();
        assert_eq!(store.identity().unwrap(), None);
        assert_eq!(store.session_id().unwrap().as_deref(), Some("abc-123"));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("state.toml")).unwrap();
        assert_eq!(store.identity().unwrap(), None);
        assert_eq!(store.session_id().unwrap(), None);
    }
}
