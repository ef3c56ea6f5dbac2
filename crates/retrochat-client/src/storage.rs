//! Durable client identity.
//!
//! One JSON record `{id, username}` stored under a fixed name. Its absence
//! is what sends a user to the username prompt.

use retrochat_core::StoredIdentity;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// Name the identity record is stored under.
pub const IDENTITY_KEY: &str = "chatUser";

#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store the record as `chatUser.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{IDENTITY_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored identity. A missing or unreadable record counts as none.
    pub fn load(&self) -> Result<Option<StoredIdentity>, ClientError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&text) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable identity in {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, identity: &StoredIdentity) -> Result<(), ClientError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.path, text)?;
        tracing::debug!("Saved identity {} to {}", identity.id, self.path.display());
        Ok(())
    }

    /// Forget the stored identity. Forgetting nothing is fine.
    pub fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrochat_core::{UserId, Username};

    fn identity() -> StoredIdentity {
        StoredIdentity {
            id: UserId::new("u1"),
            username: Username::parse("Zoe").unwrap(),
        }
    }

    #[test]
    fn missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::in_dir(dir.path().join("nested"));
        store.save(&identity()).unwrap();
        assert_eq!(store.load().unwrap(), Some(identity()));
        assert!(store.path().ends_with("chatUser.json"));
    }

    #[test]
    fn corrupt_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::in_dir(dir.path());
        std::fs::write(store.path(), "{\"id\": \"u1\", \"username\": \"\"}").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn clear_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::in_dir(dir.path());
        store.save(&identity()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }
}
