//! Token record storage
//!
//! One `TokenRecord` per authenticated user, plus the app-level pointers
//! naming which user currently fills each role. The file-backed store keeps
//! everything in a single JSON document and rewrites it atomically on every
//! mutation; the in-memory store backs tests.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sp_types::{AuthError, AuthResult, Role, TokenRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storage interface for token records and role pointers.
pub trait TokenStore: Send + Sync {
    fn get(&self, user_id: &str) -> AuthResult<Option<TokenRecord>>;
    fn save(&self, record: &TokenRecord) -> AuthResult<()>;
    fn delete(&self, user_id: &str) -> AuthResult<()>;

    /// User id currently filling the given role, if any.
    fn current_user(&self, role: Role) -> AuthResult<Option<String>>;
    fn set_current_user(&self, role: Role, user_id: &str) -> AuthResult<()>;
    fn clear_current_user(&self, role: Role) -> AuthResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenDocument {
    #[serde(default)]
    records: HashMap<String, TokenRecord>,

    /// Role -> user id pointers ("current broadcaster", "current bot")
    #[serde(default)]
    current: HashMap<Role, String>,
}

/// In-memory token store for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    document: RwLock<TokenDocument>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, user_id: &str) -> AuthResult<Option<TokenRecord>> {
        Ok(self.document.read().records.get(user_id).cloned())
    }

    fn save(&self, record: &TokenRecord) -> AuthResult<()> {
        self.document
            .write()
            .records
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, user_id: &str) -> AuthResult<()> {
        self.document.write().records.remove(user_id);
        Ok(())
    }

    fn current_user(&self, role: Role) -> AuthResult<Option<String>> {
        Ok(self.document.read().current.get(&role).cloned())
    }

    fn set_current_user(&self, role: Role, user_id: &str) -> AuthResult<()> {
        self.document
            .write()
            .current
            .insert(role, user_id.to_string());
        Ok(())
    }

    fn clear_current_user(&self, role: Role) -> AuthResult<()> {
        self.document.write().current.remove(&role);
        Ok(())
    }
}

/// File-backed token store.
///
/// The whole document is held in memory and written through on every
/// mutation. Writes go to a sibling temp file first and are renamed into
/// place so a crash mid-write never corrupts the stored tokens.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    document: RwLock<TokenDocument>,
}

impl FileTokenStore {
    /// Open (or create) the token document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> AuthResult<Self> {
        let path = path.into();
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| AuthError::Storage(format!("Invalid token file {:?}: {}", path, e)))?
        } else {
            debug!("Token file {:?} not found, starting empty", path);
            TokenDocument::default()
        };

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// Open the store at its default location under the user config dir.
    pub fn open_default() -> AuthResult<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| AuthError::Storage("Cannot determine config directory".to_string()))?
            .join("StreamPilot");
        std::fs::create_dir_all(&dir)?;
        Self::open(dir.join("twitch_tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &TokenDocument) -> AuthResult<()> {
        let raw = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate<F: FnOnce(&mut TokenDocument)>(&self, f: F) -> AuthResult<()> {
        let mut document = self.document.write();
        f(&mut document);
        self.persist(&document)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, user_id: &str) -> AuthResult<Option<TokenRecord>> {
        Ok(self.document.read().records.get(user_id).cloned())
    }

    fn save(&self, record: &TokenRecord) -> AuthResult<()> {
        self.mutate(|doc| {
            doc.records.insert(record.user_id.clone(), record.clone());
        })?;
        info!(
            "Saved token record for user {} ({})",
            record.username, record.user_id
        );
        Ok(())
    }

    fn delete(&self, user_id: &str) -> AuthResult<()> {
        self.mutate(|doc| {
            doc.records.remove(user_id);
        })?;
        info!("Deleted token record for user {}", user_id);
        Ok(())
    }

    fn current_user(&self, role: Role) -> AuthResult<Option<String>> {
        Ok(self.document.read().current.get(&role).cloned())
    }

    fn set_current_user(&self, role: Role, user_id: &str) -> AuthResult<()> {
        self.mutate(|doc| {
            doc.current.insert(role, user_id.to_string());
        })
    }

    fn clear_current_user(&self, role: Role) -> AuthResult<()> {
        self.mutate(|doc| {
            doc.current.remove(&role);
        })
    }
}
