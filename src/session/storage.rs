//! Credential Storage
//!
//! Durable client-local storage for the bearer token. The token lives under
//! a fixed key in a small JSON document so it survives process restarts
//! until an explicit logout or an authorization failure removes it.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::SessionError;

/// Key the credential is stored under
pub const CREDENTIAL_KEY: &str = "access_token";

/// Backend for persisting the credential
pub trait CredentialStorage: Send + Sync {
    /// Load the persisted credential, if any
    fn load(&self) -> Result<Option<String>, SessionError>;

    /// Persist a credential, replacing any previous one
    fn store(&self, token: &str) -> Result<(), SessionError>;

    /// Remove the persisted credential
    fn clear(&self) -> Result<(), SessionError>;
}

type CredentialFile = Map<String, Value>;

/// JSON file backed storage
///
/// Other keys in the file are preserved when the credential changes. A file
/// that does not parse is replaced on the next store or clear.
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    path: PathBuf,
}

impl FileCredentialStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the platform default location
    pub fn default_location() -> Self {
        Self::new(default_credentials_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CredentialFile, SessionError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialFile::default())
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(CredentialFile::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Like `read`, but a corrupt file counts as empty so it can be rewritten.
    /// The flag is true when the file was corrupt.
    fn read_for_update(&self) -> Result<(CredentialFile, bool), SessionError> {
        match self.read() {
            Ok(file) => Ok((file, false)),
            Err(SessionError::Serialization(e)) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Credentials file is corrupt, overwriting"
                );
                Ok((CredentialFile::default(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, file: &CredentialFile) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl CredentialStorage for FileCredentialStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        let file = self.read()?;
        Ok(file
            .get(CREDENTIAL_KEY)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    fn store(&self, token: &str) -> Result<(), SessionError> {
        let (mut file, _) = self.read_for_update()?;
        file.insert(CREDENTIAL_KEY.to_string(), Value::String(token.to_string()));
        self.write(&file)
    }

    fn clear(&self) -> Result<(), SessionError> {
        let (mut file, corrupt) = self.read_for_update()?;
        if file.remove(CREDENTIAL_KEY).is_some() || corrupt {
            self.write(&file)?;
        }
        Ok(())
    }
}

/// Process-local storage, nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryCredentialStorage {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStorage for MemoryCredentialStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        let guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        Ok(guard.clone())
    }

    fn store(&self, token: &str) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Platform default location of the credentials file
pub fn default_credentials_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("realtime-monitor").join("credentials.json"))
        .unwrap_or_else(|| PathBuf::from("./realtime-monitor-credentials.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCredentialStorage::new(dir.path().join("nested").join("creds.json"));

        assert_eq!(storage.load().unwrap(), None);

        storage.store("T").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("T"));

        // A second handle on the same file sees the persisted token
        let reopened = FileCredentialStorage::new(storage.path());
        assert_eq!(reopened.load().unwrap().as_deref(), Some("T"));

        storage.clear().unwrap();
        assert_eq!(reopened.load().unwrap(), None);
    }

    #[test]
    fn test_file_storage_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"api_url": "http://monitor.local/api"}"#).unwrap();

        let storage = FileCredentialStorage::new(&path);
        storage.store("abc").unwrap();
        storage.clear().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("api_url"));
        assert!(!content.contains(CREDENTIAL_KEY));
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileCredentialStorage::new(&path);
        assert!(matches!(storage.load(), Err(SessionError::Serialization(_))));
    }

    #[test]
    fn test_file_storage_keeps_non_string_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"access_token":"T","remember":true}"#).unwrap();

        let storage = FileCredentialStorage::new(&path);
        assert_eq!(storage.load().unwrap().as_deref(), Some("T"));

        storage.clear().unwrap();
        let content: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content, serde_json::json!({"remember": true}));
    }

    #[test]
    fn test_file_storage_overwrites_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileCredentialStorage::new(&path);
        storage.store("fresh").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("fresh"));

        std::fs::write(&path, "{not json").unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryCredentialStorage::with_token("seed");
        assert_eq!(storage.load().unwrap().as_deref(), Some("seed"));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }
}
