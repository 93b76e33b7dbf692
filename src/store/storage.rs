use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::keys::SessionKey;

/// Current session document version
const STORAGE_VERSION: &str = "1.0";

/// Raw key/value contents of the session store
pub type SessionEntries = BTreeMap<SessionKey, String>;

/// Durable backing for the session store.
///
/// Implementations may fail; the store turns every failure into a logged
/// no-op so callers never see storage errors.
pub trait StorageBackend: Send + Sync {
    /// Load all persisted entries
    fn load(&self) -> Result<SessionEntries>;

    /// Replace the persisted entries with `entries`
    fn persist(&self, entries: &SessionEntries) -> Result<()>;
}

/// On-disk session document
#[derive(Debug, Clone, Deserialize, Serialize)]
struct SessionDocument {
    version: String,
    entries: BTreeMap<String, String>,
}

/// JSON file storage, written atomically
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Platform default location of the session file
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "family-growth")
            .context("Could not determine session file location")?;

        let mut path = dirs.data_local_dir().to_path_buf();
        path.push("session.json");
        Ok(path)
    }
}

impl StorageBackend for FileStorage {
    fn load(&self) -> Result<SessionEntries> {
        if !self.path.exists() {
            return Ok(SessionEntries::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;

        let document: SessionDocument = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))?;

        if document.version != STORAGE_VERSION {
            tracing::warn!(
                "Session file version mismatch (expected {}, got {}). Starting with an empty session.",
                STORAGE_VERSION,
                document.version
            );
            return Ok(SessionEntries::new());
        }

        let mut entries = SessionEntries::new();
        for (name, value) in document.entries {
            match SessionKey::from_name(&name) {
                Some(key) => {
                    entries.insert(key, value);
                }
                None => tracing::debug!("Ignoring unknown session key: {}", name),
            }
        }

        Ok(entries)
    }

    fn persist(&self, entries: &SessionEntries) -> Result<()> {
        let document = SessionDocument {
            version: STORAGE_VERSION.to_string(),
            entries: entries
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), value.clone()))
                .collect(),
        };

        let content = serde_json::to_string_pretty(&document)
            .context("Failed to serialize session")?;

        atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;

        Ok(())
    }
}

/// Volatile storage, lost when the process exits
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<SessionEntries>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self) -> Result<SessionEntries> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory storage lock poisoned"))?;
        Ok(entries.clone())
    }

    fn persist(&self, entries: &SessionEntries) -> Result<()> {
        let mut stored = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory storage lock poisoned"))?;
        *stored = entries.clone();
        Ok(())
    }
}

/// Storage that is switched off (e.g. disabled by the user or sandbox)
pub struct DisabledStorage;

impl StorageBackend for DisabledStorage {
    fn load(&self) -> Result<SessionEntries> {
        anyhow::bail!("Session storage is unavailable")
    }

    fn persist(&self, _entries: &SessionEntries) -> Result<()> {
        anyhow::bail!("Session storage is unavailable")
    }
}

/// Atomically write content to a file readable only by its owner
///
/// Writes a sibling temporary file, syncs it, then renames it over the
/// target. The temporary file is created with mode 0600, so the content is
/// never on disk with wider permissions.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let temp_path = path.with_extension("tmp");

    // A leftover temp file would keep its old mode when reopened
    match std::fs::remove_file(&temp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to remove stale temporary file: {}", temp_path.display())
            });
        }
    }

    {
        let mut file = create_private(&temp_path).with_context(|| {
            format!("Failed to create temporary file: {}", temp_path.display())
        })?;

        file.write_all(content)
            .context("Failed to write to temporary file")?;

        file.sync_all().context("Failed to sync file to disk")?;
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
