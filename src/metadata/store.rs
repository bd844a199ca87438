//! Single-file JSON metadata store.
//!
//! The whole document map lives in one pretty-printed JSON object. Every
//! read loads the full file and every write replaces it: the new contents
//! go to a temporary file in the same directory, are fsynced, and are then
//! renamed over the target so a crash never leaves a half-written map.
//!
//! The store itself does no locking; [`super::DocumentRegistry`] wraps it in
//! a mutex.

use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use super::record::DocumentMap;
use super::{MetadataError, MetadataResult};

/// What to do when the metadata file exists but cannot be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadErrorPolicy {
    /// Refuse to start, and fail individual operations, on a bad file.
    #[default]
    Fail,
    /// Quarantine the bad file at startup and continue with an empty map.
    Empty,
}

impl LoadErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadErrorPolicy::Fail => "fail",
            LoadErrorPolicy::Empty => "empty",
        }
    }
}

/// Handle on the metadata file.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    policy: LoadErrorPolicy,
}

impl MetadataStore {
    /// Open the store at `path`.
    ///
    /// Creates the parent directory and an empty `{}` file when absent, then
    /// probes the existing file once. A bad file aborts with
    /// [`LoadErrorPolicy::Fail`]; with [`LoadErrorPolicy::Empty`] it is moved
    /// to `<name>.corrupt` and replaced by an empty map.
    pub fn open(path: impl AsRef<Path>, policy: LoadErrorPolicy) -> MetadataResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| MetadataError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { path, policy };

        if !store.path.exists() {
            store.save(&DocumentMap::new())?;
            info!("Initialized empty metadata file at {}", store.path.display());
            return Ok(store);
        }

        match store.read() {
            Ok(map) => {
                info!(
                    "Metadata file {} holds {} document(s)",
                    store.path.display(),
                    map.len()
                );
            }
            Err(err) if policy == LoadErrorPolicy::Empty => {
                store.quarantine(&err)?;
                store.save(&DocumentMap::new())?;
            }
            Err(err) => return Err(err),
        }

        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> LoadErrorPolicy {
        self.policy
    }

    /// Load the full document map.
    ///
    /// A missing file is an empty map. A file that cannot be read or parsed
    /// is an error under [`LoadErrorPolicy::Fail`]. Under
    /// [`LoadErrorPolicy::Empty`] it is an empty map; a file that no longer
    /// parses is first moved to `<name>.corrupt` so the next save cannot
    /// overwrite it.
    pub fn load(&self) -> MetadataResult<DocumentMap> {
        match self.read() {
            Ok(map) => Ok(map),
            Err(MetadataError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!("Metadata file {} absent, using empty map", self.path.display());
                Ok(DocumentMap::new())
            }
            Err(err) => match self.policy {
                LoadErrorPolicy::Fail => Err(err),
                LoadErrorPolicy::Empty => {
                    if matches!(err, MetadataError::Corrupt { .. }) {
                        self.quarantine(&err)?;
                    } else {
                        warn!("Failed to load metadata, continuing with an empty map: {}", err);
                    }
                    Ok(DocumentMap::new())
                }
            },
        }
    }

    /// Replace the file contents with `map`.
    pub fn save(&self, map: &DocumentMap) -> MetadataResult<()> {
        let json = serde_json::to_string_pretty(map)?;
        self.write_atomic(json.as_bytes())
    }

    /// Reset the file to an empty map.
    pub fn clear(&self) -> MetadataResult<usize> {
        let previous = self.load()?.len();
        self.save(&DocumentMap::new())?;
        Ok(previous)
    }

    fn read(&self) -> MetadataResult<DocumentMap> {
        let contents = std::fs::read(&self.path).map_err(|source| MetadataError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| MetadataError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomic(&self, bytes: &[u8]) -> MetadataResult<()> {
        let io_err = |source| MetadataError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(bytes).map_err(io_err)?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Move the unreadable file aside to `<name>.corrupt`.
    fn quarantine(&self, cause: &MetadataError) -> MetadataResult<()> {
        let quarantine = self.quarantine_path();
        error!(
            "Unreadable metadata file: {}. Moving it to {} and continuing EMPTY \
             (metadata.on_load_error=empty)",
            cause,
            quarantine.display()
        );
        std::fs::rename(&self.path, &quarantine).map_err(|source| MetadataError::Io {
            path: quarantine.clone(),
            source,
        })
    }

    fn quarantine_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }
}
