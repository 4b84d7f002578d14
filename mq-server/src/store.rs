//! Persisted users document
//!
//! The document is kept in memory as an immutable snapshot and replaced as a whole on every
//! change. Writers are serialized, each write goes to a temporary file which is then renamed over
//! the live one, so readers of the file never see a partial document. Before every write the
//! previous document is copied aside as a timestamped backup; only the most recent backups are
//! retained.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::prelude::*;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use sha3::{Digest, Sha3_256};
use subscriptions::mutation::Applied;
use subscriptions::{Mutation, UserRecord, UserStore};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::auth::secret;
use crate::config;
use crate::error::Error;

/// What happened to the live document after a failed write
#[derive(Debug)]
pub enum Restore {
    /// Live document was left intact
    NotNeeded,
    /// Live document was restored from the backup
    Restored(PathBuf),
    /// Live document is damaged and there is no backup
    NoBackup,
    /// Restoring the backup failed as well
    Failed(io::Error),
}

impl fmt::Display for Restore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNeeded => Ok(()),
            Self::Restored(backup) => write!(f, "; restored from {}", backup.display()),
            Self::NoBackup => write!(f, "; no backup to restore from"),
            Self::Failed(err) => write!(f, "; restoring backup failed: {err}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to write users document: {source}{restore}")]
pub struct PersistenceError {
    #[source]
    pub source: io::Error,
    pub restore: Restore,
}

/// Users document as of a single write
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub users: UserStore,
    /// Digest of the serialized document
    pub revision: String,
}

impl Snapshot {
    fn new(users: UserStore) -> Result<(Self, Vec<u8>), io::Error> {
        let data = serde_json::to_vec_pretty(&users).map_err(io::Error::other)?;
        let revision = revision(&data);
        Ok((Self { users, revision }, data))
    }
}

fn revision(data: &[u8]) -> String {
    let digest = Sha3_256::digest(data);
    BASE64_URL_SAFE_NO_PAD.encode(digest)
}

/// File backed users document
pub struct FileStore {
    path: PathBuf,
    /// Retained backups
    backups: usize,
    current: RwLock<Arc<Snapshot>>,
    /// Serializes read-modify-write cycles
    writer: Mutex<()>,
}

impl FileStore {
    /// Loads the document from disk
    ///
    /// Missing document is treated as an empty one - it will be created by the first write. PINs
    /// stored in cleartext are hashed if `migrate` is set, otherwise loading fails.
    pub async fn open(config: &config::Store) -> Result<Self> {
        let (users, stale) = match tokio::fs::read(&config.path).await {
            Ok(data) => {
                let users: UserStore = serde_json::from_slice(&data).wrap_err_with(|| {
                    format!("Malformed users document {}", config.path.display())
                })?;
                users.validate()?;
                Self::migrate(users, config.migrate)?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %config.path.display(), "Users document missing, starting empty");
                (UserStore::default(), false)
            }
            Err(err) => {
                return Err(err)
                    .wrap_err_with(|| format!("Cannot read {}", config.path.display()));
            }
        };

        let (snapshot, data) = Snapshot::new(users)?;
        let store = Self {
            path: config.path.clone(),
            backups: config.backups,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        };

        if stale {
            info!(path = %store.path.display(), "Persisting migrated users document");
            store.persist(&data, Utc::now()).await?;
        }

        info!(
            path = %store.path.display(),
            users = store.snapshot().users.len(),
            "Users document loaded"
        );
        Ok(store)
    }

    /// Hashes cleartext PINs. Returns the document and whether anything changed.
    fn migrate(mut users: UserStore, migrate: bool) -> Result<(UserStore, bool)> {
        let mut changed = false;
        for user in &mut users.users {
            if secret::is_hash(&user.pin) {
                continue;
            }

            if !migrate {
                bail!(
                    "Cleartext PIN stored for {}, enable `store.migrate` to hash it",
                    user.username
                );
            }

            user.pin = secret::hash(&user.pin)?;
            changed = true;
        }

        Ok((users, changed))
    }

    /// Current document
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applies a mutation and persists the outcome
    ///
    /// If `expected_revision` is given, the mutation is refused when the document changed since.
    /// The in-memory document is only replaced once the new one is on disk.
    #[instrument(skip(self, expected_revision))]
    pub async fn apply(
        &self,
        mutation: Mutation,
        now: DateTime<Utc>,
        expected_revision: Option<&str>,
    ) -> Result<(Option<UserRecord>, Arc<Snapshot>), Error> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        if let Some(expected) = expected_revision
            && expected != current.revision
        {
            return Err(Error::Conflict(expected.to_owned()));
        }

        let Applied { store, record } = mutation.apply(&current.users, now.date_naive())?;
        let (snapshot, data) = Snapshot::new(store).map_err(|source| PersistenceError {
            source,
            restore: Restore::NotNeeded,
        })?;

        self.persist(&data, now).await?;

        let snapshot = Arc::new(snapshot);
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();

        debug!(revision = %snapshot.revision, "Users document replaced");
        Ok((record, snapshot))
    }

    /// Writes the document, restoring the backup if the write damaged the live file
    async fn persist(&self, data: &[u8], now: DateTime<Utc>) -> Result<(), PersistenceError> {
        if let Err(err) = self.backup(now).await {
            warn!(%err, "Cannot back up users document");
        }

        let Err(source) = self.replace(data).await else {
            self.prune_backups().await;
            return Ok(());
        };

        warn!(err = %source, "Writing users document failed");
        let restore = self.restore().await;
        Err(PersistenceError { source, restore })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.file_name();
        name.push_str(".tmp");
        self.path.with_file_name(name)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "users.json".to_owned())
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn backup_prefix(&self) -> String {
        format!("{}.bak.", self.file_name())
    }

    /// Write-temp-then-rename
    async fn replace(&self, data: &[u8]) -> io::Result<()> {
        tokio::fs::create_dir_all(self.dir()).await?;

        let tmp = self.tmp_path();
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written
    }

    /// Copies the live document aside
    async fn backup(&self, now: DateTime<Utc>) -> io::Result<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }

        let backup = self.path.with_file_name(format!(
            "{}{}",
            self.backup_prefix(),
            now.format("%Y-%m-%d-%H-%M-%S-%3f")
        ));
        tokio::fs::copy(&self.path, &backup).await?;
        debug!(backup = %backup.display(), "Users document backed up");
        Ok(())
    }

    /// Backups sorted from the oldest
    async fn list_backups(&self) -> io::Result<Vec<PathBuf>> {
        let prefix = self.backup_prefix();
        let mut backups = vec![];

        let mut entries = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                backups.push(entry.path());
            }
        }

        // Timestamps are fixed width, so names sort chronologically
        backups.sort();
        Ok(backups)
    }

    async fn prune_backups(&self) {
        let backups = match self.list_backups().await {
            Ok(backups) => backups,
            Err(err) => {
                warn!(%err, "Cannot list users document backups");
                return;
            }
        };

        let excess = backups.len().saturating_sub(self.backups);
        for backup in &backups[..excess] {
            if let Err(err) = tokio::fs::remove_file(backup).await {
                warn!(%err, backup = %backup.display(), "Cannot remove old backup");
            }
        }
    }

    /// Brings back the latest backup if the live document is missing or unreadable
    async fn restore(&self) -> Restore {
        let intact = match tokio::fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice::<UserStore>(&data).is_ok(),
            Err(_) => false,
        };
        if intact {
            return Restore::NotNeeded;
        }

        let latest = match self.list_backups().await {
            Ok(mut backups) => backups.pop(),
            Err(err) => return Restore::Failed(err),
        };
        let Some(latest) = latest else {
            return Restore::NoBackup;
        };

        match tokio::fs::copy(&latest, &self.path).await {
            Ok(_) => {
                info!(backup = %latest.display(), "Users document restored");
                Restore::Restored(latest)
            }
            Err(err) => Restore::Failed(err),
        }
    }
}
