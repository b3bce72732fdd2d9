//! Process-wide admission lock backed by a marker file.
//!
//! The marker survives restarts. A marker older than the stale threshold is
//! presumed abandoned by a crashed job and reclaimed on the next acquisition.

use crate::ports::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_STALE_AFTER_SECS: i64 = 5 * 60;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock marker io on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of the marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Acquire {
    Granted(LockGuard),
    StaleReclaimed {
        guard: LockGuard,
        previous_holder: Option<String>,
        age: Duration,
    },
    Busy {
        holder: Option<String>,
        age: Duration,
    },
}

impl Acquire {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Acquire::Busy { .. })
    }

    pub fn into_guard(self) -> Option<LockGuard> {
        match self {
            Acquire::Granted(guard) | Acquire::StaleReclaimed { guard, .. } => Some(guard),
            Acquire::Busy { .. } => None,
        }
    }
}

/// Held lock. Dropping the guard removes the marker, so every exit path of a
/// job releases it, panics included.
///
/// The marker is only removed while it still carries this guard's
/// [`LockInfo`]. A job that outlived the stale threshold and lost its marker
/// to a reclaim leaves the new holder's marker alone.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let current = read_marker(&self.path).await?;
        if current.as_ref() != Some(&self.info) {
            tracing::warn!(
                path = ?self.path,
                holder = %self.info.holder,
                current = ?current.map(|info| info.holder),
                "lock was reclaimed by another job, leaving its marker"
            );
            return Ok(());
        }
        remove_marker(&self.path).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let current = match std::fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice::<LockInfo>(&raw).ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "failed to read lock on drop");
                return;
            }
        };
        if current.as_ref() != Some(&self.info) {
            tracing::warn!(
                path = ?self.path,
                holder = %self.info.holder,
                "lock was reclaimed by another job, leaving its marker"
            );
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = ?self.path, "lock released on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "failed to release lock on drop")
            }
        }
    }
}

/// Parsed marker contents. `Ok(None)` when the marker is absent or unreadable.
async fn read_marker(path: &Path) -> Result<Option<LockInfo>, LockError> {
    match fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice(&raw).ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn remove_marker(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub struct LockManager {
    path: PathBuf,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            stale_after,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Try to become the single running job.
    ///
    /// `force` reclaims an existing marker regardless of its age.
    pub async fn try_acquire(&self, title: &str, force: bool) -> Result<Acquire, LockError> {
        if let Some(guard) = self.create_marker(title).await? {
            tracing::info!(holder = title, "lock granted");
            return Ok(Acquire::Granted(guard));
        }

        let (observed, age) = self.current().await?;
        let holder = observed.as_ref().map(|info| info.holder.clone());
        if !force && age <= self.stale_after {
            tracing::info!(?holder, age_ms = age.num_milliseconds(), "lock busy");
            return Ok(Acquire::Busy { holder, age });
        }

        // Another reclaimer may have replaced the marker since it was read
        if self.inspect().await? != observed {
            let (current, age) = self.current().await?;
            return Ok(Acquire::Busy {
                holder: current.map(|info| info.holder),
                age,
            });
        }

        tracing::warn!(
            ?holder,
            age_secs = age.num_seconds(),
            force,
            "reclaiming lock marker"
        );
        remove_marker(&self.path).await?;

        match self.create_marker(title).await? {
            Some(guard) => Ok(Acquire::StaleReclaimed {
                guard,
                previous_holder: holder,
                age,
            }),
            // Someone else won the race for the fresh marker
            None => {
                let (current, age) = self.current().await?;
                Ok(Acquire::Busy {
                    holder: current.map(|info| info.holder),
                    age,
                })
            }
        }
    }

    /// Remove the marker. Releasing an absent marker is not an error.
    pub async fn release(&self) -> Result<(), LockError> {
        remove_marker(&self.path).await
    }

    /// Current holder and start time, if a marker exists.
    pub async fn inspect(&self) -> Result<Option<LockInfo>, LockError> {
        read_marker(&self.path).await
    }

    /// Atomically create the marker. `Ok(None)` when it already exists.
    async fn create_marker(&self, title: &str) -> Result<Option<LockGuard>, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| self.io(e))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(self.io(e)),
        };
        let info = LockInfo {
            holder: title.to_string(),
            started_at: self.clock.now(),
        };
        let raw = serde_json::to_vec(&info).map_err(|e| self.io(e.into()))?;
        let written = async {
            file.write_all(&raw).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // A half-written marker would block admission until it turns stale
            let _ = fs::remove_file(&self.path).await;
            return Err(self.io(e));
        }

        Ok(Some(LockGuard {
            path: self.path.clone(),
            info,
            released: false,
        }))
    }

    /// Contents and age of the existing marker. Falls back to the file's
    /// modification time when the contents cannot be read yet.
    async fn current(&self) -> Result<(Option<LockInfo>, Duration), LockError> {
        let now = self.clock.now();
        if let Some(info) = self.inspect().await? {
            let age = (now - info.started_at).max(Duration::zero());
            return Ok((Some(info), age));
        }

        let modified = match fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().map_err(|e| self.io(e))?,
            // Vanished between the create attempt and now
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((None, Duration::zero())),
            Err(e) => return Err(self.io(e)),
        };
        let modified: DateTime<Utc> = modified.into();
        Ok((None, (now - modified).max(Duration::zero())))
    }

    fn io(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
