use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::models::PersistedSession;
use crate::session::SessionStore;

/// File-backed session mirror.
///
/// Both storage keys live in one JSON document, so the pair is written and
/// cleared atomically: writes go to a temp file, are synced, then renamed
/// over the final path. Anything unreadable loads as absent.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        assert!(
            !path.as_os_str().is_empty(),
            "Session file path must be provided"
        );
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SessionStore for FileStore {
    async fn load(&self) -> Option<PersistedSession> {
        if !self.path.exists() {
            return None;
        }
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Failed to read session file at {:?}: {err}", self.path);
                return None;
            }
        };
        match serde_json::from_str::<PersistedSession>(&contents) {
            Ok(session) => Some(session),
            Err(err) => {
                // Corrupt or partial content is treated as absence.
                warn!("Session file corrupted at {:?}: {err}", self.path);
                None
            }
        }
    }

    async fn persist(&self, session: &PersistedSession) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session directory {parent:?}"))?;
        }

        let json = serde_json::to_string_pretty(session)
            .context("Failed to serialize session")?;
        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", std::process::id()));

        {
            let mut file = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create session temp file {temp_path:?}"))?;
            file.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write session temp file {temp_path:?}"))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync session temp file {temp_path:?}"))?;
        }

        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            bail!(
                "Failed to move session file into place at {:?}: {err}",
                self.path
            );
        }

        info!("Session persisted for {}", session.wallet_address);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove session file at {:?}", self.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::models::UserRecord;

    const ADDRESS: &str = "GDUKMGUGDZQK6YHYA5Z6AY2G4XDSZPSZ3SW5UN3ARVMO6QSRDWP5YLEX";

    fn sample_session() -> PersistedSession {
        PersistedSession {
            wallet_address: ADDRESS.to_string(),
            user: UserRecord {
                id: "usr_01HZX4".to_string(),
                wallet_address: ADDRESS.to_string(),
                username: Some("alice".to_string()),
                created_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap(),
                last_login: Utc.with_ymd_and_hms(2026, 2, 1, 18, 30, 0).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("session.json"));

        assert!(store.load().await.is_none());
        store.persist(&sample_session()).await.expect("persist");
        assert_eq!(store.load().await, Some(sample_session()));
    }

    #[tokio::test]
    async fn persist_creates_missing_directories() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("nested/state/session.json"));

        store.persist(&sample_session()).await.expect("persist");
        assert_eq!(store.load().await, Some(sample_session()));
    }

    #[tokio::test]
    async fn clear_removes_the_file_and_is_idempotent() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("session.json"));

        store.persist(&sample_session()).await.expect("persist");
        store.clear().await.expect("clear");
        assert!(store.load().await.is_none());
        store.clear().await.expect("clear again");
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_absent() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json at all").expect("write garbage");

        let store = FileStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn partial_document_loads_as_absent() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        // One key present, the other missing.
        fs::write(&path, format!("{{\"stellar_wallet\": \"{ADDRESS}\"}}"))
            .expect("write partial");

        let store = FileStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn uses_the_web_client_storage_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        let store = FileStore::new(path.clone());

        store.persist(&sample_session()).await.expect("persist");
        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.contains("\"stellar_wallet\""));
        assert!(raw.contains("\"stellar_user\""));
    }
}
