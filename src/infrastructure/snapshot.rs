//! Database snapshots for the control-plane appliance
//!
//! A snapshot is the rollback point for a VDC update. PostgreSQL engines
//! dump through `pg_dump` in custom format; the embedded SQLite engine is
//! snapshotted by copying the database file. Snapshot files are named
//! `vdc-snapshot-YYYYMMDD-HHMMSS.sql` and are never pruned here - the
//! retention policy is a separate operator concern.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

use crate::domain::migration::{DatabaseType, SnapshotInfo};

/// Resolve the file path inside an embedded-engine database URL.
fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshot_dir: PathBuf,
    database_type: DatabaseType,
    database_url: String,
}

impl SnapshotManager {
    pub fn new(
        snapshot_dir: impl Into<PathBuf>,
        database_type: DatabaseType,
        database_url: impl Into<String>,
    ) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            database_type,
            database_url: database_url.into(),
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Produce a timestamped dump. Returns the snapshot path.
    pub async fn create(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.snapshot_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.snapshot_dir.display()))?;

        let name = format!(
            "vdc-snapshot-{}.sql",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        );
        let path = self.snapshot_dir.join(&name);

        match self.database_type {
            DatabaseType::Postgres => {
                let output = Command::new("pg_dump")
                    .args(["-Fc", "-f"])
                    .arg(&path)
                    .arg(&self.database_url)
                    .output()
                    .await
                    .context("Failed to spawn pg_dump")?;
                if !output.status.success() {
                    bail!(
                        "pg_dump failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
            DatabaseType::Sqlite => {
                let source = sqlite_path(&self.database_url);
                tokio::fs::copy(source, &path)
                    .await
                    .with_context(|| format!("Failed to copy database file {}", source))?;
            }
        }

        info!(path = %path.display(), "created database snapshot");
        Ok(path)
    }

    /// Restore the database from a snapshot file.
    pub async fn restore(&self, snapshot: &Path) -> Result<()> {
        if !snapshot.exists() {
            bail!("Snapshot {} does not exist", snapshot.display());
        }

        match self.database_type {
            DatabaseType::Postgres => {
                let output = Command::new("pg_restore")
                    .args(["--clean", "--if-exists", "-d"])
                    .arg(&self.database_url)
                    .arg(snapshot)
                    .output()
                    .await
                    .context("Failed to spawn pg_restore")?;
                if !output.status.success() {
                    bail!(
                        "pg_restore failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
            DatabaseType::Sqlite => {
                let target = sqlite_path(&self.database_url);
                tokio::fs::copy(snapshot, target)
                    .await
                    .with_context(|| format!("Failed to restore database file {}", target))?;
            }
        }

        info!(path = %snapshot.display(), "restored database snapshot");
        Ok(())
    }

    /// All snapshot files, newest first.
    pub async fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.snapshot_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read snapshot directory"),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("vdc-snapshot-") {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified: chrono::DateTime<chrono::Utc> = metadata
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
                .into();
            snapshots.push(SnapshotInfo {
                name,
                path: entry.path().display().to_string(),
                size: metadata.len(),
                modified: modified.to_rfc3339(),
            });
        }

        snapshots.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(snapshots)
    }

    /// The most recent snapshot path, if any.
    pub async fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list().await?.first().map(|s| PathBuf::from(&s.path)))
    }

    /// Whether the database is reachable with the configured URL.
    pub async fn database_reachable(&self) -> Result<()> {
        match self.database_type {
            DatabaseType::Postgres => {
                let output = Command::new("pg_isready")
                    .args(["-d", &self.database_url])
                    .output()
                    .await
                    .context("Failed to spawn pg_isready")?;
                if !output.status.success() {
                    bail!(
                        "Database is not reachable: {}",
                        String::from_utf8_lossy(&output.stdout).trim()
                    );
                }
                Ok(())
            }
            DatabaseType::Sqlite => {
                let path = sqlite_path(&self.database_url);
                if !Path::new(path).exists() {
                    bail!("Database file {} does not exist", path);
                }
                Ok(())
            }
        }
    }

    /// Binary the snapshot step depends on, when there is one.
    pub fn required_binary(&self) -> Option<&'static str> {
        match self.database_type {
            DatabaseType::Postgres => Some("pg_dump"),
            DatabaseType::Sqlite => None,
        }
    }
}

/// Free bytes on the filesystem holding `dir`, via `df -Pk`.
pub async fn available_disk_bytes(dir: &Path) -> Result<u64> {
    let output = Command::new("df")
        .arg("-Pk")
        .arg(dir)
        .output()
        .await
        .context("Failed to spawn df")?;

    if !output.status.success() {
        bail!(
            "df failed for {}: {}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let available_kb: u64 = stdout
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|field| field.parse().ok())
        .context("Unparseable df output")?;

    Ok(available_kb * 1024)
}
