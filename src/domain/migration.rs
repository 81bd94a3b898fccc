//! Control-plane migration lifecycle types
//!
//! A VDC appliance update is a stateful pipeline: pre-check the host,
//! snapshot the database, apply schema migrations, restart the service and
//! health-check it, with rollback to the snapshot on failure. Exactly one
//! run may be in flight process-wide; `VdcMigrationState` is that singleton
//! record as observed through the status endpoint.

use serde::{Deserialize, Serialize};

/// Database engines the appliance can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL (snapshots via pg_dump custom format)
    Postgres,
    /// Embedded SQLite (snapshots via file copy)
    Sqlite,
}

impl DatabaseType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Lifecycle phases. Happy path runs top to bottom; failures jump to
/// `Failed` and, from the migrating/starting/health-check phases, trigger
/// an automatic rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationPhase {
    None,
    PreCheck,
    Snapshot,
    Download,
    Migrating,
    Starting,
    HealthCheck,
    Completed,
    Failed,
    RollingBack,
    RolledBack,
}

impl MigrationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PreCheck => "pre-check",
            Self::Snapshot => "snapshot",
            Self::Download => "download",
            Self::Migrating => "migrating",
            Self::Starting => "starting",
            Self::HealthCheck => "health-check",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RollingBack => "rolling-back",
            Self::RolledBack => "rolled-back",
        }
    }

    /// A new run may only start when no run is active.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            Self::None | Self::Completed | Self::RolledBack | Self::Failed
        )
    }
}

/// The singleton lifecycle record for a control-plane update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdcMigrationState {
    pub phase: MigrationPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_created_at: Option<String>,
    pub migrations_run: Vec<String>,
    pub migrations_pending: Vec<String>,
    pub migration_errors: Vec<String>,
    pub health_check_passed: bool,
    pub health_check_errors: Vec<String>,
    pub health_check_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub can_rollback: bool,
}

impl Default for VdcMigrationState {
    fn default() -> Self {
        Self {
            phase: MigrationPhase::None,
            current_version: None,
            target_version: None,
            started_at: None,
            completed_at: None,
            snapshot_path: None,
            snapshot_created_at: None,
            migrations_run: Vec::new(),
            migrations_pending: Vec::new(),
            migration_errors: Vec::new(),
            health_check_passed: false,
            health_check_errors: Vec::new(),
            health_check_retries: 0,
            error_message: None,
            can_rollback: false,
        }
    }
}

/// Body of `POST /migrations/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMigrationRequest {
    pub target_version: String,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default)]
    pub skip_snapshot: bool,
}

/// Body of `POST /migrations/rollback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// Snapshot listing entry for `GET /migrations/snapshots`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: String,
}
