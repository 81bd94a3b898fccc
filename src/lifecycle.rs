//! Control-plane update lifecycle
//!
//! Drives one VDC appliance update at a time through
//! pre-check → snapshot → download → migrating → starting → health-check,
//! rolling back to the snapshot when the migrate/start/health phases
//! fail. The start call returns as soon as the run is scheduled; the run
//! itself holds no lock between phases, re-acquiring briefly to publish
//! each transition so the status endpoint always sees a coherent record.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::domain::migration::{
    DatabaseType, MigrationPhase, RollbackRequest, SnapshotInfo, StartMigrationRequest,
    VdcMigrationState,
};
use crate::error::LifecycleError;
use crate::infrastructure::service_manager::ServiceManager;
use crate::infrastructure::snapshot::{available_disk_bytes, SnapshotManager};

/// Free space required in the snapshot directory before a run may start.
const MIN_DISK_HEADROOM_BYTES: u64 = 1024 * 1024 * 1024;

/// Settle time after starting the managed service, before health checks.
const SERVICE_SETTLE: Duration = Duration::from_secs(3);

/// Pause between failed health-check attempts.
const HEALTH_RETRY_PAUSE: Duration = Duration::from_secs(2);

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Public handle. Runs execute on a shared inner so the async task and
/// the HTTP handlers observe the same singleton state.
pub struct MigrationLifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    state: RwLock<VdcMigrationState>,
    snapshots: SnapshotManager,
    service: ServiceManager,
    migrations_dir: PathBuf,
    database_type: DatabaseType,
    database_url: String,
    health_url: String,
    health_timeout: Duration,
    health_retries: u32,
    http: reqwest::Client,
}

impl MigrationLifecycle {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                state: RwLock::new(VdcMigrationState::default()),
                snapshots: SnapshotManager::new(
                    &config.snapshot_dir,
                    config.database_type,
                    &config.database_url,
                ),
                service: ServiceManager::new(
                    config.service_manager,
                    &config.managed_service_name,
                ),
                migrations_dir: config.migrations_dir.clone(),
                database_type: config.database_type,
                database_url: config.database_url.clone(),
                health_url: config.health_check_url.clone(),
                health_timeout: Duration::from_secs(config.health_check_timeout_secs),
                health_retries: config.health_check_retries,
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Current state, copied out.
    pub async fn status(&self) -> VdcMigrationState {
        self.inner.state.read().await.clone()
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        self.inner.snapshots.list().await
    }

    /// Take a manual snapshot outside any run.
    pub async fn create_snapshot(&self) -> Result<PathBuf, LifecycleError> {
        let path = self
            .inner
            .snapshots
            .create()
            .await
            .map_err(|e| LifecycleError::Snapshot(e.to_string()))?;

        let mut state = self.inner.state.write().await;
        if !state.phase.is_active() {
            state.snapshot_path = Some(path.display().to_string());
            state.snapshot_created_at = Some(now_rfc3339());
            state.can_rollback = true;
        }
        Ok(path)
    }

    /// Begin an update run. Rejected while another run is active; the
    /// lifecycle itself executes asynchronously and the returned state is
    /// the freshly initialized record at `pre-check`.
    pub async fn start(
        &self,
        request: StartMigrationRequest,
    ) -> Result<VdcMigrationState, LifecycleError> {
        let snapshot = {
            let mut state = self.inner.state.write().await;
            if state.phase.is_active() {
                return Err(LifecycleError::AlreadyRunning {
                    phase: state.phase.name().to_string(),
                });
            }

            *state = VdcMigrationState {
                phase: MigrationPhase::PreCheck,
                current_version: request.current_version.clone(),
                target_version: Some(request.target_version.clone()),
                started_at: Some(now_rfc3339()),
                ..VdcMigrationState::default()
            };
            state.clone()
        };

        info!(
            target_version = %request.target_version,
            skip_snapshot = request.skip_snapshot,
            "starting VDC update lifecycle"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(request.skip_snapshot).await;
        });

        Ok(snapshot)
    }

    /// Manual rollback to an explicit or the recorded snapshot.
    pub async fn rollback(
        &self,
        request: RollbackRequest,
    ) -> Result<VdcMigrationState, LifecycleError> {
        let (path, snapshot_state) = {
            let mut state = self.inner.state.write().await;
            if state.phase.is_active() {
                return Err(LifecycleError::AlreadyRunning {
                    phase: state.phase.name().to_string(),
                });
            }

            let path = match request.snapshot_path {
                Some(explicit) => PathBuf::from(explicit),
                None => match &state.snapshot_path {
                    Some(recorded) => PathBuf::from(recorded),
                    None => self
                        .inner
                        .snapshots
                        .latest()
                        .await
                        .map_err(|e| LifecycleError::Snapshot(e.to_string()))?
                        .ok_or(LifecycleError::NoSnapshot)?,
                },
            };

            state.phase = MigrationPhase::RollingBack;
            state.error_message = None;
            (path, state.clone())
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_rollback(path).await;
        });

        Ok(snapshot_state)
    }
}

impl LifecycleInner {
    /// The async run. Holds the state lock only inside the short update
    /// closures.
    async fn run(&self, skip_snapshot: bool) {
        // Phase 1: pre-check
        if let Err(e) = self.pre_check().await {
            self.fail(format!("pre-check failed: {:#}", e)).await;
            return;
        }

        // Phase 2: snapshot
        if skip_snapshot {
            info!("snapshot skipped by request");
        } else {
            self.set_phase(MigrationPhase::Snapshot).await;
            match self.snapshots.create().await {
                Ok(path) => {
                    let mut state = self.state.write().await;
                    state.snapshot_path = Some(path.display().to_string());
                    state.snapshot_created_at = Some(now_rfc3339());
                    state.can_rollback = true;
                }
                Err(e) => {
                    self.fail(format!("snapshot failed: {:#}", e)).await;
                    return;
                }
            }
        }

        // Phase 3: download. The update agent fetches the actual bytes;
        // the phase exists so observers can display it.
        self.set_phase(MigrationPhase::Download).await;

        // Phase 4: stop the service and apply schema migrations
        self.set_phase(MigrationPhase::Migrating).await;
        if let Err(e) = self.service.stop().await {
            self.fail_and_rollback(format!("failed to stop service: {:#}", e))
                .await;
            return;
        }
        if let Err(e) = self.apply_migrations().await {
            self.fail_and_rollback(format!("migration failed: {:#}", e))
                .await;
            return;
        }

        // Phase 5: start the service and let it settle
        self.set_phase(MigrationPhase::Starting).await;
        if let Err(e) = self.service.start().await {
            self.fail_and_rollback(format!("failed to start service: {:#}", e))
                .await;
            return;
        }
        tokio::time::sleep(SERVICE_SETTLE).await;

        // Phase 6: health check
        self.set_phase(MigrationPhase::HealthCheck).await;
        if let Err(e) = self.health_check().await {
            self.fail_and_rollback(format!("health check failed: {:#}", e))
                .await;
            return;
        }

        // Phase 7: done
        let mut state = self.state.write().await;
        state.phase = MigrationPhase::Completed;
        state.completed_at = Some(now_rfc3339());
        state.health_check_passed = true;
        info!(target_version = ?state.target_version, "VDC update lifecycle completed");
    }

    async fn pre_check(&self) -> Result<()> {
        self.snapshots
            .database_reachable()
            .await
            .context("database pre-check")?;

        tokio::fs::create_dir_all(self.snapshots.snapshot_dir())
            .await
            .context("snapshot directory pre-check")?;
        let free = available_disk_bytes(self.snapshots.snapshot_dir())
            .await
            .context("disk headroom pre-check")?;
        if free < MIN_DISK_HEADROOM_BYTES {
            bail!(
                "insufficient disk headroom: {} bytes free, {} required",
                free,
                MIN_DISK_HEADROOM_BYTES
            );
        }

        if !self.service.is_available() {
            bail!(
                "service manager binary '{}' not found",
                self.service.kind().binary()
            );
        }
        if let Some(binary) = self.snapshots.required_binary() {
            if which::which(binary).is_err() {
                bail!("required binary '{}' not found", binary);
            }
        }

        Ok(())
    }

    /// Apply every pending `.sql` file in lexical order.
    async fn apply_migrations(&self) -> Result<()> {
        let mut pending = self.list_migration_files().await?;
        pending.sort();

        {
            let mut state = self.state.write().await;
            state.migrations_pending = pending
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().to_string())
                .collect();
        }

        for file in pending {
            let name = file
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            info!(migration = %name, "applying migration");

            let result = self.apply_one_migration(&file).await;

            let mut state = self.state.write().await;
            state.migrations_pending.retain(|m| m != &name);
            match result {
                Ok(()) => state.migrations_run.push(name),
                Err(e) => {
                    state.migration_errors.push(format!("{}: {:#}", name, e));
                    drop(state);
                    return Err(e).with_context(|| format!("migration {}", name));
                }
            }
        }

        Ok(())
    }

    async fn list_migration_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.migrations_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("failed to read migrations directory"),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("sql") {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn apply_one_migration(&self, file: &std::path::Path) -> Result<()> {
        let output = match self.database_type {
            DatabaseType::Postgres => {
                tokio::process::Command::new("psql")
                    .args(["-v", "ON_ERROR_STOP=1", "-f"])
                    .arg(file)
                    .arg(&self.database_url)
                    .output()
                    .await
                    .context("Failed to spawn psql")?
            }
            DatabaseType::Sqlite => {
                let db = self
                    .database_url
                    .strip_prefix("sqlite://")
                    .or_else(|| self.database_url.strip_prefix("sqlite:"))
                    .unwrap_or(&self.database_url);
                tokio::process::Command::new("sqlite3")
                    .arg(db)
                    .arg(format!(".read {}", file.display()))
                    .output()
                    .await
                    .context("Failed to spawn sqlite3")?
            }
        };

        if !output.status.success() {
            bail!("{}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(())
    }

    /// Poll the configured health URL until it answers 200 or the retry
    /// budget is spent.
    async fn health_check(&self) -> Result<()> {
        for attempt in 1..=self.health_retries {
            let result = self
                .http
                .get(&self.health_url)
                .timeout(self.health_timeout)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, "health check passed");
                    return Ok(());
                }
                Ok(response) => {
                    let message = format!("attempt {}: status {}", attempt, response.status());
                    self.record_health_failure(message).await;
                }
                Err(e) => {
                    let message = format!("attempt {}: {}", attempt, e);
                    self.record_health_failure(message).await;
                }
            }

            if attempt < self.health_retries {
                tokio::time::sleep(HEALTH_RETRY_PAUSE).await;
            }
        }

        bail!(
            "service did not become healthy within {} attempts",
            self.health_retries
        )
    }

    async fn record_health_failure(&self, message: String) {
        let mut state = self.state.write().await;
        state.health_check_retries += 1;
        state.health_check_errors.push(message);
    }

    async fn set_phase(&self, phase: MigrationPhase) {
        let mut state = self.state.write().await;
        info!(from = %state.phase.name(), to = %phase.name(), "lifecycle phase transition");
        state.phase = phase;
    }

    async fn fail(&self, message: String) {
        error!(error = %message, "lifecycle run failed");
        let mut state = self.state.write().await;
        state.phase = MigrationPhase::Failed;
        state.error_message = Some(message);
    }

    /// Failure in migrate/start/health-check: mark failed, then roll back
    /// when a snapshot exists.
    async fn fail_and_rollback(&self, message: String) {
        self.fail(message).await;

        let snapshot = {
            let state = self.state.read().await;
            if !state.can_rollback {
                warn!("no snapshot recorded; leaving state at failed");
                return;
            }
            state.snapshot_path.clone()
        };

        let Some(path) = snapshot else {
            warn!("rollback flagged but no snapshot path recorded");
            return;
        };

        self.set_phase(MigrationPhase::RollingBack).await;
        self.run_rollback(PathBuf::from(path)).await;
    }

    /// Stop (best-effort), restore, start, and mark rolled back. A
    /// rollback that itself fails parks the state at `failed` with a
    /// distinct message; at that point the operator owns recovery.
    async fn run_rollback(&self, snapshot: PathBuf) {
        info!(snapshot = %snapshot.display(), "rolling back to snapshot");

        if let Err(e) = self.service.stop().await {
            warn!(error = %e, "service stop during rollback failed; continuing");
        }

        if let Err(e) = self.snapshots.restore(&snapshot).await {
            self.fail(format!("rollback failed: snapshot restore: {:#}", e))
                .await;
            return;
        }

        if let Err(e) = self.service.start().await {
            self.fail(format!("rollback failed: service start: {:#}", e))
                .await;
            return;
        }

        let mut state = self.state.write().await;
        state.phase = MigrationPhase::RolledBack;
        state.completed_at = Some(now_rfc3339());
        info!("rollback complete");
    }
}
