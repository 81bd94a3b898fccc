//! Server configuration
//!
//! All knobs are environment-keyed with defaults, loaded once at startup
//! into an owned struct that the composition root hands to each subsystem.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RELEASE_ROOT` | `/var/lib/quantix/releases` |
//! | `LISTEN_ADDRESS` | `0.0.0.0:8090` |
//! | `PUBLISH_TOKEN` | empty (mutating endpoints rejected until set) |
//! | `GIT_REPO_PATH` | `/opt/quantix/repo` |
//! | `UI_STATIC_PATH` | unset (no static UI) |
//! | `SIGNING_PRIVATE_KEY_PATH` | unset (signing disabled) |
//! | `SIGNING_PUBLIC_KEY_PATH` | unset |
//! | `SIGNING_KEY_ID` | `quantix-release-1` |
//! | `SNAPSHOT_DIR` | `/var/lib/quantix/snapshots` |
//! | `MIGRATIONS_DIR` | `/opt/quantix/vdc/migrations` |
//! | `HEALTH_CHECK_URL` | `http://127.0.0.1:8080/health` |
//! | `HEALTH_CHECK_TIMEOUT_SECS` | `10` |
//! | `HEALTH_CHECK_RETRIES` | `30` |
//! | `MANAGED_SERVICE_NAME` | `quantix-vdc` |
//! | `SERVICE_MANAGER` | `systemd` (or `openrc`, `docker`) |
//! | `DATABASE_URL` | `postgres://quantix@127.0.0.1/vdc` |
//! | `DATABASE_TYPE` | `postgres` (or `sqlite`) |
//! | `CONTROL_PLANE_URL` | unset (dev drain fallback engages) |

use anyhow::{bail, Result};
use serde_json::json;
use std::path::PathBuf;

use crate::domain::migration::DatabaseType;
use crate::infrastructure::service_manager::ServiceManagerKind;

/// Hard per-request body limit, enforced before multipart parsing.
pub const MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub release_root: PathBuf,
    pub listen_address: String,
    pub publish_token: String,
    pub git_repo_path: PathBuf,
    pub ui_static_path: Option<PathBuf>,
    pub signing_private_key_path: Option<PathBuf>,
    pub signing_public_key_path: Option<PathBuf>,
    pub signing_key_id: String,
    pub snapshot_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub health_check_url: String,
    pub health_check_timeout_secs: u64,
    pub health_check_retries: u32,
    pub managed_service_name: String,
    pub service_manager: ServiceManagerKind,
    pub database_url: String,
    pub database_type: DatabaseType,
    pub control_plane_url: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let service_manager_raw = env_or("SERVICE_MANAGER", "systemd");
        let Some(service_manager) = ServiceManagerKind::from_str(&service_manager_raw) else {
            bail!(
                "Invalid SERVICE_MANAGER '{}': expected systemd, openrc, or docker",
                service_manager_raw
            );
        };

        let database_type_raw = env_or("DATABASE_TYPE", "postgres");
        let Some(database_type) = DatabaseType::from_str(&database_type_raw) else {
            bail!(
                "Invalid DATABASE_TYPE '{}': expected postgres or sqlite",
                database_type_raw
            );
        };

        let health_check_timeout_secs = env_or("HEALTH_CHECK_TIMEOUT_SECS", "10")
            .parse()
            .unwrap_or(10);
        let health_check_retries = env_or("HEALTH_CHECK_RETRIES", "30").parse().unwrap_or(30);

        Ok(Self {
            release_root: PathBuf::from(env_or("RELEASE_ROOT", "/var/lib/quantix/releases")),
            listen_address: env_or("LISTEN_ADDRESS", "0.0.0.0:8090"),
            publish_token: env_or("PUBLISH_TOKEN", ""),
            git_repo_path: PathBuf::from(env_or("GIT_REPO_PATH", "/opt/quantix/repo")),
            ui_static_path: env_opt("UI_STATIC_PATH").map(PathBuf::from),
            signing_private_key_path: env_opt("SIGNING_PRIVATE_KEY_PATH").map(PathBuf::from),
            signing_public_key_path: env_opt("SIGNING_PUBLIC_KEY_PATH").map(PathBuf::from),
            signing_key_id: env_or("SIGNING_KEY_ID", "quantix-release-1"),
            snapshot_dir: PathBuf::from(env_or("SNAPSHOT_DIR", "/var/lib/quantix/snapshots")),
            migrations_dir: PathBuf::from(env_or("MIGRATIONS_DIR", "/opt/quantix/vdc/migrations")),
            health_check_url: env_or("HEALTH_CHECK_URL", "http://127.0.0.1:8080/health"),
            health_check_timeout_secs,
            health_check_retries,
            managed_service_name: env_or("MANAGED_SERVICE_NAME", "quantix-vdc"),
            service_manager,
            database_url: env_or("DATABASE_URL", "postgres://quantix@127.0.0.1/vdc"),
            database_type,
            control_plane_url: env_opt("CONTROL_PLANE_URL"),
        })
    }

    /// Whether a control plane is configured. When false, the maintenance
    /// coordinator runs its logged dev drain fallback instead of notifying.
    pub fn control_plane_configured(&self) -> bool {
        self.control_plane_url.is_some()
    }

    /// Effective configuration for the admin endpoint, token redacted.
    pub fn sanitized(&self) -> serde_json::Value {
        json!({
            "release_root": self.release_root,
            "listen_address": self.listen_address,
            "publish_token": if self.publish_token.is_empty() { "(unset)" } else { "(redacted)" },
            "git_repo_path": self.git_repo_path,
            "ui_static_path": self.ui_static_path,
            "signing_private_key_path": self.signing_private_key_path,
            "signing_public_key_path": self.signing_public_key_path,
            "signing_key_id": self.signing_key_id,
            "snapshot_dir": self.snapshot_dir,
            "migrations_dir": self.migrations_dir,
            "health_check_url": self.health_check_url,
            "health_check_timeout_secs": self.health_check_timeout_secs,
            "health_check_retries": self.health_check_retries,
            "managed_service_name": self.managed_service_name,
            "service_manager": self.service_manager.name(),
            "database_url": self.database_url,
            "database_type": self.database_type.name(),
            "control_plane_url": self.control_plane_url,
        })
    }
}

#[cfg(test)]
impl Default for ServerConfig {
    /// Test fixture with inert paths; individual tests override fields.
    fn default() -> Self {
        Self {
            release_root: PathBuf::from("/tmp/quantix-releases"),
            listen_address: "127.0.0.1:0".to_string(),
            publish_token: "test-token".to_string(),
            git_repo_path: PathBuf::from("/tmp/quantix-repo"),
            ui_static_path: None,
            signing_private_key_path: None,
            signing_public_key_path: None,
            signing_key_id: "quantix-release-1".to_string(),
            snapshot_dir: PathBuf::from("/tmp/quantix-snapshots"),
            migrations_dir: PathBuf::from("/tmp/quantix-migrations"),
            health_check_url: "http://127.0.0.1:8080/health".to_string(),
            health_check_timeout_secs: 1,
            health_check_retries: 1,
            managed_service_name: "quantix-vdc".to_string(),
            service_manager: ServiceManagerKind::Systemd,
            database_url: "sqlite:///tmp/vdc.db".to_string(),
            database_type: DatabaseType::Sqlite,
            control_plane_url: None,
        }
    }
}
