//! Service manager dialects
//!
//! The appliance's managed service is cycled through the host's init
//! system. Three dialects are supported; the choice is made once at
//! startup from configuration and never from request content.

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::info;

/// Which init system drives the managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManagerKind {
    Systemd,
    Openrc,
    Docker,
}

impl ServiceManagerKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "systemd" => Some(Self::Systemd),
            "openrc" => Some(Self::Openrc),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
            Self::Openrc => "openrc",
            Self::Docker => "docker",
        }
    }

    /// The binary this dialect shells out to.
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Systemd => "systemctl",
            Self::Openrc => "rc-service",
            Self::Docker => "docker",
        }
    }
}

/// One managed service under one init dialect.
#[derive(Debug, Clone)]
pub struct ServiceManager {
    kind: ServiceManagerKind,
    service: String,
}

impl ServiceManager {
    pub fn new(kind: ServiceManagerKind, service: impl Into<String>) -> Self {
        Self {
            kind,
            service: service.into(),
        }
    }

    pub fn kind(&self) -> ServiceManagerKind {
        self.kind
    }

    /// Whether the dialect's binary is present on this host.
    pub fn is_available(&self) -> bool {
        which::which(self.kind.binary()).is_ok()
    }

    pub async fn start(&self) -> Result<()> {
        self.run("start").await
    }

    pub async fn stop(&self) -> Result<()> {
        self.run("stop").await
    }

    async fn run(&self, action: &str) -> Result<()> {
        let args: Vec<&str> = match self.kind {
            ServiceManagerKind::Systemd => vec![action, &self.service],
            ServiceManagerKind::Openrc => vec![&self.service, action],
            ServiceManagerKind::Docker => vec![action, &self.service],
        };

        info!(
            manager = %self.kind.name(),
            service = %self.service,
            action = %action,
            "running service manager command"
        );

        let output = Command::new(self.kind.binary())
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.kind.binary()))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} {} {} failed: {}",
                self.kind.binary(),
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            ServiceManagerKind::from_str("systemd"),
            Some(ServiceManagerKind::Systemd)
        );
        assert_eq!(
            ServiceManagerKind::from_str("OpenRC"),
            Some(ServiceManagerKind::Openrc)
        );
        assert_eq!(
            ServiceManagerKind::from_str("docker"),
            Some(ServiceManagerKind::Docker)
        );
        assert_eq!(ServiceManagerKind::from_str("launchd"), None);
    }

    #[test]
    fn test_dialect_binaries() {
        assert_eq!(ServiceManagerKind::Systemd.binary(), "systemctl");
        assert_eq!(ServiceManagerKind::Openrc.binary(), "rc-service");
        assert_eq!(ServiceManagerKind::Docker.binary(), "docker");
    }
}
