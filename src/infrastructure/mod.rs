//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that talks to external systems:
//! - Control plane (drain notifications)
//! - Service managers (systemd / OpenRC / Docker)
//! - Database snapshot tooling (pg_dump / sqlite file copy)

pub mod control_plane;
pub mod service_manager;
pub mod snapshot;

// Re-export commonly used types
pub use control_plane::ControlPlaneClient;
pub use service_manager::{ServiceManager, ServiceManagerKind};
pub use snapshot::SnapshotManager;
