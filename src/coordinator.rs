//! Maintenance coordinator
//!
//! Serializes host updates against workload drain. One map, keyed by
//! node id, guarded by a single RwLock; every operation sees one coherent
//! snapshot and callers only ever receive owned copies of a record.
//!
//! Component updates that need no reboot skip the drain entirely. Full
//! updates ask the control plane to drain the node and gate on its
//! drain-progress callbacks. Without a configured control plane the
//! coordinator runs a short, logged timer instead so the flow stays
//! testable in development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::maintenance::{
    CompleteReport, DrainProgress, MaintenanceRequest, MaintenanceResponse, NodeMaintenanceInfo,
    NodeState, UpdateKind,
};
use crate::error::MaintenanceError;
use crate::infrastructure::control_plane::{ControlPlaneClient, DrainNodeRequest};

/// Drain simulation delay used when no control plane is configured.
const DEV_DRAIN_DELAY: Duration = Duration::from_secs(5);

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

type NodeMap = Arc<RwLock<HashMap<String, NodeMaintenanceInfo>>>;

pub struct MaintenanceCoordinator {
    nodes: NodeMap,
    control_plane: Option<Arc<ControlPlaneClient>>,
    /// Where the control plane posts drain progress back to
    drain_callback_url: String,
}

impl MaintenanceCoordinator {
    pub fn new(control_plane: Option<ControlPlaneClient>, drain_callback_url: String) -> Self {
        if control_plane.is_none() {
            info!(
                delay_secs = DEV_DRAIN_DELAY.as_secs(),
                "no control plane configured; drains will complete via the dev fallback timer"
            );
        }
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            control_plane: control_plane.map(Arc::new),
            drain_callback_url,
        }
    }

    /// Handle a maintenance request from a node.
    ///
    /// A node already mid-cycle gets its existing state back unchanged
    /// (poll-idempotent). A node in a terminal state starts a fresh cycle
    /// that overwrites the old record.
    pub async fn request(&self, request: MaintenanceRequest) -> MaintenanceResponse {
        let mut nodes = self.nodes.write().await;

        if let Some(existing) = nodes.get(&request.node_id) {
            if !existing.state.is_terminal() {
                return MaintenanceResponse::for_state(existing, existing.state);
            }
        }

        let mut info = NodeMaintenanceInfo::new(request.node_id.clone());
        info.requested_at = Some(now_rfc3339());
        info.target_version = request.target_version.clone();
        info.update_type = request.update_type;
        info.requires_reboot = request.requires_reboot;

        let fast_path = request.force
            || (request.update_type == UpdateKind::Component && !request.requires_reboot);

        let response = if fast_path {
            info.state = NodeState::Ready;
            info.ready_at = Some(now_rfc3339());
            tracing::info!(
                node_id = %info.node_id,
                force = request.force,
                "maintenance approved without drain"
            );
            MaintenanceResponse::for_state(&info, NodeState::Ready)
        } else {
            info.state = NodeState::Draining;
            info.draining_started_at = Some(now_rfc3339());
            tracing::info!(node_id = %info.node_id, "maintenance requires drain");
            self.start_drain(request.node_id.clone());
            MaintenanceResponse::for_state(&info, NodeState::Draining)
        };

        nodes.insert(request.node_id, info);
        response
    }

    /// Kick off the drain out-of-band: notify the control plane, or run
    /// the dev fallback timer.
    fn start_drain(&self, node_id: String) {
        match &self.control_plane {
            Some(client) => {
                let client = Arc::clone(client);
                let request = DrainNodeRequest {
                    node_id: node_id.clone(),
                    callback_url: self.drain_callback_url.clone(),
                };
                tokio::spawn(async move {
                    if let Err(e) = client.notify_drain(request).await {
                        warn!(node_id = %node_id, error = %e, "drain notification failed; node stays draining");
                    }
                });
            }
            None => {
                let nodes = Arc::clone(&self.nodes);
                tokio::spawn(async move {
                    tokio::time::sleep(DEV_DRAIN_DELAY).await;
                    let mut nodes = nodes.write().await;
                    if let Some(info) = nodes.get_mut(&node_id) {
                        if info.state == NodeState::Draining {
                            info.state = NodeState::Ready;
                            info.ready_at = Some(now_rfc3339());
                            info!(node_id = %node_id, "dev fallback drain complete (no VMs migrated)");
                        }
                    }
                });
            }
        }
    }

    /// Status poll from a node. Observing `ready` is the node's signal to
    /// start: the stored state advances to `updating` while the response
    /// still reads `ready` with `proceed_now=true`.
    pub async fn status(&self, node_id: &str) -> Result<MaintenanceResponse, MaintenanceError> {
        let mut nodes = self.nodes.write().await;
        let info = nodes
            .get_mut(node_id)
            .ok_or_else(|| MaintenanceError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;

        if info.state == NodeState::Ready {
            let response = MaintenanceResponse::for_state(info, NodeState::Ready);
            info.state = NodeState::Updating;
            info.update_started_at = Some(now_rfc3339());
            tracing::info!(node_id = %node_id, "node is proceeding with its update");
            return Ok(response);
        }

        Ok(MaintenanceResponse::for_state(info, info.state))
    }

    /// Drain progress callback from the control plane.
    pub async fn drain_progress(
        &self,
        progress: DrainProgress,
    ) -> Result<NodeState, MaintenanceError> {
        let mut nodes = self.nodes.write().await;
        let info = nodes
            .get_mut(&progress.node_id)
            .ok_or_else(|| MaintenanceError::NodeNotFound {
                node_id: progress.node_id.clone(),
            })?;

        info.total_vms = progress.total_vms;
        info.migrated_vms = progress.migrated_vms;
        info.failed_vms = progress.failed_vms;
        info.remaining_vms = progress.remaining_vms;

        if !progress.error.is_empty() {
            if !info.state.is_terminal() {
                info.state = NodeState::Failed;
                info.error_message = Some(progress.error.clone());
                warn!(node_id = %info.node_id, error = %progress.error, "drain failed");
            }
        } else if progress.completed && info.state == NodeState::Draining {
            info.state = NodeState::Ready;
            info.ready_at = Some(now_rfc3339());
            info!(
                node_id = %info.node_id,
                migrated = info.migrated_vms,
                "drain complete; node is ready"
            );
        }

        Ok(info.state)
    }

    /// Completion report from the update agent. The only input that moves
    /// a node out of `updating` or `rebooting`.
    pub async fn complete(
        &self,
        report: CompleteReport,
    ) -> Result<MaintenanceResponse, MaintenanceError> {
        let mut nodes = self.nodes.write().await;
        let info = nodes
            .get_mut(&report.node_id)
            .ok_or_else(|| MaintenanceError::NodeNotFound {
                node_id: report.node_id.clone(),
            })?;

        if !report.success {
            if !info.state.is_terminal() {
                info.state = NodeState::Failed;
                info.error_message = report.error.clone().or_else(|| {
                    Some("update agent reported failure".to_string())
                });
                warn!(node_id = %info.node_id, error = ?info.error_message, "update failed");
            }
            return Ok(MaintenanceResponse::for_state(info, info.state));
        }

        match info.state {
            NodeState::Updating if info.requires_reboot => {
                info.state = NodeState::Rebooting;
                info!(node_id = %info.node_id, "update applied; node rebooting");
            }
            NodeState::Updating | NodeState::Rebooting => {
                info.state = NodeState::Verifying;
                let version_ok = match (&report.version, &info.target_version) {
                    (Some(reported), Some(target)) => reported == target,
                    _ => true,
                };
                if version_ok {
                    info.state = NodeState::Completed;
                    info.completed_at = Some(now_rfc3339());
                    info!(node_id = %info.node_id, version = ?report.version, "update complete");
                } else {
                    info.state = NodeState::Failed;
                    info.error_message = Some(format!(
                        "version mismatch after update: reported {:?}, expected {:?}",
                        report.version, info.target_version
                    ));
                    warn!(node_id = %info.node_id, "update verification failed");
                }
            }
            // A report in any other state is a stale retry; leave the
            // record as it stands.
            _ => {}
        }

        Ok(MaintenanceResponse::for_state(info, info.state))
    }

    /// Explicit cancel. Nodes with an update actively applying are
    /// protected.
    pub async fn cancel(&self, node_id: &str) -> Result<MaintenanceResponse, MaintenanceError> {
        let mut nodes = self.nodes.write().await;
        let info = nodes
            .get_mut(node_id)
            .ok_or_else(|| MaintenanceError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;

        if info.state.is_protected() {
            return Err(MaintenanceError::CancelProtected {
                node_id: node_id.to_string(),
                state: info.state.name().to_string(),
            });
        }

        info.state = NodeState::Cancelled;
        info!(node_id = %node_id, "maintenance cancelled");
        Ok(MaintenanceResponse::for_state(info, NodeState::Cancelled))
    }

    /// Owned copies of every record, ordered by node id.
    pub async fn list(&self) -> Vec<NodeMaintenanceInfo> {
        let nodes = self.nodes.read().await;
        let mut all: Vec<NodeMaintenanceInfo> = nodes.values().cloned().collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }
}
