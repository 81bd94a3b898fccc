//! Node maintenance state machine types
//!
//! A host entering maintenance walks:
//!   requested → draining → ready → updating → rebooting → verifying → completed
//! with `failed` reachable from any non-terminal state and `cancelled` from
//! any state in which no update is applying. The coordinator owns the
//! transitions; these types are the per-node record and its wire shapes.

use serde::{Deserialize, Serialize};

/// Per-node maintenance state. The absence of a record is the implicit
/// `none` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Requested,
    Draining,
    Ready,
    Updating,
    Rebooting,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl NodeState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Draining => "draining",
            Self::Ready => "ready",
            Self::Updating => "updating",
            Self::Rebooting => "rebooting",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states allow a new cycle to overwrite the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States in which an update is actively applying; cancel is refused
    /// and only a complete-report from the owning node may transition out.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Updating | Self::Rebooting)
    }

    /// Polling hint for agents.
    pub fn wait_seconds(&self) -> u64 {
        match self {
            Self::Draining => 30,
            Self::Updating => 10,
            _ => 0,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Requested => "Maintenance requested",
            Self::Draining => "Workloads are draining off the node",
            Self::Ready => "Node is drained; proceed with the update",
            Self::Updating => "Update in progress",
            Self::Rebooting => "Node is rebooting into the new image",
            Self::Verifying => "Verifying the applied version",
            Self::Completed => "Update completed",
            Self::Failed => "Update failed",
            Self::Cancelled => "Maintenance cancelled",
        }
    }
}

/// Kind of update a node is applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Component,
    Full,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Full => "full",
        }
    }
}

impl Default for UpdateKind {
    fn default() -> Self {
        Self::Component
    }
}

/// The per-host record held by the coordinator. Returned by value; callers
/// never hold references into the coordinator's map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMaintenanceInfo {
    pub node_id: String,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draining_started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub total_vms: u32,
    pub migrated_vms: u32,
    pub failed_vms: Vec<String>,
    pub remaining_vms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub update_type: UpdateKind,
    pub requires_reboot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NodeMaintenanceInfo {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            state: NodeState::Requested,
            requested_at: None,
            draining_started_at: None,
            ready_at: None,
            update_started_at: None,
            completed_at: None,
            total_vms: 0,
            migrated_vms: 0,
            failed_vms: Vec::new(),
            remaining_vms: Vec::new(),
            target_version: None,
            update_type: UpdateKind::Component,
            requires_reboot: false,
            error_message: None,
        }
    }
}

/// Body of `POST /maintenance/request`.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceRequest {
    pub node_id: String,
    #[serde(default)]
    pub target_version: Option<String>,
    #[serde(default)]
    pub update_type: UpdateKind,
    #[serde(default)]
    pub requires_reboot: bool,
    #[serde(default)]
    pub force: bool,
}

/// Response contract shared by the request and status endpoints. Every
/// state carries a machine-readable `state`, a human `message`, a polling
/// hint, and `proceed_now` true exactly when the node may start updating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    pub node_id: String,
    pub approved: bool,
    pub state: NodeState,
    pub message: String,
    pub wait_seconds: u64,
    pub proceed_now: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
}

impl MaintenanceResponse {
    /// Shape the response for an observed record state.
    pub fn for_state(info: &NodeMaintenanceInfo, state: NodeState) -> Self {
        let message = match (&info.error_message, state) {
            (Some(error), NodeState::Failed) => error.clone(),
            _ => state.message().to_string(),
        };
        Self {
            node_id: info.node_id.clone(),
            approved: true,
            state,
            message,
            wait_seconds: state.wait_seconds(),
            proceed_now: state == NodeState::Ready,
            target_version: info.target_version.clone(),
        }
    }
}

/// Drain progress callback from the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct DrainProgress {
    pub node_id: String,
    #[serde(default)]
    pub total_vms: u32,
    #[serde(default)]
    pub migrated_vms: u32,
    #[serde(default)]
    pub failed_vms: Vec<String>,
    #[serde(default)]
    pub remaining_vms: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub error: String,
}

/// Update-agent completion report.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteReport {
    pub node_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
