use std::fmt;

use serde::{Deserialize, Serialize};

use super::Label;
use crate::poll::Stateful;

/// Kubernetes cluster state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KubernetesClusterState {
    /// Being created.
    Pending,
    /// Ready.
    Running,
    /// Being upgraded.
    Upgrading,
    /// Being removed.
    Terminating,
    /// Creation failed.
    Failed,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for KubernetesClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Upgrading => "upgrading",
            Self::Terminating => "terminating",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A managed Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    /// Cluster UUID.
    pub uuid: String,
    /// Cluster name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// UUID of the private network the nodes live in.
    pub network: String,
    /// CIDR of that network.
    #[serde(default)]
    pub network_cidr: String,
    /// Plan name.
    pub plan: String,
    /// Kubernetes version.
    #[serde(default)]
    pub version: String,
    /// Whether nodes only get private addresses.
    #[serde(default)]
    pub private_node_groups: bool,
    /// Addresses allowed to reach the control plane.
    #[serde(default)]
    pub control_plane_ip_filter: Vec<String>,
    /// Current state.
    pub state: KubernetesClusterState,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Stateful for KubernetesCluster {
    type State = KubernetesClusterState;

    fn current_state(&self) -> KubernetesClusterState {
        self.state
    }
}

/// Body of a cluster create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateKubernetesClusterRequest {
    /// Cluster name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// UUID of the private network.
    pub network: String,
    /// Plan name.
    pub plan: String,
    /// Kubernetes version, API default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether nodes only get private addresses.
    pub private_node_groups: bool,
    /// Addresses allowed to reach the control plane.
    pub control_plane_ip_filter: Vec<String>,
    /// Labels.
    pub labels: Vec<Label>,
}

/// Body of a cluster modify request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyKubernetesClusterRequest {
    /// New control plane filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_ip_filter: Option<Vec<String>>,
    /// New labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

/// Node group state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeGroupState {
    /// Being created.
    Pending,
    /// Ready.
    Running,
    /// Adding nodes.
    ScalingUp,
    /// Removing nodes.
    ScalingDown,
    /// Being removed.
    Terminating,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NodeGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ScalingUp => "scaling-up",
            Self::ScalingDown => "scaling-down",
            Self::Terminating => "terminating",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A group of identical worker nodes in a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesNodeGroup {
    /// Node group name, unique within the cluster.
    pub name: String,
    /// Number of nodes.
    pub count: i64,
    /// Server plan of each node.
    pub plan: String,
    /// Spread nodes over different hosts.
    #[serde(default)]
    pub anti_affinity: bool,
    /// SSH public keys installed on the nodes.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Current state.
    pub state: NodeGroupState,
    /// Kubernetes node labels.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Stateful for KubernetesNodeGroup {
    type State = NodeGroupState;

    fn current_state(&self) -> NodeGroupState {
        self.state
    }
}

/// Body of a node group create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateNodeGroupRequest {
    /// Node group name.
    pub name: String,
    /// Number of nodes.
    pub count: i64,
    /// Server plan.
    pub plan: String,
    /// Spread nodes over different hosts.
    pub anti_affinity: bool,
    /// SSH public keys.
    pub ssh_keys: Vec<String>,
    /// Node labels.
    pub labels: Vec<Label>,
}

/// Body of a node group modify request. Only the node count can change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyNodeGroupRequest {
    /// New number of nodes.
    pub count: i64,
}
