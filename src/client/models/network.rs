use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Label, UuidRef};
use crate::poll::Stateful;

/// A router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    /// Router UUID.
    pub uuid: String,
    /// Router name.
    pub name: String,
    /// Router type, `normal` or `service`.
    #[serde(rename = "type", default)]
    pub router_type: String,
    /// Networks attached to the router.
    #[serde(default)]
    pub attached_networks: AttachedNetworks,
    /// Static routes.
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    /// Labels.
    #[serde(default)]
    pub labels: LabelList,
}

/// `{"attached_network": [...]}` wrapper of the router API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttachedNetworks {
    /// The attached networks.
    #[serde(default)]
    pub attached_network: Vec<UuidRef>,
}

impl AttachedNetworks {
    /// UUIDs of the attached networks.
    pub fn uuids(&self) -> Vec<String> {
        self.attached_network.iter().map(|n| n.uuid.clone()).collect()
    }
}

/// `{"label": [...]}` wrapper used by the older API endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelList {
    /// The labels.
    #[serde(default)]
    pub label: Vec<Label>,
}

/// A static route on a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Route name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Next hop address.
    pub nexthop: String,
    /// Destination prefix.
    pub route: String,
    /// `user` or `service`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub route_type: String,
}

/// Body of router create and modify requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRequest {
    /// Router name.
    pub name: String,
    /// Static routes.
    pub static_routes: Vec<StaticRoute>,
    /// Labels.
    pub labels: LabelList,
}

/// Network peering state as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPeeringState {
    /// Peering is up.
    Active,
    /// Peering is administratively disabled.
    Disabled,
    /// Waiting for the peer side.
    PendingPeer,
    /// Being set up.
    Provisioning,
    /// The peer side deleted its half.
    DeletedByPeer,
    /// One side has no router attached.
    MissingLocalRouter,
    /// Being removed.
    Deleting,
    /// Setup failed.
    Error,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

impl NetworkPeeringState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::PendingPeer => "pending-peer",
            Self::Provisioning => "provisioning",
            Self::DeletedByPeer => "deleted-by-peer",
            Self::MissingLocalRouter => "missing-local-router",
            Self::Deleting => "deleting",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkPeeringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peering between two private networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPeering {
    /// Peering UUID.
    pub uuid: String,
    /// Peering name.
    pub name: String,
    /// Local network.
    pub network: UuidRef,
    /// Peer network.
    pub peer_network: UuidRef,
    /// `active` or `disabled`.
    pub configured_status: String,
    /// Current state.
    pub state: NetworkPeeringState,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Stateful for NetworkPeering {
    type State = NetworkPeeringState;

    fn current_state(&self) -> NetworkPeeringState {
        self.state
    }
}

/// Body of a network peering create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateNetworkPeeringRequest {
    /// Peering name.
    pub name: String,
    /// Local network.
    pub network: UuidRef,
    /// Peer network.
    pub peer_network: UuidRef,
    /// `active` or `disabled`.
    pub configured_status: String,
    /// Labels.
    pub labels: Vec<Label>,
}

/// Body of a network peering modify request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyNetworkPeeringRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New configured status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_status: Option<String>,
    /// New labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

/// Gateway operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayState {
    /// Being created.
    Pending,
    /// Applying configuration.
    ConfigApplying,
    /// Serving traffic.
    Running,
    /// Configured as stopped.
    Stopped,
    /// Being removed.
    Deleting,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

impl GatewayState {
    /// The settled state of a gateway with the given `configured_status`.
    pub fn settled(configured_status: &str) -> Self {
        if configured_status == "stopped" {
            Self::Stopped
        } else {
            Self::Running
        }
    }
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ConfigApplying => "config-applying",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A public IP address assigned to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAddress {
    /// The IP address.
    pub address: String,
    /// Address name.
    pub name: String,
}

/// A NAT/VPN gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    /// Gateway UUID.
    pub uuid: String,
    /// Gateway name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// Enabled features, e.g. `nat`.
    pub features: Vec<String>,
    /// Plan name.
    #[serde(default)]
    pub plan: String,
    /// `started` or `stopped`.
    pub configured_status: String,
    /// Current state.
    pub operational_state: GatewayState,
    /// Attached routers.
    #[serde(default)]
    pub routers: Vec<UuidRef>,
    /// Public addresses.
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Stateful for Gateway {
    type State = GatewayState;

    fn current_state(&self) -> GatewayState {
        self.operational_state
    }
}

/// Body of a gateway create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGatewayRequest {
    /// Gateway name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// Enabled features.
    pub features: Vec<String>,
    /// Plan name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// `started` or `stopped`.
    pub configured_status: String,
    /// Attached routers.
    pub routers: Vec<UuidRef>,
    /// Labels.
    pub labels: Vec<Label>,
}

/// Body of a gateway modify request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyGatewayRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New configured status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_status: Option<String>,
    /// New labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_state_deserializes() {
        let state: GatewayState = serde_json::from_value(json!("config-applying")).unwrap();
        assert_eq!(state, GatewayState::ConfigApplying);

        let state: GatewayState = serde_json::from_value(json!("stopped")).unwrap();
        assert_eq!(state, GatewayState::settled("stopped"));
        assert_eq!(GatewayState::settled("started"), GatewayState::Running);

        let state: GatewayState = serde_json::from_value(json!("hibernating")).unwrap();
        assert_eq!(state, GatewayState::Unknown);

        let state: NetworkPeeringState = serde_json::from_value(json!("pending-peer")).unwrap();
        assert_eq!(state.to_string(), "pending-peer");
    }

    #[test]
    fn test_modify_request_skips_unset_fields() {
        let body = serde_json::to_value(ModifyGatewayRequest {
            name: Some("gw-2".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"name": "gw-2"}));
    }
}
