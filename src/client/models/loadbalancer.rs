use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Label, RuleAction, RuleMatcher};
use crate::poll::Stateful;

/// Load balancer operational state.
///
/// A new load balancer walks through the `setup-*` states before it is
/// `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancerState {
    /// Accepted, not started.
    Pending,
    /// Installing the agent.
    SetupAgent,
    /// Creating servers.
    SetupServer,
    /// Wiring networks.
    SetupNetwork,
    /// Configuring the proxy.
    SetupLb,
    /// Publishing DNS.
    SetupDns,
    /// Final checks.
    Checkup,
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

impl LoadBalancerState {
    /// The settled state of a load balancer with the given
    /// `configured_status`.
    pub fn settled(configured_status: &str) -> Self {
        if configured_status == "stopped" {
            Self::Stopped
        } else {
            Self::Running
        }
    }
}

impl fmt::Display for LoadBalancerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::SetupAgent => "setup-agent",
            Self::SetupServer => "setup-server",
            Self::SetupNetwork => "setup-network",
            Self::SetupLb => "setup-lb",
            Self::SetupDns => "setup-dns",
            Self::Checkup => "checkup",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A network attached to a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerNetwork {
    /// Name, referenced by frontends.
    pub name: String,
    /// `public` or `private`.
    #[serde(rename = "type")]
    pub network_type: String,
    /// Address family, `IPv4`.
    pub family: String,
    /// UUID of the private network. Empty for public networks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// DNS name assigned by the platform.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_name: String,
}

/// A managed load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Load balancer UUID.
    pub uuid: String,
    /// Name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// Plan name.
    pub plan: String,
    /// `started` or `stopped`.
    pub configured_status: String,
    /// Current state.
    pub operational_state: LoadBalancerState,
    /// Attached networks.
    #[serde(default)]
    pub networks: Vec<LoadBalancerNetwork>,
    /// Maintenance day of week.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub maintenance_dow: String,
    /// Maintenance time, `HH:MM:SSZ`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub maintenance_time: String,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Stateful for LoadBalancer {
    type State = LoadBalancerState;

    fn current_state(&self) -> LoadBalancerState {
        self.operational_state
    }
}

/// Body of a load balancer create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLoadBalancerRequest {
    /// Name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// Plan name.
    pub plan: String,
    /// `started` or `stopped`.
    pub configured_status: String,
    /// Networks to attach.
    pub networks: Vec<LoadBalancerNetwork>,
    /// Maintenance day of week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_dow: Option<String>,
    /// Maintenance time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_time: Option<String>,
    /// Labels.
    pub labels: Vec<Label>,
}

/// Body of a load balancer modify request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyLoadBalancerRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// New configured status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_status: Option<String>,
    /// New maintenance day of week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_dow: Option<String>,
    /// New maintenance time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_time: Option<String>,
    /// New labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

impl ModifyLoadBalancerRequest {
    /// Whether the request changes anything.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Tunables of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendProperties {
    /// Server inactivity timeout, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_server: Option<i64>,
    /// Tunnel inactivity timeout, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_tunnel: Option<i64>,
    /// `tcp` or `http`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_type: Option<String>,
    /// Seconds between health checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<i64>,
    /// Path of an HTTP health check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    /// Expected HTTP status of a health check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_expected_status: Option<i64>,
    /// `v1`, `v2` or empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_proxy_protocol: Option<String>,
}

/// Kind of a backend member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    /// Fixed IP and port.
    Static,
    /// Address filled in at runtime, e.g. by service discovery.
    Dynamic,
}

/// A member of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerMember {
    /// Member name, unique within the backend.
    pub name: String,
    /// Static or dynamic.
    #[serde(rename = "type")]
    pub member_type: MemberType,
    /// Relative weight.
    pub weight: i64,
    /// Session limit.
    pub max_sessions: i64,
    /// Whether traffic is sent to the member.
    pub enabled: bool,
    /// Only used when all other members are down.
    #[serde(default)]
    pub backup: bool,
    /// Member address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Member port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

/// A backend, the target of frontends and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerBackend {
    /// Backend name, unique within the load balancer.
    pub name: String,
    /// Name of a DNS resolver used for dynamic members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    /// Tunables.
    #[serde(default)]
    pub properties: BackendProperties,
    /// Members, managed by their own resources.
    #[serde(default)]
    pub members: Vec<LoadBalancerMember>,
}

/// Body of backend create and modify requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Backend name. A changed name renames the backend.
    pub name: String,
    /// DNS resolver name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    /// Tunables.
    pub properties: BackendProperties,
}

/// Tunables of a frontend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrontendProperties {
    /// Client inactivity timeout, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_client: Option<i64>,
    /// Expect the PROXY protocol from clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_proxy_protocol: Option<bool>,
    /// Offer HTTP/2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2_enabled: Option<bool>,
}

/// Reference from a frontend to a load balancer network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendNetwork {
    /// Network name.
    pub name: String,
}

/// A frontend: a listening port and its default backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerFrontend {
    /// Frontend name, unique within the load balancer.
    pub name: String,
    /// `http` or `tcp`.
    pub mode: String,
    /// Listening port.
    pub port: i64,
    /// Backend used when no rule matches.
    pub default_backend: String,
    /// Networks the frontend listens on.
    #[serde(default)]
    pub networks: Vec<FrontendNetwork>,
    /// Tunables.
    #[serde(default)]
    pub properties: FrontendProperties,
}

/// A frontend rule: when matchers match, run actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerFrontendRule {
    /// Rule name, unique within the frontend.
    pub name: String,
    /// Evaluation order, higher first.
    pub priority: i64,
    /// `and` or `or`.
    #[serde(default = "default_matching_condition")]
    pub matching_condition: String,
    /// Conditions.
    #[serde(default)]
    pub matchers: Vec<RuleMatcher>,
    /// Actions.
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

fn default_matching_condition() -> String {
    "and".to_string()
}
