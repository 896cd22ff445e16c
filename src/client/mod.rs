//! UpCloud API client.
//!
//! [`CloudApi`] is the boundary between resource adapters and the network.
//! [`HttpClient`] implements it against the public REST API; tests use an
//! in-memory implementation instead.

mod http;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

pub use http::{HttpClient, DEFAULT_BASE_URL};

use async_trait::async_trait;

use crate::error::ProviderError;
use models::*;

/// Result type of API calls.
pub type ApiResult<T> = Result<T, ProviderError>;

/// Typed UpCloud API operations used by the resource adapters.
///
/// Lookups of objects that do not exist fail with
/// [`ProviderError::NotFound`].
#[async_trait]
pub trait CloudApi: Send + Sync {
    // =========================================================================
    // Account
    // =========================================================================

    /// The authenticated account. Used to verify credentials.
    async fn get_account(&self) -> ApiResult<Account>;

    // =========================================================================
    // Networking
    // =========================================================================

    /// Create a router.
    async fn create_router(&self, req: &RouterRequest) -> ApiResult<Router>;
    /// Get a router.
    async fn get_router(&self, uuid: &str) -> ApiResult<Router>;
    /// Replace a router's name, routes and labels.
    async fn modify_router(&self, uuid: &str, req: &RouterRequest) -> ApiResult<Router>;
    /// Delete a router.
    async fn delete_router(&self, uuid: &str) -> ApiResult<()>;

    /// Create a network peering.
    async fn create_network_peering(
        &self,
        req: &CreateNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering>;
    /// Get a network peering.
    async fn get_network_peering(&self, uuid: &str) -> ApiResult<NetworkPeering>;
    /// Modify a network peering.
    async fn modify_network_peering(
        &self,
        uuid: &str,
        req: &ModifyNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering>;
    /// Delete a network peering. It must be disabled first.
    async fn delete_network_peering(&self, uuid: &str) -> ApiResult<()>;

    /// Create a gateway.
    async fn create_gateway(&self, req: &CreateGatewayRequest) -> ApiResult<Gateway>;
    /// Get a gateway.
    async fn get_gateway(&self, uuid: &str) -> ApiResult<Gateway>;
    /// Modify a gateway.
    async fn modify_gateway(&self, uuid: &str, req: &ModifyGatewayRequest) -> ApiResult<Gateway>;
    /// Delete a gateway.
    async fn delete_gateway(&self, uuid: &str) -> ApiResult<()>;

    // =========================================================================
    // Kubernetes
    // =========================================================================

    /// Create a cluster.
    async fn create_kubernetes_cluster(
        &self,
        req: &CreateKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster>;
    /// Get a cluster.
    async fn get_kubernetes_cluster(&self, uuid: &str) -> ApiResult<KubernetesCluster>;
    /// Modify a cluster.
    async fn modify_kubernetes_cluster(
        &self,
        uuid: &str,
        req: &ModifyKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster>;
    /// Delete a cluster.
    async fn delete_kubernetes_cluster(&self, uuid: &str) -> ApiResult<()>;
    /// Kubeconfig YAML of a cluster.
    async fn get_kubeconfig(&self, uuid: &str) -> ApiResult<String>;

    /// Create a node group.
    async fn create_node_group(
        &self,
        cluster: &str,
        req: &CreateNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup>;
    /// Get a node group.
    async fn get_node_group(&self, cluster: &str, name: &str) -> ApiResult<KubernetesNodeGroup>;
    /// Scale a node group.
    async fn modify_node_group(
        &self,
        cluster: &str,
        name: &str,
        req: &ModifyNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup>;
    /// Delete a node group.
    async fn delete_node_group(&self, cluster: &str, name: &str) -> ApiResult<()>;

    // =========================================================================
    // Load balancers
    // =========================================================================

    /// Create a load balancer.
    async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer>;
    /// Get a load balancer.
    async fn get_load_balancer(&self, uuid: &str) -> ApiResult<LoadBalancer>;
    /// Modify a load balancer.
    async fn modify_load_balancer(
        &self,
        uuid: &str,
        req: &ModifyLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer>;
    /// Delete a load balancer.
    async fn delete_load_balancer(&self, uuid: &str) -> ApiResult<()>;
    /// Rename a network attached to a load balancer.
    async fn rename_load_balancer_network(
        &self,
        uuid: &str,
        name: &str,
        new_name: &str,
    ) -> ApiResult<LoadBalancerNetwork>;

    /// Create a backend.
    async fn create_lb_backend(&self, lb: &str, req: &BackendRequest)
        -> ApiResult<LoadBalancerBackend>;
    /// Get a backend.
    async fn get_lb_backend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerBackend>;
    /// Modify a backend, possibly renaming it.
    async fn modify_lb_backend(
        &self,
        lb: &str,
        name: &str,
        req: &BackendRequest,
    ) -> ApiResult<LoadBalancerBackend>;
    /// Delete a backend.
    async fn delete_lb_backend(&self, lb: &str, name: &str) -> ApiResult<()>;

    /// Add a member to a backend.
    async fn create_lb_member(
        &self,
        lb: &str,
        backend: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember>;
    /// Get a backend member.
    async fn get_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerMember>;
    /// Modify a backend member, possibly renaming it.
    async fn modify_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember>;
    /// Remove a backend member.
    async fn delete_lb_member(&self, lb: &str, backend: &str, name: &str) -> ApiResult<()>;

    /// Create a frontend.
    async fn create_lb_frontend(
        &self,
        lb: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend>;
    /// Get a frontend.
    async fn get_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerFrontend>;
    /// Modify a frontend, possibly renaming it.
    async fn modify_lb_frontend(
        &self,
        lb: &str,
        name: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend>;
    /// Delete a frontend.
    async fn delete_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<()>;

    /// Create a frontend rule.
    async fn create_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule>;
    /// Get a frontend rule.
    async fn get_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule>;
    /// Replace a frontend rule, including its matchers and actions.
    async fn replace_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule>;
    /// Delete a frontend rule.
    async fn delete_lb_frontend_rule(&self, lb: &str, frontend: &str, name: &str) -> ApiResult<()>;

    // =========================================================================
    // Object storage
    // =========================================================================

    /// Create an object storage instance.
    async fn create_object_storage(
        &self,
        req: &CreateObjectStorageRequest,
    ) -> ApiResult<ObjectStorage>;
    /// Get an object storage instance.
    async fn get_object_storage(&self, uuid: &str) -> ApiResult<ObjectStorage>;
    /// Modify an object storage instance.
    async fn modify_object_storage(
        &self,
        uuid: &str,
        req: &ModifyObjectStorageRequest,
    ) -> ApiResult<ObjectStorage>;
    /// Delete an object storage instance.
    async fn delete_object_storage(&self, uuid: &str) -> ApiResult<()>;
}
