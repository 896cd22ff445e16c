//! In-memory [`CloudApi`] used by the adapter and provider tests.
//!
//! Objects with an operational state are created in a transitional state and
//! report their settled state after a configurable number of reads.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::models::*;
use super::{ApiResult, CloudApi};
use crate::error::ProviderError;

struct Settling<T> {
    current: T,
    settled: T,
    reads_left: u32,
}

impl<T: Clone> Settling<T> {
    fn new(pending: T, settled: T, reads: u32) -> Self {
        let current = if reads == 0 { settled.clone() } else { pending };
        Self {
            current,
            settled,
            reads_left: reads,
        }
    }

    fn read(&mut self) -> T {
        if self.reads_left == 0 {
            self.current = self.settled.clone();
        } else {
            self.reads_left -= 1;
        }
        self.current.clone()
    }

    /// Apply a modification, then settle after `reads` more reads.
    fn modify(&mut self, reads: u32, pending: impl Fn(&mut T), change: impl Fn(&mut T)) -> T {
        change(&mut self.settled);
        let mut current = self.settled.clone();
        if reads > 0 {
            pending(&mut current);
        }
        self.current = current;
        self.reads_left = reads;
        self.current.clone()
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    rejected_logins: u32,
    calls: Vec<String>,
    routers: BTreeMap<String, Router>,
    peerings: BTreeMap<String, Settling<NetworkPeering>>,
    gateways: BTreeMap<String, Settling<Gateway>>,
    clusters: BTreeMap<String, Settling<KubernetesCluster>>,
    kubeconfigs: BTreeMap<String, String>,
    node_groups: BTreeMap<(String, String), Settling<KubernetesNodeGroup>>,
    load_balancers: BTreeMap<String, Settling<LoadBalancer>>,
    backends: BTreeMap<(String, String), LoadBalancerBackend>,
    members: BTreeMap<(String, String, String), LoadBalancerMember>,
    frontends: BTreeMap<(String, String), LoadBalancerFrontend>,
    rules: BTreeMap<(String, String, String), LoadBalancerFrontendRule>,
    object_storages: BTreeMap<String, ObjectStorage>,
    object_storage_keys: BTreeMap<String, (String, String)>,
}

impl Inner {
    fn uuid(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    fn record(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }
}

/// In-memory UpCloud.
pub(crate) struct FakeCloud {
    ready_after: u32,
    inner: Mutex<Inner>,
}

fn not_found(what: &str, key: &str) -> ProviderError {
    ProviderError::NotFound(format!("{} {} does not exist", what, key))
}

fn conflict(what: &str, key: &str) -> ProviderError {
    ProviderError::AlreadyExists(format!("{} {} already exists", what, key))
}

fn key2(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

fn key3(a: &str, b: &str, c: &str) -> (String, String, String) {
    (a.to_string(), b.to_string(), c.to_string())
}

impl FakeCloud {
    /// Objects settle on the first read.
    pub(crate) fn new() -> Self {
        Self::with_ready_after(0)
    }

    /// Objects report a transitional state for `reads` reads after each
    /// create or modify.
    pub(crate) fn with_ready_after(reads: u32) -> Self {
        Self {
            ready_after: reads,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Answer the next `count` account lookups with `PermissionDenied`.
    pub(crate) fn reject_logins(&self, count: u32) {
        self.inner.lock().unwrap().rejected_logins = count;
    }

    /// Mutating calls made so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Set the kubeconfig returned for a cluster.
    pub(crate) fn set_kubeconfig(&self, cluster: &str, kubeconfig: &str) {
        self.inner
            .lock()
            .unwrap()
            .kubeconfigs
            .insert(cluster.to_string(), kubeconfig.to_string());
    }

    /// Keys an object storage instance was last given.
    pub(crate) fn object_storage_keys(&self, uuid: &str) -> Option<(String, String)> {
        self.inner
            .lock()
            .unwrap()
            .object_storage_keys
            .get(uuid)
            .cloned()
    }

    /// Remove a gateway behind the provider's back.
    pub(crate) fn forget_gateway(&self, uuid: &str) {
        self.inner.lock().unwrap().gateways.remove(uuid);
    }
}

fn peering_state(configured_status: &str) -> NetworkPeeringState {
    if configured_status == "disabled" {
        NetworkPeeringState::Disabled
    } else {
        NetworkPeeringState::Active
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn get_account(&self) -> ApiResult<Account> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rejected_logins > 0 {
            inner.rejected_logins -= 1;
            return Err(ProviderError::PermissionDenied(
                "Authentication failed using the given username and password.".into(),
            ));
        }
        Ok(Account {
            username: "tester".into(),
            credits: 1000.0,
        })
    }

    async fn create_router(&self, req: &RouterRequest) -> ApiResult<Router> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("router");
        inner.record(format!("create_router {}", req.name));
        let router = Router {
            uuid: uuid.clone(),
            name: req.name.clone(),
            router_type: "normal".into(),
            attached_networks: AttachedNetworks::default(),
            static_routes: req
                .static_routes
                .iter()
                .cloned()
                .map(|mut r| {
                    if r.route_type.is_empty() {
                        r.route_type = "user".into();
                    }
                    r
                })
                .collect(),
            labels: req.labels.clone(),
        };
        inner.routers.insert(uuid, router.clone());
        Ok(router)
    }

    async fn get_router(&self, uuid: &str) -> ApiResult<Router> {
        let inner = self.inner.lock().unwrap();
        inner
            .routers
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("router", uuid))
    }

    async fn modify_router(&self, uuid: &str, req: &RouterRequest) -> ApiResult<Router> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_router {}", uuid));
        let router = inner
            .routers
            .get_mut(uuid)
            .ok_or_else(|| not_found("router", uuid))?;
        router.name = req.name.clone();
        router.static_routes = req.static_routes.clone();
        router.labels = req.labels.clone();
        Ok(router.clone())
    }

    async fn delete_router(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_router {}", uuid));
        inner
            .routers
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("router", uuid))
    }

    async fn create_network_peering(
        &self,
        req: &CreateNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("peering");
        inner.record(format!("create_network_peering {}", req.name));
        let settled = NetworkPeering {
            uuid: uuid.clone(),
            name: req.name.clone(),
            network: req.network.clone(),
            peer_network: req.peer_network.clone(),
            configured_status: req.configured_status.clone(),
            state: peering_state(&req.configured_status),
            labels: req.labels.clone(),
        };
        let mut pending = settled.clone();
        pending.state = NetworkPeeringState::Provisioning;
        let entry = Settling::new(pending, settled, self.ready_after);
        let created = entry.current.clone();
        inner.peerings.insert(uuid, entry);
        Ok(created)
    }

    async fn get_network_peering(&self, uuid: &str) -> ApiResult<NetworkPeering> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .peerings
            .get_mut(uuid)
            .map(Settling::read)
            .ok_or_else(|| not_found("network peering", uuid))
    }

    async fn modify_network_peering(
        &self,
        uuid: &str,
        req: &ModifyNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_network_peering {}", uuid));
        let entry = inner
            .peerings
            .get_mut(uuid)
            .ok_or_else(|| not_found("network peering", uuid))?;
        Ok(entry.modify(
            self.ready_after,
            |p| p.state = NetworkPeeringState::Provisioning,
            |p| {
                if let Some(name) = &req.name {
                    p.name = name.clone();
                }
                if let Some(status) = &req.configured_status {
                    p.configured_status = status.clone();
                    p.state = peering_state(status);
                }
                if let Some(labels) = &req.labels {
                    p.labels = labels.clone();
                }
            },
        ))
    }

    async fn delete_network_peering(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_network_peering {}", uuid));
        let entry = inner
            .peerings
            .get(uuid)
            .ok_or_else(|| not_found("network peering", uuid))?;
        if entry.current.state != NetworkPeeringState::Disabled {
            return Err(ProviderError::api(
                409,
                "Network peering must be disabled before deletion.",
            ));
        }
        inner.peerings.remove(uuid);
        Ok(())
    }

    async fn create_gateway(&self, req: &CreateGatewayRequest) -> ApiResult<Gateway> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("gateway");
        inner.record(format!("create_gateway {}", req.name));
        let settled = Gateway {
            uuid: uuid.clone(),
            name: req.name.clone(),
            zone: req.zone.clone(),
            features: req.features.clone(),
            plan: req.plan.clone().unwrap_or_else(|| "development".into()),
            configured_status: req.configured_status.clone(),
            operational_state: GatewayState::settled(&req.configured_status),
            routers: req.routers.clone(),
            addresses: vec![GatewayAddress {
                address: "192.0.2.10".into(),
                name: "public-ip-1".into(),
            }],
            labels: req.labels.clone(),
        };
        let mut pending = settled.clone();
        pending.operational_state = GatewayState::Pending;
        let entry = Settling::new(pending, settled, self.ready_after);
        let created = entry.current.clone();
        inner.gateways.insert(uuid, entry);
        Ok(created)
    }

    async fn get_gateway(&self, uuid: &str) -> ApiResult<Gateway> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .gateways
            .get_mut(uuid)
            .map(Settling::read)
            .ok_or_else(|| not_found("gateway", uuid))
    }

    async fn modify_gateway(&self, uuid: &str, req: &ModifyGatewayRequest) -> ApiResult<Gateway> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_gateway {}", uuid));
        let entry = inner
            .gateways
            .get_mut(uuid)
            .ok_or_else(|| not_found("gateway", uuid))?;
        Ok(entry.modify(
            self.ready_after,
            |g| g.operational_state = GatewayState::ConfigApplying,
            |g| {
                if let Some(name) = &req.name {
                    g.name = name.clone();
                }
                if let Some(status) = &req.configured_status {
                    g.configured_status = status.clone();
                    g.operational_state = GatewayState::settled(status);
                }
                if let Some(labels) = &req.labels {
                    g.labels = labels.clone();
                }
            },
        ))
    }

    async fn delete_gateway(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_gateway {}", uuid));
        inner
            .gateways
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("gateway", uuid))
    }

    async fn create_kubernetes_cluster(
        &self,
        req: &CreateKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("cluster");
        inner.record(format!("create_kubernetes_cluster {}", req.name));
        let settled = KubernetesCluster {
            uuid: uuid.clone(),
            name: req.name.clone(),
            zone: req.zone.clone(),
            network: req.network.clone(),
            network_cidr: "172.16.1.0/24".into(),
            plan: req.plan.clone(),
            version: req.version.clone().unwrap_or_else(|| "1.30".into()),
            private_node_groups: req.private_node_groups,
            control_plane_ip_filter: req.control_plane_ip_filter.clone(),
            state: KubernetesClusterState::Running,
            labels: req.labels.clone(),
        };
        let mut pending = settled.clone();
        pending.state = KubernetesClusterState::Pending;
        let entry = Settling::new(pending, settled, self.ready_after);
        let created = entry.current.clone();
        inner.clusters.insert(uuid, entry);
        Ok(created)
    }

    async fn get_kubernetes_cluster(&self, uuid: &str) -> ApiResult<KubernetesCluster> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .clusters
            .get_mut(uuid)
            .map(Settling::read)
            .ok_or_else(|| not_found("kubernetes cluster", uuid))
    }

    async fn modify_kubernetes_cluster(
        &self,
        uuid: &str,
        req: &ModifyKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_kubernetes_cluster {}", uuid));
        let entry = inner
            .clusters
            .get_mut(uuid)
            .ok_or_else(|| not_found("kubernetes cluster", uuid))?;
        Ok(entry.modify(
            self.ready_after,
            |c| c.state = KubernetesClusterState::Pending,
            |c| {
                if let Some(filter) = &req.control_plane_ip_filter {
                    c.control_plane_ip_filter = filter.clone();
                }
                if let Some(labels) = &req.labels {
                    c.labels = labels.clone();
                }
            },
        ))
    }

    async fn delete_kubernetes_cluster(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_kubernetes_cluster {}", uuid));
        inner
            .clusters
            .remove(uuid)
            .ok_or_else(|| not_found("kubernetes cluster", uuid))?;
        inner.node_groups.retain(|(cluster, _), _| cluster != uuid);
        inner.kubeconfigs.remove(uuid);
        Ok(())
    }

    async fn get_kubeconfig(&self, uuid: &str) -> ApiResult<String> {
        let inner = self.inner.lock().unwrap();
        if !inner.clusters.contains_key(uuid) {
            return Err(not_found("kubernetes cluster", uuid));
        }
        inner
            .kubeconfigs
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("kubeconfig of cluster", uuid))
    }

    async fn create_node_group(
        &self,
        cluster: &str,
        req: &CreateNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("create_node_group {} {}", cluster, req.name));
        if !inner.clusters.contains_key(cluster) {
            return Err(not_found("kubernetes cluster", cluster));
        }
        let key = key2(cluster, &req.name);
        if inner.node_groups.contains_key(&key) {
            return Err(conflict("node group", &req.name));
        }
        let settled = KubernetesNodeGroup {
            name: req.name.clone(),
            count: req.count,
            plan: req.plan.clone(),
            anti_affinity: req.anti_affinity,
            ssh_keys: req.ssh_keys.clone(),
            state: NodeGroupState::Running,
            labels: req.labels.clone(),
        };
        let mut pending = settled.clone();
        pending.state = NodeGroupState::Pending;
        let entry = Settling::new(pending, settled, self.ready_after);
        let created = entry.current.clone();
        inner.node_groups.insert(key, entry);
        Ok(created)
    }

    async fn get_node_group(&self, cluster: &str, name: &str) -> ApiResult<KubernetesNodeGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .node_groups
            .get_mut(&key2(cluster, name))
            .map(Settling::read)
            .ok_or_else(|| not_found("node group", name))
    }

    async fn modify_node_group(
        &self,
        cluster: &str,
        name: &str,
        req: &ModifyNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_node_group {} {} {}", cluster, name, req.count));
        let entry = inner
            .node_groups
            .get_mut(&key2(cluster, name))
            .ok_or_else(|| not_found("node group", name))?;
        let scaling = if req.count >= entry.settled.count {
            NodeGroupState::ScalingUp
        } else {
            NodeGroupState::ScalingDown
        };
        Ok(entry.modify(
            self.ready_after,
            |g| g.state = scaling,
            |g| g.count = req.count,
        ))
    }

    async fn delete_node_group(&self, cluster: &str, name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_node_group {} {}", cluster, name));
        inner
            .node_groups
            .remove(&key2(cluster, name))
            .map(|_| ())
            .ok_or_else(|| not_found("node group", name))
    }

    async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("lb");
        inner.record(format!("create_load_balancer {}", req.name));
        let networks = req
            .networks
            .iter()
            .cloned()
            .map(|mut n| {
                if n.network_type == "public" {
                    n.dns_name = format!("{}-{}.upcloudlb.com", req.name, n.name);
                }
                n
            })
            .collect();
        let settled = LoadBalancer {
            uuid: uuid.clone(),
            name: req.name.clone(),
            zone: req.zone.clone(),
            plan: req.plan.clone(),
            configured_status: req.configured_status.clone(),
            operational_state: LoadBalancerState::settled(&req.configured_status),
            networks,
            maintenance_dow: req.maintenance_dow.clone().unwrap_or_else(|| "sunday".into()),
            maintenance_time: req
                .maintenance_time
                .clone()
                .unwrap_or_else(|| "20:01:01Z".into()),
            labels: req.labels.clone(),
        };
        let mut pending = settled.clone();
        pending.operational_state = LoadBalancerState::Pending;
        let entry = Settling::new(pending, settled, self.ready_after);
        let created = entry.current.clone();
        inner.load_balancers.insert(uuid, entry);
        Ok(created)
    }

    async fn get_load_balancer(&self, uuid: &str) -> ApiResult<LoadBalancer> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .load_balancers
            .get_mut(uuid)
            .map(Settling::read)
            .ok_or_else(|| not_found("load balancer", uuid))
    }

    async fn modify_load_balancer(
        &self,
        uuid: &str,
        req: &ModifyLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_load_balancer {}", uuid));
        let entry = inner
            .load_balancers
            .get_mut(uuid)
            .ok_or_else(|| not_found("load balancer", uuid))?;
        Ok(entry.modify(
            self.ready_after,
            |lb| lb.operational_state = LoadBalancerState::SetupLb,
            |lb| {
                if let Some(name) = &req.name {
                    lb.name = name.clone();
                }
                if let Some(plan) = &req.plan {
                    lb.plan = plan.clone();
                }
                if let Some(status) = &req.configured_status {
                    lb.configured_status = status.clone();
                    lb.operational_state = LoadBalancerState::settled(status);
                }
                if let Some(dow) = &req.maintenance_dow {
                    lb.maintenance_dow = dow.clone();
                }
                if let Some(time) = &req.maintenance_time {
                    lb.maintenance_time = time.clone();
                }
                if let Some(labels) = &req.labels {
                    lb.labels = labels.clone();
                }
            },
        ))
    }

    async fn delete_load_balancer(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_load_balancer {}", uuid));
        inner
            .load_balancers
            .remove(uuid)
            .ok_or_else(|| not_found("load balancer", uuid))?;
        inner.backends.retain(|(lb, _), _| lb != uuid);
        inner.members.retain(|(lb, _, _), _| lb != uuid);
        inner.frontends.retain(|(lb, _), _| lb != uuid);
        inner.rules.retain(|(lb, _, _), _| lb != uuid);
        Ok(())
    }

    async fn rename_load_balancer_network(
        &self,
        uuid: &str,
        name: &str,
        new_name: &str,
    ) -> ApiResult<LoadBalancerNetwork> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!(
            "rename_load_balancer_network {} {} {}",
            uuid, name, new_name
        ));
        let entry = inner
            .load_balancers
            .get_mut(uuid)
            .ok_or_else(|| not_found("load balancer", uuid))?;
        let mut renamed = None;
        for lb in [&mut entry.current, &mut entry.settled] {
            if let Some(network) = lb.networks.iter_mut().find(|n| n.name == name) {
                network.name = new_name.to_string();
                renamed = Some(network.clone());
            }
        }
        renamed.ok_or_else(|| not_found("load balancer network", name))
    }

    async fn create_lb_backend(
        &self,
        lb: &str,
        req: &BackendRequest,
    ) -> ApiResult<LoadBalancerBackend> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("create_lb_backend {} {}", lb, req.name));
        if !inner.load_balancers.contains_key(lb) {
            return Err(not_found("load balancer", lb));
        }
        let key = key2(lb, &req.name);
        if inner.backends.contains_key(&key) {
            return Err(conflict("backend", &req.name));
        }
        let backend = LoadBalancerBackend {
            name: req.name.clone(),
            resolver: req.resolver.clone(),
            properties: req.properties.clone(),
            members: Vec::new(),
        };
        inner.backends.insert(key, backend.clone());
        Ok(backend)
    }

    async fn get_lb_backend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerBackend> {
        let inner = self.inner.lock().unwrap();
        let mut backend = inner
            .backends
            .get(&key2(lb, name))
            .cloned()
            .ok_or_else(|| not_found("backend", name))?;
        backend.members = inner
            .members
            .iter()
            .filter(|((l, b, _), _)| l == lb && b == name)
            .map(|(_, m)| m.clone())
            .collect();
        Ok(backend)
    }

    async fn modify_lb_backend(
        &self,
        lb: &str,
        name: &str,
        req: &BackendRequest,
    ) -> ApiResult<LoadBalancerBackend> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_lb_backend {} {} {}", lb, name, req.name));
        let mut backend = inner
            .backends
            .remove(&key2(lb, name))
            .ok_or_else(|| not_found("backend", name))?;
        backend.name = req.name.clone();
        backend.resolver = req.resolver.clone();
        backend.properties = req.properties.clone();
        inner.backends.insert(key2(lb, &req.name), backend.clone());

        if req.name != name {
            let moved: Vec<_> = inner
                .members
                .keys()
                .filter(|(l, b, _)| l == lb && b == name)
                .cloned()
                .collect();
            for key in moved {
                if let Some(member) = inner.members.remove(&key) {
                    inner.members.insert(key3(lb, &req.name, &key.2), member);
                }
            }
        }
        Ok(backend)
    }

    async fn delete_lb_backend(&self, lb: &str, name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_lb_backend {} {}", lb, name));
        inner
            .backends
            .remove(&key2(lb, name))
            .ok_or_else(|| not_found("backend", name))?;
        inner.members.retain(|(l, b, _), _| !(l == lb && b == name));
        Ok(())
    }

    async fn create_lb_member(
        &self,
        lb: &str,
        backend: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("create_lb_member {} {} {}", lb, backend, member.name));
        if !inner.backends.contains_key(&key2(lb, backend)) {
            return Err(not_found("backend", backend));
        }
        let key = key3(lb, backend, &member.name);
        if inner.members.contains_key(&key) {
            return Err(conflict("member", &member.name));
        }
        inner.members.insert(key, member.clone());
        Ok(member.clone())
    }

    async fn get_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerMember> {
        let inner = self.inner.lock().unwrap();
        inner
            .members
            .get(&key3(lb, backend, name))
            .cloned()
            .ok_or_else(|| not_found("member", name))
    }

    async fn modify_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!(
            "modify_lb_member {} {} {} {}",
            lb, backend, name, member.name
        ));
        inner
            .members
            .remove(&key3(lb, backend, name))
            .ok_or_else(|| not_found("member", name))?;
        inner
            .members
            .insert(key3(lb, backend, &member.name), member.clone());
        Ok(member.clone())
    }

    async fn delete_lb_member(&self, lb: &str, backend: &str, name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_lb_member {} {} {}", lb, backend, name));
        inner
            .members
            .remove(&key3(lb, backend, name))
            .map(|_| ())
            .ok_or_else(|| not_found("member", name))
    }

    async fn create_lb_frontend(
        &self,
        lb: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("create_lb_frontend {} {}", lb, frontend.name));
        if !inner.load_balancers.contains_key(lb) {
            return Err(not_found("load balancer", lb));
        }
        if !inner.backends.contains_key(&key2(lb, &frontend.default_backend)) {
            return Err(ProviderError::api(
                422,
                format!("backend {} does not exist", frontend.default_backend),
            ));
        }
        let key = key2(lb, &frontend.name);
        if inner.frontends.contains_key(&key) {
            return Err(conflict("frontend", &frontend.name));
        }
        inner.frontends.insert(key, frontend.clone());
        Ok(frontend.clone())
    }

    async fn get_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerFrontend> {
        let inner = self.inner.lock().unwrap();
        inner
            .frontends
            .get(&key2(lb, name))
            .cloned()
            .ok_or_else(|| not_found("frontend", name))
    }

    async fn modify_lb_frontend(
        &self,
        lb: &str,
        name: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_lb_frontend {} {} {}", lb, name, frontend.name));
        inner
            .frontends
            .remove(&key2(lb, name))
            .ok_or_else(|| not_found("frontend", name))?;
        inner
            .frontends
            .insert(key2(lb, &frontend.name), frontend.clone());

        if frontend.name != name {
            let moved: Vec<_> = inner
                .rules
                .keys()
                .filter(|(l, f, _)| l == lb && f == name)
                .cloned()
                .collect();
            for key in moved {
                if let Some(rule) = inner.rules.remove(&key) {
                    inner.rules.insert(key3(lb, &frontend.name, &key.2), rule);
                }
            }
        }
        Ok(frontend.clone())
    }

    async fn delete_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_lb_frontend {} {}", lb, name));
        inner
            .frontends
            .remove(&key2(lb, name))
            .ok_or_else(|| not_found("frontend", name))?;
        inner.rules.retain(|(l, f, _), _| !(l == lb && f == name));
        Ok(())
    }

    async fn create_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!(
            "create_lb_frontend_rule {} {} {}",
            lb, frontend, rule.name
        ));
        if !inner.frontends.contains_key(&key2(lb, frontend)) {
            return Err(not_found("frontend", frontend));
        }
        let key = key3(lb, frontend, &rule.name);
        if inner.rules.contains_key(&key) {
            return Err(conflict("rule", &rule.name));
        }
        inner.rules.insert(key, rule.clone());
        Ok(rule.clone())
    }

    async fn get_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let inner = self.inner.lock().unwrap();
        inner
            .rules
            .get(&key3(lb, frontend, name))
            .cloned()
            .ok_or_else(|| not_found("rule", name))
    }

    async fn replace_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!(
            "replace_lb_frontend_rule {} {} {} {}",
            lb, frontend, name, rule.name
        ));
        inner
            .rules
            .remove(&key3(lb, frontend, name))
            .ok_or_else(|| not_found("rule", name))?;
        inner
            .rules
            .insert(key3(lb, frontend, &rule.name), rule.clone());
        Ok(rule.clone())
    }

    async fn delete_lb_frontend_rule(&self, lb: &str, frontend: &str, name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_lb_frontend_rule {} {} {}", lb, frontend, name));
        inner
            .rules
            .remove(&key3(lb, frontend, name))
            .map(|_| ())
            .ok_or_else(|| not_found("rule", name))
    }

    async fn create_object_storage(
        &self,
        req: &CreateObjectStorageRequest,
    ) -> ApiResult<ObjectStorage> {
        let mut inner = self.inner.lock().unwrap();
        let uuid = inner.uuid("storage");
        inner.record(format!("create_object_storage {}", req.name));
        let storage = ObjectStorage {
            uuid: uuid.clone(),
            name: req.name.clone(),
            description: req.description.clone(),
            zone: req.zone.clone(),
            size: req.size,
            state: "started".into(),
            url: format!("https://{}.{}.upcloudobjects.com/", req.name, req.zone),
            created: "2024-01-01T00:00:00Z".into(),
        };
        inner.object_storage_keys.insert(
            uuid.clone(),
            (req.access_key.clone(), req.secret_key.clone()),
        );
        inner.object_storages.insert(uuid, storage.clone());
        Ok(storage)
    }

    async fn get_object_storage(&self, uuid: &str) -> ApiResult<ObjectStorage> {
        let inner = self.inner.lock().unwrap();
        inner
            .object_storages
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("object storage", uuid))
    }

    async fn modify_object_storage(
        &self,
        uuid: &str,
        req: &ModifyObjectStorageRequest,
    ) -> ApiResult<ObjectStorage> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("modify_object_storage {}", uuid));
        let storage = inner
            .object_storages
            .get_mut(uuid)
            .ok_or_else(|| not_found("object storage", uuid))?;
        if let Some(description) = &req.description {
            storage.description = description.clone();
        }
        if let Some(size) = req.size {
            storage.size = size;
        }
        let storage = storage.clone();
        if let (Some(access), Some(secret)) = (&req.access_key, &req.secret_key) {
            inner
                .object_storage_keys
                .insert(uuid.to_string(), (access.clone(), secret.clone()));
        }
        Ok(storage)
    }

    async fn delete_object_storage(&self, uuid: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(format!("delete_object_storage {}", uuid));
        inner.object_storage_keys.remove(uuid);
        inner
            .object_storages
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("object storage", uuid))
    }
}
