use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{
    child_id, decode_state, encode_state, found, id_component_diagnostics, parse_id, Resource,
    Session, STATE_POLL,
};
use crate::client::models::{
    labels_from_map, labels_to_map, CreateKubernetesClusterRequest, CreateNodeGroupRequest,
    KubernetesCluster, KubernetesClusterState, KubernetesNodeGroup,
    ModifyKubernetesClusterRequest, ModifyNodeGroupRequest, NodeGroupState,
};
use crate::error::ProviderError;
use crate::id::marshal_id;
use crate::poll::{wait_for_state, wait_until_deleted};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::validation;

fn string_set(flags: AttributeFlags) -> Attribute {
    Attribute::new(AttributeType::set(AttributeType::String), flags)
}

/// `upcloud_kubernetes_cluster`: a managed Kubernetes control plane.
pub struct KubernetesClusterResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ClusterModel {
    id: String,
    name: String,
    zone: String,
    network: String,
    network_cidr: String,
    plan: String,
    version: String,
    private_node_groups: bool,
    control_plane_ip_filter: Vec<String>,
    state: String,
    labels: BTreeMap<String, String>,
}

impl ClusterModel {
    fn from_api(cluster: &KubernetesCluster) -> Self {
        Self {
            id: cluster.uuid.clone(),
            name: cluster.name.clone(),
            zone: cluster.zone.clone(),
            network: cluster.network.clone(),
            network_cidr: cluster.network_cidr.clone(),
            plan: cluster.plan.clone(),
            version: cluster.version.clone(),
            private_node_groups: cluster.private_node_groups,
            control_plane_ip_filter: cluster.control_plane_ip_filter.clone(),
            state: cluster.state.to_string(),
            labels: labels_to_map(&cluster.labels),
        }
    }
}

async fn wait_cluster_running(
    session: &Session,
    uuid: &str,
) -> Result<KubernetesCluster, ProviderError> {
    let target = format!("kubernetes cluster {}", uuid);
    wait_for_state(
        &session.cancel,
        session.poll_policy(STATE_POLL),
        &target,
        KubernetesClusterState::Running,
        || session.api.get_kubernetes_cluster(uuid),
    )
    .await
}

#[async_trait]
impl Resource for KubernetesClusterResource {
    fn type_name(&self) -> &'static str {
        "upcloud_kubernetes_cluster"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A managed Kubernetes cluster. Worker nodes are added with node groups.")
            .with_id("UUID of the cluster.")
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("zone", Attribute::required_string().with_force_new())
            .with_attribute(
                "network",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("UUID of the private network the nodes are attached to."),
            )
            .with_attribute("network_cidr", Attribute::computed_string())
            .with_attribute(
                "plan",
                Attribute::optional_string()
                    .with_default(Value::from("development"))
                    .with_force_new(),
            )
            .with_attribute(
                "version",
                Attribute::optional_computed_string()
                    .with_force_new()
                    .with_description("Kubernetes version. Defaults to the latest supported one."),
            )
            .with_attribute(
                "private_node_groups",
                Attribute::optional_bool()
                    .with_default(Value::Bool(false))
                    .with_force_new(),
            )
            .with_attribute(
                "control_plane_ip_filter",
                string_set(AttributeFlags::required()).with_description(
                    "IP addresses or ranges allowed to reach the control plane. `0.0.0.0/0` allows everyone.",
                ),
            )
            .with_attribute("state", Attribute::computed_string())
            .with_attribute("labels", Attribute::optional_labels())
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: ClusterModel = decode_state(planned)?;
        let req = CreateKubernetesClusterRequest {
            name: model.name.clone(),
            zone: model.zone.clone(),
            network: model.network.clone(),
            plan: model.plan.clone(),
            version: Some(model.version.clone()).filter(|v| !v.is_empty()),
            private_node_groups: model.private_node_groups,
            control_plane_ip_filter: model.control_plane_ip_filter.clone(),
            labels: labels_from_map(&model.labels),
        };
        let cluster = session.api.create_kubernetes_cluster(&req).await?;
        info!(uuid = %cluster.uuid, "kubernetes cluster created, waiting for it to run");

        let cluster = wait_cluster_running(session, &cluster.uuid).await?;
        encode_state(&ClusterModel::from_api(&cluster))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: ClusterModel = decode_state(state)?;
        let cluster = found(
            session.api.get_kubernetes_cluster(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        cluster
            .map(|c| encode_state(&ClusterModel::from_api(&c)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ClusterModel = decode_state(prior)?;
        let planned: ClusterModel = decode_state(planned)?;

        let req = ModifyKubernetesClusterRequest {
            control_plane_ip_filter: Some(planned.control_plane_ip_filter.clone()),
            labels: Some(labels_from_map(&planned.labels)),
        };
        session.api.modify_kubernetes_cluster(&prior.id, &req).await?;

        let cluster = wait_cluster_running(session, &prior.id).await?;
        encode_state(&ClusterModel::from_api(&cluster))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: ClusterModel = decode_state(state)?;
        session.api.delete_kubernetes_cluster(&model.id).await?;

        let target = format!("kubernetes cluster {}", model.id);
        wait_until_deleted(
            &session.cancel,
            session.poll_policy(STATE_POLL),
            &target,
            || session.api.get_kubernetes_cluster(&model.id),
        )
        .await
    }
}

/// `upcloud_kubernetes_node_group`: worker nodes of a cluster.
///
/// ID: `<cluster uuid>/<node group name>`.
pub struct KubernetesNodeGroupResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct NodeGroupModel {
    id: String,
    cluster: String,
    name: String,
    node_count: i64,
    plan: String,
    anti_affinity: bool,
    ssh_keys: Vec<String>,
    labels: BTreeMap<String, String>,
    state: String,
}

impl NodeGroupModel {
    fn from_api(cluster: &str, group: &KubernetesNodeGroup) -> Result<Self, ProviderError> {
        Ok(Self {
            id: marshal_id(&[cluster, &group.name])?,
            cluster: cluster.to_string(),
            name: group.name.clone(),
            node_count: group.count,
            plan: group.plan.clone(),
            anti_affinity: group.anti_affinity,
            ssh_keys: group.ssh_keys.clone(),
            labels: labels_to_map(&group.labels),
            state: group.state.to_string(),
        })
    }
}

async fn wait_node_group_running(
    session: &Session,
    cluster: &str,
    name: &str,
) -> Result<KubernetesNodeGroup, ProviderError> {
    let target = format!("node group {} of cluster {}", name, cluster);
    wait_for_state(
        &session.cancel,
        session.poll_policy(STATE_POLL),
        &target,
        NodeGroupState::Running,
        || session.api.get_node_group(cluster, name),
    )
    .await
}

#[async_trait]
impl Resource for KubernetesNodeGroupResource {
    fn type_name(&self) -> &'static str {
        "upcloud_kubernetes_node_group"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A group of identical worker nodes in a Kubernetes cluster.")
            .with_id("Cluster UUID and node group name joined with `/`.")
            .with_attribute(
                "cluster",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("UUID of the cluster."),
            )
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "node_count",
                Attribute::required_int64().with_description("Number of nodes in the group."),
            )
            .with_attribute("plan", Attribute::required_string().with_force_new())
            .with_attribute(
                "anti_affinity",
                Attribute::optional_bool()
                    .with_default(Value::Bool(false))
                    .with_force_new()
                    .with_description("Place the nodes on different hosts."),
            )
            .with_attribute(
                "ssh_keys",
                string_set(AttributeFlags::optional()).with_force_new(),
            )
            .with_attribute(
                "labels",
                Attribute::optional_labels()
                    .with_force_new()
                    .with_description("Kubernetes labels of the nodes."),
            )
            .with_attribute("state", Attribute::computed_string())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        diagnostics.extend(id_component_diagnostics(config, &["name"]));
        diagnostics
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: NodeGroupModel = decode_state(planned)?;
        child_id(&[&model.cluster, &model.name])?;
        let req = CreateNodeGroupRequest {
            name: model.name.clone(),
            count: model.node_count,
            plan: model.plan.clone(),
            anti_affinity: model.anti_affinity,
            ssh_keys: model.ssh_keys.clone(),
            labels: labels_from_map(&model.labels),
        };
        session.api.create_node_group(&model.cluster, &req).await?;
        info!(cluster = %model.cluster, name = %model.name, "node group created, waiting for it to run");

        let group = wait_node_group_running(session, &model.cluster, &model.name).await?;
        encode_state(&NodeGroupModel::from_api(&model.cluster, &group)?)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: NodeGroupModel = decode_state(state)?;
        let [cluster, name] = parse_id::<2>(&model.id)?;
        let group = found(
            session.api.get_node_group(&cluster, &name).await,
            self.type_name(),
            &model.id,
        )?;
        group
            .map(|g| NodeGroupModel::from_api(&cluster, &g).and_then(|m| encode_state(&m)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: NodeGroupModel = decode_state(prior)?;
        let planned: NodeGroupModel = decode_state(planned)?;
        let [cluster, name] = parse_id::<2>(&prior.id)?;

        let req = ModifyNodeGroupRequest {
            count: planned.node_count,
        };
        session.api.modify_node_group(&cluster, &name, &req).await?;

        let group = wait_node_group_running(session, &cluster, &name).await?;
        encode_state(&NodeGroupModel::from_api(&cluster, &group)?)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: NodeGroupModel = decode_state(state)?;
        let [cluster, name] = parse_id::<2>(&model.id)?;
        session.api.delete_node_group(&cluster, &name).await?;

        let target = format!("node group {} of cluster {}", name, cluster);
        wait_until_deleted(
            &session.cancel,
            session.poll_policy(STATE_POLL),
            &target,
            || session.api.get_node_group(&cluster, &name),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::session;
    use serde_json::json;
    use std::sync::Arc;

    fn cluster_config() -> Value {
        json!({
            "name": "k8s-1",
            "zone": "de-fra1",
            "network": "net-1",
            "plan": "development",
            "private_node_groups": false,
            "control_plane_ip_filter": ["0.0.0.0/0"]
        })
    }

    #[tokio::test]
    async fn test_cluster_and_node_group() {
        let fake = Arc::new(FakeCloud::with_ready_after(2));
        let session = session(&fake);

        let cluster = KubernetesClusterResource
            .create(&session, cluster_config())
            .await
            .unwrap();
        assert_eq!(cluster["state"], "running");
        assert_eq!(cluster["version"], "1.30");
        let cluster_id = cluster["id"].as_str().unwrap();

        let group = KubernetesNodeGroupResource
            .create(
                &session,
                json!({
                    "cluster": cluster_id,
                    "name": "workers",
                    "node_count": 2,
                    "plan": "2xCPU-4GB",
                    "ssh_keys": ["ssh-ed25519 AAAA"]
                }),
            )
            .await
            .unwrap();
        assert_eq!(group["id"], format!("{}/workers", cluster_id));
        assert_eq!(group["state"], "running");

        let mut planned = group.clone();
        planned["node_count"] = json!(5);
        let scaled = KubernetesNodeGroupResource
            .update(&session, group.clone(), planned)
            .await
            .unwrap();
        assert_eq!(scaled["node_count"], 5);
        assert_eq!(scaled["state"], "running");
        assert!(fake
            .calls()
            .contains(&format!("modify_node_group {} workers 5", cluster_id)));

        KubernetesNodeGroupResource
            .delete(&session, scaled.clone())
            .await
            .unwrap();
        assert!(KubernetesNodeGroupResource
            .read(&session, scaled)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_node_group_import_by_composite_id() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let cluster = KubernetesClusterResource
            .create(&session, cluster_config())
            .await
            .unwrap();
        let cluster_id = cluster["id"].as_str().unwrap();
        KubernetesNodeGroupResource
            .create(
                &session,
                json!({"cluster": cluster_id, "name": "ng", "node_count": 1, "plan": "K8S-2xCPU-4GB"}),
            )
            .await
            .unwrap();

        let imported = KubernetesNodeGroupResource
            .import(&session, &format!("{}/ng", cluster_id))
            .await
            .unwrap();
        assert_eq!(imported["cluster"], cluster_id);
        assert_eq!(imported["name"], "ng");
        assert_eq!(imported["node_count"], 1);
    }

    #[tokio::test]
    async fn test_node_group_name_with_separator_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let cluster = KubernetesClusterResource
            .create(&session, cluster_config())
            .await
            .unwrap();

        let config = json!({
            "cluster": cluster["id"],
            "name": "ng/a",
            "node_count": 1,
            "plan": "K8S-2xCPU-4GB"
        });
        assert!(KubernetesNodeGroupResource
            .validate(&config)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("name")));

        let err = KubernetesNodeGroupResource
            .create(&session, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);
        assert!(!fake.calls().iter().any(|c| c.starts_with("create_node_group")));
    }

    #[tokio::test]
    async fn test_node_group_bad_id() {
        let fake = Arc::new(FakeCloud::new());
        let err = KubernetesNodeGroupResource
            .read(&session(&fake), json!({"id": "only-cluster"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_cluster_update_changes_filter() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let cluster = KubernetesClusterResource
            .create(&session, cluster_config())
            .await
            .unwrap();

        let mut planned = cluster.clone();
        planned["control_plane_ip_filter"] = json!(["10.0.0.0/8"]);
        let updated = KubernetesClusterResource
            .update(&session, cluster, planned)
            .await
            .unwrap();
        assert_eq!(updated["control_plane_ip_filter"], json!(["10.0.0.0/8"]));
    }
}
