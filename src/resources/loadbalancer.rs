use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, encode_state, found, Resource, Session, STATE_POLL};
use crate::client::models::{
    labels_from_map, labels_to_map, CreateLoadBalancerRequest, LoadBalancer, LoadBalancerNetwork,
    LoadBalancerState, ModifyLoadBalancerRequest,
};
use crate::error::ProviderError;
use crate::poll::{wait_for_state, wait_until_deleted};
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// `upcloud_loadbalancer`: a managed load balancer.
///
/// Backends, members, frontends and rules are separate resources.
pub struct LoadBalancerResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LoadBalancerModel {
    id: String,
    name: String,
    zone: String,
    plan: String,
    configured_status: String,
    operational_state: String,
    maintenance_dow: String,
    maintenance_time: String,
    labels: BTreeMap<String, String>,
    networks: Vec<NetworkModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct NetworkModel {
    name: String,
    #[serde(rename = "type")]
    network_type: String,
    family: String,
    network: String,
    dns_name: String,
}

impl NetworkModel {
    /// Everything but the name, which can change in place.
    fn identity(&self) -> (&str, &str, &str) {
        (&self.network_type, &self.family, &self.network)
    }
}

impl LoadBalancerModel {
    fn from_api(lb: &LoadBalancer) -> Self {
        Self {
            id: lb.uuid.clone(),
            name: lb.name.clone(),
            zone: lb.zone.clone(),
            plan: lb.plan.clone(),
            configured_status: lb.configured_status.clone(),
            operational_state: lb.operational_state.to_string(),
            maintenance_dow: lb.maintenance_dow.clone(),
            maintenance_time: lb.maintenance_time.clone(),
            labels: labels_to_map(&lb.labels),
            networks: lb
                .networks
                .iter()
                .map(|n| NetworkModel {
                    name: n.name.clone(),
                    network_type: n.network_type.clone(),
                    family: n.family.clone(),
                    network: n.uuid.clone(),
                    dns_name: n.dns_name.clone(),
                })
                .collect(),
        }
    }
}

fn changed<T: PartialEq + Clone>(prior: &T, planned: &T) -> Option<T> {
    if prior == planned {
        None
    } else {
        Some(planned.clone())
    }
}

/// Network renames needed to go from `prior` to `planned`, as
/// `(old name, new name)`.
///
/// Networks are matched by position. Anything but a rename needs a new
/// load balancer.
fn network_renames(
    prior: &[NetworkModel],
    planned: &[NetworkModel],
) -> Result<Vec<(String, String)>, ProviderError> {
    if prior.len() != planned.len()
        || prior
            .iter()
            .zip(planned)
            .any(|(a, b)| a.identity() != b.identity())
    {
        return Err(ProviderError::FailedPrecondition(
            "load balancer networks can only be renamed in place; adding, removing or changing a network requires replacing the load balancer".to_string(),
        ));
    }
    Ok(prior
        .iter()
        .zip(planned)
        .filter(|(a, b)| a.name != b.name)
        .map(|(a, b)| (a.name.clone(), b.name.clone()))
        .collect())
}

async fn wait_settled(
    session: &Session,
    uuid: &str,
    configured_status: &str,
) -> Result<LoadBalancer, ProviderError> {
    let target = format!("load balancer {}", uuid);
    wait_for_state(
        &session.cancel,
        session.poll_policy(STATE_POLL),
        &target,
        LoadBalancerState::settled(configured_status),
        || session.api.get_load_balancer(uuid),
    )
    .await
}

#[async_trait]
impl Resource for LoadBalancerResource {
    fn type_name(&self) -> &'static str {
        "upcloud_loadbalancer"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A managed load balancer.")
            .with_id("UUID of the load balancer.")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("zone", Attribute::required_string().with_force_new())
            .with_attribute(
                "plan",
                Attribute::required_string().with_description("Plan, e.g. `development`."),
            )
            .with_attribute(
                "configured_status",
                Attribute::optional_string()
                    .with_default(Value::from("started"))
                    .with_allowed_strings(&["started", "stopped"]),
            )
            .with_attribute("operational_state", Attribute::computed_string())
            .with_attribute(
                "maintenance_dow",
                Attribute::optional_computed_string()
                    .with_allowed_strings(&[
                        "monday",
                        "tuesday",
                        "wednesday",
                        "thursday",
                        "friday",
                        "saturday",
                        "sunday",
                    ])
                    .with_description("Day of the weekly maintenance window."),
            )
            .with_attribute(
                "maintenance_time",
                Attribute::optional_computed_string()
                    .with_description("Start of the maintenance window, `HH:MM:SSZ` in UTC."),
            )
            .with_attribute("labels", Attribute::optional_labels())
            .with_block(
                "networks",
                NestedBlock::list(
                    Block::new()
                        .with_description("Networks the load balancer is attached to. Only the name can change in place.")
                        .with_attribute(
                            "name",
                            Attribute::required_string()
                                .with_description("Name referenced by frontends."),
                        )
                        .with_attribute(
                            "type",
                            Attribute::required_string().with_allowed_strings(&["public", "private"]),
                        )
                        .with_attribute(
                            "family",
                            Attribute::required_string().with_allowed_strings(&["IPv4"]),
                        )
                        .with_attribute(
                            "network",
                            Attribute::optional_string()
                                .with_description("UUID of the private network."),
                        )
                        .with_attribute("dns_name", Attribute::computed_string()),
                )
                .with_min_items(1)
                .with_max_items(8),
            )
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: LoadBalancerModel = decode_state(planned)?;
        let req = CreateLoadBalancerRequest {
            name: model.name.clone(),
            zone: model.zone.clone(),
            plan: model.plan.clone(),
            configured_status: model.configured_status.clone(),
            networks: model
                .networks
                .iter()
                .map(|n| LoadBalancerNetwork {
                    name: n.name.clone(),
                    network_type: n.network_type.clone(),
                    family: n.family.clone(),
                    uuid: n.network.clone(),
                    dns_name: String::new(),
                })
                .collect(),
            maintenance_dow: Some(model.maintenance_dow.clone()).filter(|d| !d.is_empty()),
            maintenance_time: Some(model.maintenance_time.clone()).filter(|t| !t.is_empty()),
            labels: labels_from_map(&model.labels),
        };
        let lb = session.api.create_load_balancer(&req).await?;
        info!(uuid = %lb.uuid, status = %model.configured_status, "load balancer created, waiting for it to settle");

        let lb = wait_settled(session, &lb.uuid, &model.configured_status).await?;
        encode_state(&LoadBalancerModel::from_api(&lb))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: LoadBalancerModel = decode_state(state)?;
        let lb = found(
            session.api.get_load_balancer(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        lb.map(|lb| encode_state(&LoadBalancerModel::from_api(&lb)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: LoadBalancerModel = decode_state(prior)?;
        let planned: LoadBalancerModel = decode_state(planned)?;

        // Frontends reference networks by name, so renames go first.
        for (old, new) in network_renames(&prior.networks, &planned.networks)? {
            debug!(uuid = %prior.id, from = %old, to = %new, "renaming load balancer network");
            session
                .api
                .rename_load_balancer_network(&prior.id, &old, &new)
                .await?;
        }

        let req = ModifyLoadBalancerRequest {
            name: changed(&prior.name, &planned.name),
            plan: changed(&prior.plan, &planned.plan),
            configured_status: changed(&prior.configured_status, &planned.configured_status),
            maintenance_dow: changed(&prior.maintenance_dow, &planned.maintenance_dow)
                .filter(|d| !d.is_empty()),
            maintenance_time: changed(&prior.maintenance_time, &planned.maintenance_time)
                .filter(|t| !t.is_empty()),
            labels: changed(&prior.labels, &planned.labels).map(|l| labels_from_map(&l)),
        };
        if !req.is_empty() {
            session.api.modify_load_balancer(&prior.id, &req).await?;
        }

        let lb = wait_settled(session, &prior.id, &planned.configured_status).await?;
        encode_state(&LoadBalancerModel::from_api(&lb))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: LoadBalancerModel = decode_state(state)?;
        session.api.delete_load_balancer(&model.id).await?;

        let target = format!("load balancer {}", model.id);
        wait_until_deleted(
            &session.cancel,
            session.poll_policy(STATE_POLL),
            &target,
            || session.api.get_load_balancer(&model.id),
        )
        .await
    }
}
