use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{decode_state, encode_state, found, Resource, Session, STATE_POLL};
use crate::client::models::{
    labels_from_map, labels_to_map, CreateGatewayRequest, Gateway, GatewayState,
    ModifyGatewayRequest, UuidRef,
};
use crate::error::ProviderError;
use crate::poll::{wait_for_state, wait_until_deleted};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

/// `upcloud_gateway`: a NAT gateway attached to a router.
pub struct GatewayResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct GatewayModel {
    id: String,
    name: String,
    zone: String,
    features: Vec<String>,
    plan: String,
    configured_status: String,
    operational_state: String,
    addresses: Vec<String>,
    labels: BTreeMap<String, String>,
    router: RouterRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RouterRef {
    id: String,
}

impl GatewayModel {
    fn from_api(gateway: &Gateway) -> Self {
        Self {
            id: gateway.uuid.clone(),
            name: gateway.name.clone(),
            zone: gateway.zone.clone(),
            features: gateway.features.clone(),
            plan: gateway.plan.clone(),
            configured_status: gateway.configured_status.clone(),
            operational_state: gateway.operational_state.to_string(),
            addresses: gateway.addresses.iter().map(|a| a.address.clone()).collect(),
            labels: labels_to_map(&gateway.labels),
            router: RouterRef {
                id: gateway
                    .routers
                    .first()
                    .map(|r| r.uuid.clone())
                    .unwrap_or_default(),
            },
        }
    }
}

/// Wait until the gateway runs, or has stopped when configured as stopped.
async fn wait_settled(
    session: &Session,
    uuid: &str,
    configured_status: &str,
) -> Result<Gateway, ProviderError> {
    let target = format!("gateway {}", uuid);
    wait_for_state(
        &session.cancel,
        session.poll_policy(STATE_POLL),
        &target,
        GatewayState::settled(configured_status),
        || session.api.get_gateway(uuid),
    )
    .await
}

#[async_trait]
impl Resource for GatewayResource {
    fn type_name(&self) -> &'static str {
        "upcloud_gateway"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A network gateway giving private networks NAT access to the internet.")
            .with_id("UUID of the gateway.")
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "zone",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Zone of the gateway, e.g. `fi-hel1`."),
            )
            .with_attribute(
                "features",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    AttributeFlags::required(),
                )
                .with_force_new()
                .with_description("Enabled features. Currently only `nat`."),
            )
            .with_attribute(
                "plan",
                Attribute::optional_computed_string()
                    .with_force_new()
                    .with_description("Gateway plan."),
            )
            .with_attribute(
                "configured_status",
                Attribute::optional_string()
                    .with_default(Value::from("started"))
                    .with_allowed_strings(&["started", "stopped"]),
            )
            .with_attribute("operational_state", Attribute::computed_string())
            .with_attribute(
                "addresses",
                Attribute::computed_string_list().with_description("Public IP addresses."),
            )
            .with_attribute("labels", Attribute::optional_labels())
            .with_block(
                "router",
                NestedBlock::single(Block::new().with_attribute(
                    "id",
                    Attribute::required_string().with_description("UUID of the attached router."),
                ))
                .with_min_items(1)
                .with_force_new(),
            )
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: GatewayModel = decode_state(planned)?;
        let req = CreateGatewayRequest {
            name: model.name.clone(),
            zone: model.zone.clone(),
            features: model.features.clone(),
            plan: Some(model.plan.clone()).filter(|p| !p.is_empty()),
            configured_status: model.configured_status.clone(),
            routers: vec![UuidRef {
                uuid: model.router.id.clone(),
            }],
            labels: labels_from_map(&model.labels),
        };
        let gateway = session.api.create_gateway(&req).await?;
        info!(uuid = %gateway.uuid, status = %model.configured_status, "gateway created, waiting for it to settle");

        let gateway = wait_settled(session, &gateway.uuid, &model.configured_status).await?;
        encode_state(&GatewayModel::from_api(&gateway))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: GatewayModel = decode_state(state)?;
        let gateway = found(
            session.api.get_gateway(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        gateway
            .map(|g| encode_state(&GatewayModel::from_api(&g)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: GatewayModel = decode_state(prior)?;
        let planned: GatewayModel = decode_state(planned)?;

        let req = ModifyGatewayRequest {
            name: Some(planned.name.clone()).filter(|n| n != &prior.name),
            configured_status: Some(planned.configured_status.clone())
                .filter(|s| s != &prior.configured_status),
            labels: Some(labels_from_map(&planned.labels)).filter(|_| planned.labels != prior.labels),
        };
        session.api.modify_gateway(&prior.id, &req).await?;

        let gateway = wait_settled(session, &prior.id, &planned.configured_status).await?;
        encode_state(&GatewayModel::from_api(&gateway))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: GatewayModel = decode_state(state)?;
        session.api.delete_gateway(&model.id).await?;

        let target = format!("gateway {}", model.id);
        wait_until_deleted(
            &session.cancel,
            session.poll_policy(STATE_POLL),
            &target,
            || session.api.get_gateway(&model.id),
        )
        .await
    }
}
