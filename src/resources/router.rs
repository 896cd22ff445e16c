use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{decode_state, encode_state, found, Resource, Session};
use crate::client::models::{labels_from_map, labels_to_map, LabelList, Router, RouterRequest, StaticRoute};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// `upcloud_router`: a private network router.
pub struct RouterResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RouterModel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    router_type: String,
    attached_networks: Vec<String>,
    labels: BTreeMap<String, String>,
    static_route: Vec<StaticRouteModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StaticRouteModel {
    name: String,
    nexthop: String,
    route: String,
    #[serde(rename = "type")]
    route_type: String,
}

impl RouterModel {
    fn request(&self) -> RouterRequest {
        RouterRequest {
            name: self.name.clone(),
            static_routes: self
                .static_route
                .iter()
                .map(|r| StaticRoute {
                    name: r.name.clone(),
                    nexthop: r.nexthop.clone(),
                    route: r.route.clone(),
                    route_type: String::new(),
                })
                .collect(),
            labels: LabelList {
                label: labels_from_map(&self.labels),
            },
        }
    }

    fn from_api(router: &Router) -> Self {
        Self {
            id: router.uuid.clone(),
            name: router.name.clone(),
            router_type: router.router_type.clone(),
            attached_networks: router.attached_networks.uuids(),
            labels: labels_to_map(&router.labels.label),
            // Service routes are managed by the platform, not by the user.
            static_route: router
                .static_routes
                .iter()
                .filter(|r| r.route_type != "service")
                .map(|r| StaticRouteModel {
                    name: r.name.clone(),
                    nexthop: r.nexthop.clone(),
                    route: r.route.clone(),
                    route_type: r.route_type.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Resource for RouterResource {
    fn type_name(&self) -> &'static str {
        "upcloud_router"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A router connects private networks and holds their static routes.")
            .with_id("UUID of the router.")
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the router."),
            )
            .with_attribute(
                "type",
                Attribute::computed_string().with_description("Router type, `normal` or `service`."),
            )
            .with_attribute(
                "attached_networks",
                Attribute::computed_string_list()
                    .with_description("UUIDs of the networks attached to the router."),
            )
            .with_attribute("labels", Attribute::optional_labels())
            .with_block(
                "static_route",
                NestedBlock::set(
                    Block::new()
                        .with_description("A static route.")
                        .with_attribute("name", Attribute::optional_computed_string())
                        .with_attribute(
                            "nexthop",
                            Attribute::required_string().with_description("Next hop address."),
                        )
                        .with_attribute(
                            "route",
                            Attribute::required_string()
                                .with_description("Destination prefix, e.g. `10.0.0.0/24`."),
                        )
                        .with_attribute("type", Attribute::computed_string()),
                ),
            )
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: RouterModel = decode_state(planned)?;
        let router = session.api.create_router(&model.request()).await?;
        info!(uuid = %router.uuid, name = %router.name, "router created");
        encode_state(&RouterModel::from_api(&router))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: RouterModel = decode_state(state)?;
        let router = found(
            session.api.get_router(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        router
            .map(|r| encode_state(&RouterModel::from_api(&r)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: RouterModel = decode_state(prior)?;
        let planned: RouterModel = decode_state(planned)?;
        let router = session
            .api
            .modify_router(&prior.id, &planned.request())
            .await?;
        encode_state(&RouterModel::from_api(&router))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: RouterModel = decode_state(state)?;
        session.api.delete_router(&model.id).await
    }
}
