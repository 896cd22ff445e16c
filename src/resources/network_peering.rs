use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, encode_state, found, Resource, Session, STATE_POLL};
use crate::client::models::{
    labels_from_map, labels_to_map, CreateNetworkPeeringRequest, ModifyNetworkPeeringRequest,
    NetworkPeering, NetworkPeeringState, UuidRef,
};
use crate::error::ProviderError;
use crate::poll::{wait_for_state, wait_until_deleted};
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// `upcloud_network_peering`: a peering between two private networks.
///
/// A peering is only usable once both sides exist, so waiting for the
/// desired state is opt-in through `wait_for_desired_state`.
pub struct NetworkPeeringResource;

const ACTIVE: &str = "active";
const DISABLED: &str = "disabled";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct NetworkPeeringModel {
    id: String,
    name: String,
    configured_status: String,
    state: String,
    labels: BTreeMap<String, String>,
    wait_for_desired_state: bool,
    network: NetworkRef,
    peer_network: NetworkRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct NetworkRef {
    uuid: String,
}

impl NetworkPeeringModel {
    fn configured_status(&self) -> &str {
        if self.configured_status.is_empty() {
            ACTIVE
        } else {
            &self.configured_status
        }
    }

    fn desired_state(&self) -> NetworkPeeringState {
        if self.configured_status() == DISABLED {
            NetworkPeeringState::Disabled
        } else {
            NetworkPeeringState::Active
        }
    }

    /// State from the API. `wait_for_desired_state` only lives in state.
    fn from_api(peering: &NetworkPeering, wait_for_desired_state: bool) -> Self {
        Self {
            id: peering.uuid.clone(),
            name: peering.name.clone(),
            configured_status: peering.configured_status.clone(),
            state: peering.state.to_string(),
            labels: labels_to_map(&peering.labels),
            wait_for_desired_state,
            network: NetworkRef {
                uuid: peering.network.uuid.clone(),
            },
            peer_network: NetworkRef {
                uuid: peering.peer_network.uuid.clone(),
            },
        }
    }
}

async fn wait_for(
    session: &Session,
    uuid: &str,
    desired: NetworkPeeringState,
) -> Result<NetworkPeering, ProviderError> {
    let target = format!("network peering {}", uuid);
    wait_for_state(
        &session.cancel,
        session.poll_policy(STATE_POLL),
        &target,
        desired,
        || session.api.get_network_peering(uuid),
    )
    .await
}

#[async_trait]
impl Resource for NetworkPeeringResource {
    fn type_name(&self) -> &'static str {
        "upcloud_network_peering"
    }

    fn schema(&self) -> Schema {
        let network = |description: &str| {
            NestedBlock::single(Block::new().with_description(description).with_attribute(
                "uuid",
                Attribute::required_string().with_description("UUID of the network."),
            ))
            .with_min_items(1)
            .with_force_new()
        };

        Schema::v0()
            .with_description("Peers two private networks, possibly owned by different accounts.")
            .with_id("UUID of the network peering.")
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "configured_status",
                Attribute::optional_string()
                    .with_default(Value::from(ACTIVE))
                    .with_allowed_strings(&[ACTIVE, DISABLED])
                    .with_description("Whether the peering should be `active` or `disabled`."),
            )
            .with_attribute(
                "state",
                Attribute::computed_string().with_description("Operational state of the peering."),
            )
            .with_attribute("labels", Attribute::optional_labels())
            .with_attribute(
                "wait_for_desired_state",
                Attribute::optional_bool()
                    .with_default(Value::Bool(false))
                    .with_description(
                        "Wait until the peering reaches the configured status. Only useful once both sides exist.",
                    ),
            )
            .with_block("network", network("The local network."))
            .with_block("peer_network", network("The network to peer with."))
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: NetworkPeeringModel = decode_state(planned)?;
        let req = CreateNetworkPeeringRequest {
            name: model.name.clone(),
            network: UuidRef {
                uuid: model.network.uuid.clone(),
            },
            peer_network: UuidRef {
                uuid: model.peer_network.uuid.clone(),
            },
            configured_status: model.configured_status().to_string(),
            labels: labels_from_map(&model.labels),
        };
        let mut peering = session.api.create_network_peering(&req).await?;
        info!(uuid = %peering.uuid, "network peering created");

        if model.wait_for_desired_state {
            peering = wait_for(session, &peering.uuid, model.desired_state()).await?;
        }
        encode_state(&NetworkPeeringModel::from_api(
            &peering,
            model.wait_for_desired_state,
        ))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: NetworkPeeringModel = decode_state(state)?;
        let peering = found(
            session.api.get_network_peering(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        peering
            .map(|p| encode_state(&NetworkPeeringModel::from_api(&p, model.wait_for_desired_state)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: NetworkPeeringModel = decode_state(prior)?;
        let planned: NetworkPeeringModel = decode_state(planned)?;

        let req = ModifyNetworkPeeringRequest {
            name: Some(planned.name.clone()),
            configured_status: Some(planned.configured_status().to_string()),
            labels: Some(labels_from_map(&planned.labels)),
        };
        let mut peering = session.api.modify_network_peering(&prior.id, &req).await?;

        if planned.wait_for_desired_state {
            peering = wait_for(session, &prior.id, planned.desired_state()).await?;
        }
        encode_state(&NetworkPeeringModel::from_api(
            &peering,
            planned.wait_for_desired_state,
        ))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: NetworkPeeringModel = decode_state(state)?;

        // The API refuses to delete a peering that is not disabled.
        let current = session.api.get_network_peering(&model.id).await?;
        if current.state != NetworkPeeringState::Disabled {
            debug!(uuid = %model.id, state = %current.state, "disabling network peering before delete");
            let req = ModifyNetworkPeeringRequest {
                configured_status: Some(DISABLED.to_string()),
                ..Default::default()
            };
            session.api.modify_network_peering(&model.id, &req).await?;
            wait_for(session, &model.id, NetworkPeeringState::Disabled).await?;
        }

        session.api.delete_network_peering(&model.id).await?;
        let target = format!("network peering {}", model.id);
        wait_until_deleted(
            &session.cancel,
            session.poll_policy(STATE_POLL),
            &target,
            || session.api.get_network_peering(&model.id),
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

    fn config(wait: bool) -> Value {
        json!({
            "name": "peering-1",
            "configured_status": "active",
            "wait_for_desired_state": wait,
            "network": {"uuid": "net-a"},
            "peer_network": {"uuid": "net-b"}
        })
    }

    #[tokio::test]
    async fn test_create_without_waiting_returns_transitional_state() {
        let fake = Arc::new(FakeCloud::with_ready_after(2));
        let state = NetworkPeeringResource
            .create(&session(&fake), config(false))
            .await
            .unwrap();
        assert_eq!(state["state"], "provisioning");
        assert_eq!(state["network"]["uuid"], "net-a");
    }

    #[tokio::test]
    async fn test_create_waits_for_active() {
        let fake = Arc::new(FakeCloud::with_ready_after(2));
        let state = NetworkPeeringResource
            .create(&session(&fake), config(true))
            .await
            .unwrap();
        assert_eq!(state["state"], "active");
        assert_eq!(state["wait_for_desired_state"], true);
    }

    #[tokio::test]
    async fn test_delete_disables_first() {
        let fake = Arc::new(FakeCloud::with_ready_after(1));
        let session = session(&fake);
        let state = NetworkPeeringResource
            .create(&session, config(true))
            .await
            .unwrap();

        NetworkPeeringResource
            .delete(&session, state.clone())
            .await
            .unwrap();

        let id = state["id"].as_str().unwrap();
        let calls = fake.calls();
        let disable = calls
            .iter()
            .position(|c| c == &format!("modify_network_peering {}", id))
            .unwrap();
        let delete = calls
            .iter()
            .position(|c| c == &format!("delete_network_peering {}", id))
            .unwrap();
        assert!(disable < delete);
        assert!(NetworkPeeringResource
            .read(&session, state)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_to_disabled() {
        let fake = Arc::new(FakeCloud::with_ready_after(1));
        let session = session(&fake);
        let state = NetworkPeeringResource
            .create(&session, config(true))
            .await
            .unwrap();

        let mut planned = state.clone();
        planned["configured_status"] = json!("disabled");
        let updated = NetworkPeeringResource
            .update(&session, state, planned)
            .await
            .unwrap();
        assert_eq!(updated["state"], "disabled");
    }
}
