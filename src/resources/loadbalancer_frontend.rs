use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{
    child_id, decode_state, encode_state, found, id_component_diagnostics, parse_id, Resource,
    Session,
};
use crate::client::models::{FrontendNetwork, FrontendProperties, LoadBalancerFrontend};
use crate::error::ProviderError;
use crate::id::marshal_id;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::validation;

/// `upcloud_loadbalancer_frontend`: a listening port routed to a default
/// backend.
///
/// ID: `<load balancer uuid>/<frontend name>`.
pub struct LoadBalancerFrontendResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct FrontendModel {
    id: String,
    loadbalancer: String,
    name: String,
    mode: String,
    port: i64,
    default_backend_name: String,
    networks: Vec<FrontendNetwork>,
    properties: Option<FrontendProperties>,
}

impl FrontendModel {
    fn frontend(&self) -> LoadBalancerFrontend {
        LoadBalancerFrontend {
            name: self.name.clone(),
            mode: self.mode.clone(),
            port: self.port,
            default_backend: self.default_backend_name.clone(),
            networks: self.networks.clone(),
            properties: self.properties.clone().unwrap_or_default(),
        }
    }

    fn from_api(lb: &str, frontend: &LoadBalancerFrontend) -> Result<Self, ProviderError> {
        Ok(Self {
            id: marshal_id(&[lb, &frontend.name])?,
            loadbalancer: lb.to_string(),
            name: frontend.name.clone(),
            mode: frontend.mode.clone(),
            port: frontend.port,
            default_backend_name: frontend.default_backend.clone(),
            networks: frontend.networks.clone(),
            properties: Some(frontend.properties.clone()),
        })
    }
}

#[async_trait]
impl Resource for LoadBalancerFrontendResource {
    fn type_name(&self) -> &'static str {
        "upcloud_loadbalancer_frontend"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A load balancer frontend.")
            .with_id("Load balancer UUID and frontend name joined with `/`.")
            .with_attribute(
                "loadbalancer",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("UUID of the load balancer."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "mode",
                Attribute::required_string().with_allowed_strings(&["http", "tcp"]),
            )
            .with_attribute(
                "port",
                Attribute::required_int64().with_description("Port to listen on."),
            )
            .with_attribute(
                "default_backend_name",
                Attribute::required_string()
                    .with_description("Backend that receives traffic no rule claims."),
            )
            .with_block(
                "networks",
                NestedBlock::list(Block::new().with_attribute(
                    "name",
                    Attribute::required_string()
                        .with_description("Name of a load balancer network to listen on."),
                )),
            )
            .with_block(
                "properties",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("timeout_client", Attribute::optional_computed_int64())
                        .with_attribute(
                            "inbound_proxy_protocol",
                            Attribute::optional_computed_bool(),
                        )
                        .with_attribute("http2_enabled", Attribute::optional_computed_bool()),
                ),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        diagnostics.extend(id_component_diagnostics(config, &["name"]));
        diagnostics
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: FrontendModel = decode_state(planned)?;
        child_id(&[&model.loadbalancer, &model.name])?;
        let frontend = session
            .api
            .create_lb_frontend(&model.loadbalancer, &model.frontend())
            .await?;
        info!(loadbalancer = %model.loadbalancer, name = %frontend.name, "frontend created");
        encode_state(&FrontendModel::from_api(&model.loadbalancer, &frontend)?)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: FrontendModel = decode_state(state)?;
        let [lb, name] = parse_id::<2>(&model.id)?;
        let frontend = found(
            session.api.get_lb_frontend(&lb, &name).await,
            self.type_name(),
            &model.id,
        )?;
        frontend
            .map(|f| FrontendModel::from_api(&lb, &f).and_then(|m| encode_state(&m)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: FrontendModel = decode_state(prior)?;
        let planned: FrontendModel = decode_state(planned)?;
        let [lb, name] = parse_id::<2>(&prior.id)?;
        child_id(&[&lb, &planned.name])?;

        let frontend = session
            .api
            .modify_lb_frontend(&lb, &name, &planned.frontend())
            .await?;
        encode_state(&FrontendModel::from_api(&lb, &frontend)?)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: FrontendModel = decode_state(state)?;
        let [lb, name] = parse_id::<2>(&model.id)?;
        session.api.delete_lb_frontend(&lb, &name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::session;
    use crate::resources::{LoadBalancerBackendResource, LoadBalancerResource};
    use serde_json::json;
    use std::sync::Arc;

    async fn load_balancer_with_backend(session: &Session) -> String {
        let lb = LoadBalancerResource
            .create(
                session,
                json!({
                    "name": "lb",
                    "zone": "fi-hel1",
                    "plan": "development",
                    "configured_status": "started",
                    "networks": [{"name": "public", "type": "public", "family": "IPv4"}]
                }),
            )
            .await
            .unwrap();
        let lb = lb["id"].as_str().unwrap().to_string();
        LoadBalancerBackendResource
            .create(session, json!({"loadbalancer": lb, "name": "web"}))
            .await
            .unwrap();
        lb
    }

    fn config(lb: &str) -> Value {
        json!({
            "loadbalancer": lb,
            "name": "https",
            "mode": "http",
            "port": 443,
            "default_backend_name": "web",
            "networks": [{"name": "public"}],
            "properties": {"http2_enabled": true}
        })
    }

    #[tokio::test]
    async fn test_frontend_lifecycle() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer_with_backend(&session).await;

        let state = LoadBalancerFrontendResource
            .create(&session, config(&lb))
            .await
            .unwrap();
        assert_eq!(state["id"], format!("{}/https", lb));
        assert_eq!(state["networks"], json!([{"name": "public"}]));
        assert_eq!(state["properties"]["http2_enabled"], true);

        let mut planned = state.clone();
        planned["name"] = json!("web-tls");
        planned["port"] = json!(8443);
        let updated = LoadBalancerFrontendResource
            .update(&session, state, planned)
            .await
            .unwrap();
        assert_eq!(updated["id"], format!("{}/web-tls", lb));
        assert_eq!(updated["port"], 8443);

        LoadBalancerFrontendResource
            .delete(&session, updated.clone())
            .await
            .unwrap();
        assert!(LoadBalancerFrontendResource
            .read(&session, updated)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_name_with_separator_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer_with_backend(&session).await;

        let mut config = config(&lb);
        config["name"] = json!("a/b");
        let diagnostics = LoadBalancerFrontendResource.validate(&config);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("name")));

        let err = LoadBalancerFrontendResource
            .create(&session, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);
        assert!(!fake.calls().iter().any(|c| c.starts_with("create_lb_frontend ")));
    }

    #[tokio::test]
    async fn test_unknown_default_backend_is_rejected() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer_with_backend(&session).await;

        let mut config = config(&lb);
        config["default_backend_name"] = json!("missing");
        let err = LoadBalancerFrontendResource
            .create(&session, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 422, .. }), "{}", err);
    }
}
