use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{
    child_id, decode_state, encode_state, found, id_component_diagnostics, parse_id, Resource,
    Session,
};
use crate::client::models::{
    BackendProperties, BackendRequest, LoadBalancerBackend, LoadBalancerMember, MemberType,
};
use crate::error::ProviderError;
use crate::id::marshal_id;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::validation;

/// `upcloud_loadbalancer_backend`: a pool of members behind a load balancer.
///
/// ID: `<load balancer uuid>/<backend name>`.
pub struct LoadBalancerBackendResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct BackendModel {
    id: String,
    loadbalancer: String,
    name: String,
    resolver: Option<String>,
    members: Vec<String>,
    properties: Option<BackendProperties>,
}

impl BackendModel {
    fn request(&self) -> BackendRequest {
        BackendRequest {
            name: self.name.clone(),
            resolver: self.resolver.clone().filter(|r| !r.is_empty()),
            properties: self.properties.clone().unwrap_or_default(),
        }
    }

    fn from_api(lb: &str, backend: &LoadBalancerBackend) -> Result<Self, ProviderError> {
        Ok(Self {
            id: marshal_id(&[lb, &backend.name])?,
            loadbalancer: lb.to_string(),
            name: backend.name.clone(),
            resolver: backend.resolver.clone(),
            members: backend.members.iter().map(|m| m.name.clone()).collect(),
            properties: Some(backend.properties.clone()),
        })
    }
}

#[async_trait]
impl Resource for LoadBalancerBackendResource {
    fn type_name(&self) -> &'static str {
        "upcloud_loadbalancer_backend"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A load balancer backend. Members are managed with the member resources.")
            .with_id("Load balancer UUID and backend name joined with `/`.")
            .with_attribute(
                "loadbalancer",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("UUID of the load balancer."),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Backend name. Can be changed in place."),
            )
            .with_attribute(
                "resolver",
                Attribute::optional_string()
                    .with_description("Name of the resolver used to look up dynamic members."),
            )
            .with_attribute(
                "members",
                Attribute::computed_string_list().with_description("Names of the backend members."),
            )
            .with_block(
                "properties",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("timeout_server", Attribute::optional_computed_int64())
                        .with_attribute("timeout_tunnel", Attribute::optional_computed_int64())
                        .with_attribute(
                            "health_check_type",
                            Attribute::optional_computed_string()
                                .with_allowed_strings(&["tcp", "http"]),
                        )
                        .with_attribute("health_check_interval", Attribute::optional_computed_int64())
                        .with_attribute("health_check_url", Attribute::optional_computed_string())
                        .with_attribute(
                            "health_check_expected_status",
                            Attribute::optional_computed_int64(),
                        )
                        .with_attribute(
                            "outbound_proxy_protocol",
                            Attribute::optional_computed_string()
                                .with_allowed_strings(&["", "v1", "v2"]),
                        ),
                ),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        diagnostics.extend(id_component_diagnostics(config, &["name"]));
        diagnostics
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: BackendModel = decode_state(planned)?;
        child_id(&[&model.loadbalancer, &model.name])?;
        let backend = session
            .api
            .create_lb_backend(&model.loadbalancer, &model.request())
            .await?;
        info!(loadbalancer = %model.loadbalancer, name = %backend.name, "backend created");
        encode_state(&BackendModel::from_api(&model.loadbalancer, &backend)?)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: BackendModel = decode_state(state)?;
        let [lb, name] = parse_id::<2>(&model.id)?;
        let backend = found(
            session.api.get_lb_backend(&lb, &name).await,
            self.type_name(),
            &model.id,
        )?;
        backend
            .map(|b| BackendModel::from_api(&lb, &b).and_then(|m| encode_state(&m)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: BackendModel = decode_state(prior)?;
        let planned: BackendModel = decode_state(planned)?;
        let [lb, name] = parse_id::<2>(&prior.id)?;
        child_id(&[&lb, &planned.name])?;

        session
            .api
            .modify_lb_backend(&lb, &name, &planned.request())
            .await?;
        // Read back so `members` reflects the member resources.
        let backend = session.api.get_lb_backend(&lb, &planned.name).await?;
        encode_state(&BackendModel::from_api(&lb, &backend)?)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: BackendModel = decode_state(state)?;
        let [lb, name] = parse_id::<2>(&model.id)?;
        session.api.delete_lb_backend(&lb, &name).await
    }
}

/// `upcloud_loadbalancer_static_backend_member` and
/// `upcloud_loadbalancer_dynamic_backend_member`.
///
/// Both share one implementation. Static members require an address and a
/// port; dynamic members get theirs at runtime.
///
/// ID: `<load balancer uuid>/<backend name>/<member name>`.
pub struct BackendMemberResource {
    member_type: MemberType,
}

impl BackendMemberResource {
    /// The static member resource.
    pub fn static_members() -> Self {
        Self {
            member_type: MemberType::Static,
        }
    }

    /// The dynamic member resource.
    pub fn dynamic_members() -> Self {
        Self {
            member_type: MemberType::Dynamic,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct MemberModel {
    id: String,
    backend: String,
    name: String,
    weight: i64,
    max_sessions: i64,
    enabled: bool,
    backup: bool,
    ip: Option<String>,
    port: Option<i64>,
}

impl MemberModel {
    fn member(&self, member_type: MemberType) -> LoadBalancerMember {
        LoadBalancerMember {
            name: self.name.clone(),
            member_type,
            weight: self.weight,
            max_sessions: self.max_sessions,
            enabled: self.enabled,
            backup: self.backup,
            ip: self.ip.clone().filter(|ip| !ip.is_empty()),
            port: self.port,
        }
    }

    fn from_api(lb: &str, backend: &str, member: &LoadBalancerMember) -> Result<Self, ProviderError> {
        Ok(Self {
            id: marshal_id(&[lb, backend, &member.name])?,
            backend: marshal_id(&[lb, backend])?,
            name: member.name.clone(),
            weight: member.weight,
            max_sessions: member.max_sessions,
            enabled: member.enabled,
            backup: member.backup,
            ip: member.ip.clone(),
            port: member.port,
        })
    }
}

#[async_trait]
impl Resource for BackendMemberResource {
    fn type_name(&self) -> &'static str {
        match self.member_type {
            MemberType::Static => "upcloud_loadbalancer_static_backend_member",
            MemberType::Dynamic => "upcloud_loadbalancer_dynamic_backend_member",
        }
    }

    fn schema(&self) -> Schema {
        let (ip, port) = match self.member_type {
            MemberType::Static => (Attribute::required_string(), Attribute::required_int64()),
            MemberType::Dynamic => (
                Attribute::optional_computed_string(),
                Attribute::optional_computed_int64(),
            ),
        };

        Schema::v0()
            .with_description("A member of a load balancer backend.")
            .with_id("Load balancer UUID, backend name and member name joined with `/`.")
            .with_attribute(
                "backend",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the backend."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "weight",
                Attribute::required_int64().with_description("Relative weight, 0 to 100."),
            )
            .with_attribute("max_sessions", Attribute::required_int64())
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(Value::Bool(true)),
            )
            .with_attribute(
                "backup",
                Attribute::optional_bool().with_default(Value::Bool(false)),
            )
            .with_attribute("ip", ip.with_description("Member address."))
            .with_attribute("port", port.with_description("Member port."))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        let range = |name: &str, min: i64, max: i64, diagnostics: &mut Vec<Diagnostic>| {
            if let Some(value) = config.get(name).and_then(Value::as_i64) {
                if value < min || value > max {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid value for attribute '{}'", name))
                            .with_detail(format!("Expected {} to {}, got {}", min, max, value))
                            .with_attribute(name),
                    );
                }
            }
        };
        range("weight", 0, 100, &mut diagnostics);
        range("max_sessions", 0, 500_000, &mut diagnostics);
        range("port", 1, 65535, &mut diagnostics);
        diagnostics.extend(id_component_diagnostics(config, &["name"]));
        diagnostics
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: MemberModel = decode_state(planned)?;
        let [lb, backend] = parse_id::<2>(&model.backend)?;
        child_id(&[&lb, &backend, &model.name])?;
        let member = session
            .api
            .create_lb_member(&lb, &backend, &model.member(self.member_type))
            .await?;
        info!(loadbalancer = %lb, backend = %backend, name = %member.name, "backend member created");
        encode_state(&MemberModel::from_api(&lb, &backend, &member)?)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: MemberModel = decode_state(state)?;
        let [lb, backend, name] = parse_id::<3>(&model.id)?;
        let member = found(
            session.api.get_lb_member(&lb, &backend, &name).await,
            self.type_name(),
            &model.id,
        )?;
        member
            .map(|m| MemberModel::from_api(&lb, &backend, &m).and_then(|m| encode_state(&m)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: MemberModel = decode_state(prior)?;
        let planned: MemberModel = decode_state(planned)?;
        let [lb, backend, name] = parse_id::<3>(&prior.id)?;
        child_id(&[&lb, &backend, &planned.name])?;

        let member = session
            .api
            .modify_lb_member(&lb, &backend, &name, &planned.member(self.member_type))
            .await?;
        encode_state(&MemberModel::from_api(&lb, &backend, &member)?)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: MemberModel = decode_state(state)?;
        let [lb, backend, name] = parse_id::<3>(&model.id)?;
        session.api.delete_lb_member(&lb, &backend, &name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::session;
    use crate::resources::LoadBalancerResource;
    use serde_json::json;
    use std::sync::Arc;

    async fn load_balancer(session: &Session) -> String {
        let state = LoadBalancerResource
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
        state["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_backend_rename_changes_id() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer(&session).await;

        let state = LoadBalancerBackendResource
            .create(
                &session,
                json!({"loadbalancer": lb, "name": "web", "properties": {"timeout_server": 30}}),
            )
            .await
            .unwrap();
        assert_eq!(state["id"], format!("{}/web", lb));
        assert_eq!(state["properties"]["timeout_server"], 30);

        let mut planned = state.clone();
        planned["name"] = json!("app");
        let updated = LoadBalancerBackendResource
            .update(&session, state, planned)
            .await
            .unwrap();
        assert_eq!(updated["id"], format!("{}/app", lb));
    }

    #[tokio::test]
    async fn test_members_show_up_on_backend() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer(&session).await;
        let backend = LoadBalancerBackendResource
            .create(&session, json!({"loadbalancer": lb, "name": "web"}))
            .await
            .unwrap();

        let member = BackendMemberResource::static_members()
            .create(
                &session,
                json!({
                    "backend": backend["id"],
                    "name": "srv-1",
                    "weight": 100,
                    "max_sessions": 1000,
                    "enabled": true,
                    "ip": "10.0.0.10",
                    "port": 8080
                }),
            )
            .await
            .unwrap();
        assert_eq!(member["id"], format!("{}/web/srv-1", lb));
        assert_eq!(member["backend"], backend["id"]);

        let refreshed = LoadBalancerBackendResource
            .read(&session, backend)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed["members"], json!(["srv-1"]));

        let mut planned = member.clone();
        planned["weight"] = json!(50);
        let updated = BackendMemberResource::static_members()
            .update(&session, member, planned)
            .await
            .unwrap();
        assert_eq!(updated["weight"], 50);
    }

    #[tokio::test]
    async fn test_dynamic_member_without_address() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer(&session).await;
        let backend = LoadBalancerBackendResource
            .create(&session, json!({"loadbalancer": lb, "name": "dyn"}))
            .await
            .unwrap();

        let resource = BackendMemberResource::dynamic_members();
        let config = json!({
            "backend": backend["id"],
            "name": "slot-1",
            "weight": 0,
            "max_sessions": 0,
            "enabled": false
        });
        assert!(resource.validate(&config).is_empty());

        let state = resource.create(&session, config).await.unwrap();
        assert!(state["ip"].is_null());

        resource.delete(&session, state.clone()).await.unwrap();
        assert!(resource.read(&session, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_name_with_separator_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer(&session).await;

        let config = json!({"loadbalancer": lb, "name": "a/b"});
        assert!(LoadBalancerBackendResource
            .validate(&config)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("name")));

        let err = LoadBalancerBackendResource
            .create(&session, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);
        assert!(!fake.calls().iter().any(|c| c.starts_with("create_lb_backend")));
    }

    #[tokio::test]
    async fn test_member_name_with_separator_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let lb = load_balancer(&session).await;
        let backend = LoadBalancerBackendResource
            .create(&session, json!({"loadbalancer": lb, "name": "web"}))
            .await
            .unwrap();

        let resource = BackendMemberResource::static_members();
        let config = json!({
            "backend": backend["id"],
            "name": "srv/1",
            "weight": 100,
            "max_sessions": 10,
            "ip": "10.0.0.10",
            "port": 8080
        });
        assert!(resource
            .validate(&config)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("name")));

        let err = resource.create(&session, config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);
        assert!(!fake.calls().iter().any(|c| c.starts_with("create_lb_member")));
    }

    #[test]
    fn test_member_validation() {
        let resource = BackendMemberResource::static_members();
        let diagnostics = resource.validate(&json!({
            "backend": "lb/web",
            "name": "srv",
            "weight": 101,
            "max_sessions": 10,
            "port": 8080
        }));
        let attrs: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert!(attrs.contains(&"ip"));
        assert!(attrs.contains(&"weight"));
    }
}
