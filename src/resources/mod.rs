//! Resource adapters.
//!
//! Each adapter owns one resource type: its schema and the translation of
//! the create/read/update/delete/import lifecycle into [`CloudApi`] calls.
//! State documents are decoded once into a typed model at the adapter
//! boundary and encoded back after the API answered.
//!
//! Error policy: a `NotFound` during read removes the resource from state;
//! every other error aborts the operation and is reported as is. Nothing is
//! rolled back.

mod gateway;
mod kubernetes;
mod loadbalancer;
mod loadbalancer_backend;
mod loadbalancer_frontend;
mod loadbalancer_rule;
mod network_peering;
mod object_storage;
mod router;

pub use gateway::GatewayResource;
pub use kubernetes::{KubernetesClusterResource, KubernetesNodeGroupResource};
pub use loadbalancer::LoadBalancerResource;
pub use loadbalancer_backend::{BackendMemberResource, LoadBalancerBackendResource};
pub use loadbalancer_frontend::LoadBalancerFrontendResource;
pub use loadbalancer_rule::FrontendRuleResource;
pub use network_peering::NetworkPeeringResource;
pub use object_storage::ObjectStorageResource;
pub use router::RouterResource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::client::CloudApi;
use crate::error::ProviderError;
use crate::id::{marshal_id, unmarshal_id, SEPARATOR};
use crate::poll::{Cancellation, PollPolicy};
use crate::schema::{Diagnostic, Schema};
use crate::validation;

/// Everything an adapter needs to talk to the cloud during one operation.
#[derive(Clone)]
pub struct Session {
    /// The API client.
    pub api: Arc<dyn CloudApi>,
    /// Fires when the provider is stopped.
    pub cancel: Cancellation,
    poll_interval: Option<Duration>,
}

impl Session {
    /// Create a session.
    pub fn new(api: Arc<dyn CloudApi>, cancel: Cancellation) -> Self {
        Self {
            api,
            cancel,
            poll_interval: None,
        }
    }

    /// Poll every adapter with this interval instead of its own.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// The effective policy for an adapter's default `policy`.
    pub fn poll_policy(&self, policy: PollPolicy) -> PollPolicy {
        match self.poll_interval {
            Some(interval) => policy.with_interval(interval),
            None => policy,
        }
    }
}

/// One managed resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `upcloud_gateway`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource.
    fn schema(&self) -> Schema;

    /// Validate a configuration. Defaults to schema validation.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Create the remote object and return its state.
    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh the state. `None` means the remote object is gone.
    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError>;

    /// Apply the planned state to an existing object.
    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError>;

    /// Import an existing object by ID.
    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError> {
        self.read(session, json!({ "id": id }))
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "cannot import non-existent remote object {} {}",
                    self.type_name(),
                    id
                ))
            })
    }
}

/// Every resource adapter.
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(RouterResource),
        Arc::new(NetworkPeeringResource),
        Arc::new(GatewayResource),
        Arc::new(KubernetesClusterResource),
        Arc::new(KubernetesNodeGroupResource),
        Arc::new(LoadBalancerResource),
        Arc::new(LoadBalancerBackendResource),
        Arc::new(BackendMemberResource::static_members()),
        Arc::new(BackendMemberResource::dynamic_members()),
        Arc::new(LoadBalancerFrontendResource),
        Arc::new(FrontendRuleResource),
        Arc::new(ObjectStorageResource),
    ]
}

/// Decode a state or plan document into an adapter model.
///
/// Null values mean "unset" or "not known yet" and are dropped first, so
/// models can rely on `#[serde(default)]`.
pub(crate) fn decode_state<T: DeserializeOwned>(state: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(strip_nulls(state))?)
}

/// Decode the provider block, treating nulls as unset.
pub(crate) fn decode_config<T: DeserializeOwned>(config: &Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(strip_nulls(config.clone()))?)
}

/// Encode an adapter model as a state document.
pub(crate) fn encode_state<T: Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Split a composite ID of a known arity.
pub(crate) fn parse_id<const N: usize>(id: &str) -> Result<[String; N], ProviderError> {
    Ok(unmarshal_id::<N>(id)?)
}

/// Build the ID a child object will get before anything is sent, so a name
/// that cannot be addressed never reaches the API.
pub(crate) fn child_id(components: &[&str]) -> Result<String, ProviderError> {
    marshal_id(components).map_err(|e| ProviderError::Validation(e.to_string()))
}

/// Reject names that end up as a component of a composite ID.
pub(crate) fn id_component_diagnostics(config: &Value, attributes: &[&str]) -> Vec<Diagnostic> {
    attributes
        .iter()
        .filter_map(|&name| {
            let value = config.get(name)?.as_str()?;
            value.contains(SEPARATOR).then(|| {
                Diagnostic::error(format!("Invalid value for attribute '{}'", name))
                    .with_detail(format!(
                        "'{}' must not contain '{}', it is part of the resource ID",
                        value, SEPARATOR
                    ))
                    .with_attribute(name)
            })
        })
        .collect()
}

/// Turn a lookup result into "found" or "gone".
pub(crate) fn found<T>(
    result: Result<T, ProviderError>,
    type_name: &str,
    id: &str,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(object) => Ok(Some(object)),
        Err(e) if e.is_not_found() => {
            warn!(resource_type = type_name, id, "remote object not found, removing from state");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

/// Poll policy of the adapters that wait for an operational state.
pub(crate) const STATE_POLL: PollPolicy = PollPolicy::new(360, Duration::from_secs(5));


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_strip_nulls() {
        let value = json!({"a": null, "b": {"c": null, "d": 1}, "e": [{"f": null}]});
        assert_eq!(strip_nulls(value), json!({"b": {"d": 1}, "e": [{}]}));
    }

    #[test]
    fn test_id_component_diagnostics() {
        let config = json!({"name": "a/b", "backend_name": "web", "port": 80});
        let diagnostics = id_component_diagnostics(&config, &["name", "backend_name", "port"]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
        assert!(diagnostics[0].detail.as_deref().unwrap_or("").contains("a/b"));

        assert!(matches!(
            child_id(&["lb", "a/b"]),
            Err(ProviderError::Validation(_))
        ));
        assert_eq!(child_id(&["lb", "web"]).unwrap(), "lb/web");
    }

    #[test]
    fn test_registry_names_are_unique() {
        let names: BTreeSet<_> = all().iter().map(|r| r.type_name()).collect();
        assert_eq!(names.len(), all().len());
        assert!(names.contains("upcloud_loadbalancer_dynamic_backend_member"));
    }

    #[test]
    fn test_every_schema_has_an_id() {
        for resource in all() {
            let schema = resource.schema();
            let id = schema.block.attributes.get("id");
            assert!(
                id.map(|a| a.is_read_only()).unwrap_or(false),
                "{} has no computed id",
                resource.type_name()
            );
        }
    }

    #[test]
    fn test_session_poll_override() {
        let policy = PollPolicy::new(3, Duration::from_secs(5));
        let session = Session::new(
            Arc::new(crate::client::fake::FakeCloud::new()),
            Cancellation::never(),
        );
        assert_eq!(session.poll_policy(policy), policy);

        let session = session.with_poll_interval(Duration::from_millis(1));
        assert_eq!(
            session.poll_policy(policy).interval,
            Duration::from_millis(1)
        );
    }
}
