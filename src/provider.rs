//! The UpCloud provider: registry of resource adapters and data sources
//! behind the [`ProviderService`] trait.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{CloudApi, HttpClient};
use crate::config::ProviderConfig;
use crate::datasources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::poll::{retry_on_auth_failure, PollPolicy, StopSignal};
use crate::resources::{self, Resource, Session};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

const LOGIN_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Where the API client comes from once the provider is configured.
enum ApiSource {
    /// Build an [`HttpClient`] from the resolved credentials.
    Http,
    /// Use this client. Credentials are still resolved and checked.
    Fixed(Arc<dyn CloudApi>),
}

/// The UpCloud provider.
pub struct UpCloudProvider {
    version: String,
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
    api: ApiSource,
    session: RwLock<Option<Session>>,
    stop: StopSignal,
    login_interval: Duration,
    poll_interval: Option<Duration>,
}

impl UpCloudProvider {
    /// Create a provider. `version` is reported in the API user agent.
    pub fn new(version: impl Into<String>) -> Self {
        Self::build(version.into(), ApiSource::Http)
    }

    /// Create a provider that talks to `api` instead of the public endpoint.
    pub fn with_api(version: impl Into<String>, api: Arc<dyn CloudApi>) -> Self {
        Self::build(version.into(), ApiSource::Fixed(api))
    }

    fn build(version: String, api: ApiSource) -> Self {
        let resources = resources::all()
            .into_iter()
            .map(|r| (r.type_name(), r))
            .collect();
        let data_sources = datasources::all()
            .into_iter()
            .map(|d| (d.type_name(), d))
            .collect();
        Self {
            version,
            resources,
            data_sources,
            api,
            session: RwLock::new(None),
            stop: StopSignal::new(),
            login_interval: LOGIN_RETRY_INTERVAL,
            poll_interval: None,
        }
    }

    /// Wait this long between login attempts.
    pub fn with_login_interval(mut self, interval: Duration) -> Self {
        self.login_interval = interval;
        self
    }

    /// Poll state transitions with this interval instead of the adapters' own.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Provider version.
    pub fn version(&self) -> &str {
        &self.version
    }

    fn resource(&self, resource_type: &str) -> Result<Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<Arc<dyn DataSource>, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    async fn session(&self) -> Result<Session, ProviderError> {
        self.session.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider is not configured".to_string())
        })
    }
}

#[async_trait::async_trait]
impl ProviderService for UpCloudProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, (name, r)| s.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |s, (name, d)| s.with_data_source(*name, d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&ProviderConfig::schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(&config)?.with_env_fallback();
        debug!(config = ?config, "configuring provider");

        let credentials = match config.credentials() {
            Ok(credentials) => credentials,
            Err(e) => return Ok(vec![Diagnostic::from_error("Missing UpCloud credentials", &e)]),
        };
        let api: Arc<dyn CloudApi> = match &self.api {
            ApiSource::Http => Arc::new(HttpClient::new(
                credentials,
                config.request_timeout(),
                &self.version,
            )?),
            ApiSource::Fixed(api) => Arc::clone(api),
        };

        let policy = PollPolicy::new(config.login_retries, self.login_interval);
        let account = retry_on_auth_failure(policy, || api.get_account()).await?;
        info!(username = %account.username, "logged in to UpCloud");

        let mut session = Session::new(api, self.stop.cancellation());
        if let Some(interval) = self.poll_interval {
            session = session.with_poll_interval(interval);
        }
        *self.session.write().await = Some(session);
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("stopping provider, cancelling in-flight waits");
        self.stop.stop();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(plan_resource(
            &resource.schema(),
            prior_state.as_ref(),
            &proposed_state,
        ))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.session().await?;
        resource.create(&session, planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.session().await?;
        resource.read(&session, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.session().await?;
        resource.update(&session, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.session().await?;
        resource.delete(&session, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.session().await?;
        let state = resource.import(&session, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let diagnostics = data_source.validate(&config);
        if has_errors(&diagnostics) {
            let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
            return Err(ProviderError::Validation(summaries.join("; ")));
        }
        let session = self.session().await?;
        data_source.read(&session, config).await
    }
}
