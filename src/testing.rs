//! Harness for driving a [`ProviderService`] the way the runtime does,
//! without a gRPC server in between.
//!
//! ```ignore
//! use upcloud_provider::testing::ProviderTester;
//! use serde_json::json;
//!
//! let tester = ProviderTester::new(UpCloudProvider::new("dev"));
//! tester.configure(json!({"token": "ucat_..."})).await?;
//! let router = tester.lifecycle_create("upcloud_router", json!({"name": "edge"})).await?;
//! tester.lifecycle_delete("upcloud_router", router).await?;
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Wraps a provider and runs plan/apply sequences against it.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Full provider schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names, sorted.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Configure the provider, failing on any error diagnostic.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on any error diagnostic.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a create. The configuration doubles as the proposed state.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan an update of `prior` towards `config`.
    ///
    /// The proposed state is the prior state with the configured values
    /// laid over it, as the runtime would send it.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let proposed = overlay(&prior, &config);
        self.provider
            .plan(resource_type, Some(prior), proposed, config)
            .await
    }

    /// Create from a planned state.
    pub async fn create(&self, resource_type: &str, planned: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned).await
    }

    /// Refresh a state; `None` once the object is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Apply a planned update.
    pub async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.update(resource_type, prior, planned).await
    }

    /// Delete the object behind `state`.
    pub async fn delete(&self, resource_type: &str, state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, state).await
    }

    /// Import by ID.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Plan, create, then read back. Returns the refreshed state.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read_existing(resource_type, created).await
    }

    /// Plan, apply and read back an update. Replacements are applied as
    /// delete followed by create, like the runtime does.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior.clone(), config)
            .await?;
        let applied = if plan.requires_replace {
            self.delete(resource_type, prior).await?;
            self.create(resource_type, plan.planned_state).await?
        } else {
            self.update(resource_type, prior, plan.planned_state).await?
        };
        self.read_existing(resource_type, applied).await
    }

    /// Delete, then check that a read no longer finds the object.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<(), ProviderError> {
        self.delete(resource_type, state.clone()).await?;
        match self.read(resource_type, state).await? {
            None => Ok(()),
            Some(_) => Err(ProviderError::FailedPrecondition(format!(
                "{} still exists after delete",
                resource_type
            ))),
        }
    }

    async fn read_existing(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.read(resource_type, state).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} disappeared right after apply", resource_type))
        })
    }
}

/// Top-level keys of `config` replace those of `prior`; nulls are skipped.
fn overlay(prior: &Value, config: &Value) -> Value {
    let mut merged = prior.clone();
    if let (Some(target), Some(source)) = (merged.as_object_mut(), config.as_object()) {
        for (key, value) in source.iter().filter(|(_, v)| !v.is_null()) {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Failure of a harness step that reports diagnostics.
#[derive(Debug, Error)]
pub enum TestError {
    /// Error diagnostics returned by the provider.
    #[error("{}", describe(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The call itself failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn describe(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!("{} error diagnostic(s):", diagnostics.len());
    for diag in diagnostics {
        out.push_str("\n  ");
        out.push_str(&diag.summary);
        if let Some(detail) = &diag.detail {
            out.push_str(": ");
            out.push_str(detail);
        }
        if let Some(attr) = &diag.attribute {
            out.push_str(&format!(" (at {})", attr));
        }
    }
    out
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    if has_errors(&diagnostics) {
        Err(TestError::Diagnostics(
            diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
        ))
    } else {
        Ok(())
    }
}

/// Panics unless the plan changes `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected a change to '{}', changed: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Panics if the plan has any change.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "expected no changes, got {:?}",
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Panics unless the plan replaces the resource.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(plan.requires_replace, "expected the plan to replace the resource");
}

/// Panics unless some error diagnostic mentions `substring` in its summary
/// or detail.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let matched = diagnostics.iter().filter(|d| d.is_error()).any(|d| {
        d.summary.contains(substring)
            || d.detail.as_deref().is_some_and(|detail| detail.contains(substring))
    });
    assert!(
        matched,
        "expected an error mentioning '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}
