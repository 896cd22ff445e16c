//! Data sources: read-only lookups of existing objects.

mod kubernetes_cluster;

pub use kubernetes_cluster::KubernetesClusterDataSource;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::resources::Session;
use crate::schema::{Diagnostic, Schema};
use crate::validation;

/// One data source type.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Type name, e.g. `upcloud_kubernetes_cluster`.
    fn type_name(&self) -> &'static str;

    /// Schema of the data source.
    fn schema(&self) -> Schema;

    /// Validate a configuration. Defaults to schema validation.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Look the object up and return the full document.
    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError>;
}

/// Every data source.
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![Arc::new(KubernetesClusterDataSource)]
}
