use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, encode_state, found, Resource, Session};
use crate::client::models::{CreateObjectStorageRequest, ModifyObjectStorageRequest, ObjectStorage};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// `upcloud_object_storage`: an S3 compatible object storage instance.
///
/// The API never returns the access keys, so they are carried over from
/// state on every read.
pub struct ObjectStorageResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ObjectStorageModel {
    id: String,
    name: String,
    description: String,
    zone: String,
    size: i64,
    access_key: Option<String>,
    secret_key: Option<String>,
    state: String,
    url: String,
    created: String,
}

impl ObjectStorageModel {
    fn from_api(storage: &ObjectStorage, keys: &ObjectStorageModel) -> Self {
        Self {
            id: storage.uuid.clone(),
            name: storage.name.clone(),
            description: storage.description.clone(),
            zone: storage.zone.clone(),
            size: storage.size,
            access_key: keys.access_key.clone(),
            secret_key: keys.secret_key.clone(),
            state: storage.state.clone(),
            url: storage.url.clone(),
            created: storage.created.clone(),
        }
    }

    /// Access and secret key, from config or the environment.
    fn resolve_keys(&self) -> Result<(String, String), ProviderError> {
        let access = self
            .access_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| key_from_env("ACCESS_KEY", &self.name));
        let secret = self
            .secret_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| key_from_env("SECRET_KEY", &self.name));

        match (access, secret) {
            (Some(access), Some(secret)) => Ok((access, secret)),
            _ => Err(ProviderError::Configuration(format!(
                "access_key and secret_key must be set for object storage '{}', either in config or in {} and {}",
                self.name,
                env_var("ACCESS_KEY", &self.name),
                env_var("SECRET_KEY", &self.name),
            ))),
        }
    }
}

fn env_var(kind: &str, name: &str) -> String {
    format!(
        "UPCLOUD_OBJECT_STORAGE_{}_{}",
        kind,
        name.to_uppercase().replace('-', "_")
    )
}

fn key_from_env(kind: &str, name: &str) -> Option<String> {
    let var = env_var(kind, name);
    let value = std::env::var(&var).ok().filter(|v| !v.is_empty());
    if value.is_some() {
        debug!(var = %var, "using object storage key from environment");
    }
    value
}

#[async_trait]
impl Resource for ObjectStorageResource {
    fn type_name(&self) -> &'static str {
        "upcloud_object_storage"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An object storage instance with an S3 compatible API.")
            .with_id("UUID of the object storage instance.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Instance name, part of its URL."),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "zone",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute(
                "size",
                Attribute::required_int64().with_description("Size in gigabytes."),
            )
            .with_attribute(
                "access_key",
                Attribute::optional_string().sensitive().with_description(
                    "Access key. Falls back to UPCLOUD_OBJECT_STORAGE_ACCESS_KEY_{NAME}.",
                ),
            )
            .with_attribute(
                "secret_key",
                Attribute::optional_string().sensitive().with_description(
                    "Secret key. Falls back to UPCLOUD_OBJECT_STORAGE_SECRET_KEY_{NAME}.",
                ),
            )
            .with_attribute("state", Attribute::computed_string())
            .with_attribute(
                "url",
                Attribute::computed_string().with_description("Endpoint URL."),
            )
            .with_attribute("created", Attribute::computed_string())
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let mut model: ObjectStorageModel = decode_state(planned)?;
        let (access_key, secret_key) = model.resolve_keys()?;
        let req = CreateObjectStorageRequest {
            name: model.name.clone(),
            description: model.description.clone(),
            zone: model.zone.clone(),
            size: model.size,
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
        };
        let storage = session.api.create_object_storage(&req).await?;
        info!(uuid = %storage.uuid, "object storage created");

        model.access_key = Some(access_key);
        model.secret_key = Some(secret_key);
        encode_state(&ObjectStorageModel::from_api(&storage, &model))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: ObjectStorageModel = decode_state(state)?;
        let storage = found(
            session.api.get_object_storage(&model.id).await,
            self.type_name(),
            &model.id,
        )?;
        storage
            .map(|s| encode_state(&ObjectStorageModel::from_api(&s, &model)))
            .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ObjectStorageModel = decode_state(prior)?;
        let mut planned: ObjectStorageModel = decode_state(planned)?;
        let (access_key, secret_key) = planned.resolve_keys()?;
        let keys_changed = prior.access_key.as_deref() != Some(access_key.as_str())
            || prior.secret_key.as_deref() != Some(secret_key.as_str());

        let req = ModifyObjectStorageRequest {
            description: Some(planned.description.clone())
                .filter(|d| d != &prior.description),
            size: Some(planned.size).filter(|s| *s != prior.size),
            access_key: Some(access_key.clone()).filter(|_| keys_changed),
            secret_key: Some(secret_key.clone()).filter(|_| keys_changed),
        };
        let storage = session.api.modify_object_storage(&prior.id, &req).await?;

        planned.access_key = Some(access_key);
        planned.secret_key = Some(secret_key);
        encode_state(&ObjectStorageModel::from_api(&storage, &planned))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: ObjectStorageModel = decode_state(state)?;
        session.api.delete_object_storage(&model.id).await
    }
}
