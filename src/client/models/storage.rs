use serde::{Deserialize, Serialize};

/// An object storage instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorage {
    /// Instance UUID.
    pub uuid: String,
    /// Instance name, also part of its URL.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Zone.
    pub zone: String,
    /// Size in gigabytes.
    pub size: i64,
    /// Service state, e.g. `started`.
    #[serde(default)]
    pub state: String,
    /// Endpoint URL.
    #[serde(default)]
    pub url: String,
    /// Creation time.
    #[serde(default)]
    pub created: String,
}

/// Body of an object storage create request.
///
/// The API stores the keys but never returns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateObjectStorageRequest {
    /// Instance name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Zone.
    pub zone: String,
    /// Size in gigabytes.
    pub size: i64,
    /// S3 access key.
    pub access_key: String,
    /// S3 secret key.
    pub secret_key: String,
}

/// Body of an object storage modify request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyObjectStorageRequest {
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// New access key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// New secret key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}
