//! Typed request and response bodies of the UpCloud API.
//!
//! These mirror the JSON the API speaks. Resource adapters translate between
//! these and the provider's state documents.

mod kubernetes;
mod loadbalancer;
mod network;
mod rules;
mod storage;

pub use kubernetes::*;
pub use loadbalancer::*;
pub use network::*;
pub use rules::*;
pub use storage::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account username.
    pub username: String,
    /// Remaining credits.
    #[serde(default)]
    pub credits: f64,
}

/// A key/value label as sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

/// Convert a labels map from state into the API's list form.
pub fn labels_from_map(labels: &BTreeMap<String, String>) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// Convert the API's labels into the map stored in state.
pub fn labels_to_map(labels: &[Label]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|l| (l.key.clone(), l.value.clone()))
        .collect()
}

/// A reference to another object by UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidRef {
    /// UUID of the referenced object.
    pub uuid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_conversion() {
        let mut map = BTreeMap::new();
        map.insert("env".to_string(), "prod".to_string());
        map.insert("team".to_string(), "net".to_string());

        let list = labels_from_map(&map);
        assert_eq!(list[0].key, "env");
        assert_eq!(labels_to_map(&list), map);
    }
}
