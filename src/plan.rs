//! Provider-side plan modifiers.
//!
//! The runtime sends the proposed state (configuration merged with prior
//! state) and this module turns it into a [`PlanResult`]:
//!
//! 1. unset attributes with a schema default get that default
//! 2. unset computed attributes keep their prior value
//! 3. a changed `force_new` attribute or block marks the plan as a
//!    replacement, and read-only values such as `id` become unknown again
//! 4. attribute level changes are listed in schema order
//!
//! A null proposed state plans a destroy.

use serde_json::{Map, Value};
use tracing::debug;

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

/// Plan one resource against its schema.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior_obj = prior.and_then(Value::as_object);

    if proposed.is_null() {
        let changes = prior_obj
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let mut planned: Map<String, Value> = proposed.as_object().cloned().unwrap_or_default();

    for (name, attr) in &schema.block.attributes {
        if !is_unset(planned.get(name)) {
            continue;
        }
        if let Some(default) = &attr.default {
            planned.insert(name.clone(), default.clone());
        } else if attr.flags.computed {
            if let Some(prior_value) = prior_obj.and_then(|p| p.get(name)) {
                planned.insert(name.clone(), prior_value.clone());
            }
        }
    }

    let requires_replace = match prior_obj {
        Some(prior_obj) => {
            let attr_replace = schema
                .block
                .attributes
                .iter()
                .filter(|(_, attr)| attr.force_new)
                .any(|(name, _)| differs(prior_obj.get(name), planned.get(name)));
            let block_replace = schema
                .block
                .blocks
                .iter()
                .filter(|(_, block)| block.force_new)
                .any(|(name, _)| differs(prior_obj.get(name), planned.get(name)));
            attr_replace || block_replace
        },
        None => false,
    };

    if requires_replace {
        for (name, attr) in &schema.block.attributes {
            if attr.is_read_only() {
                planned.insert(name.clone(), Value::Null);
            }
        }
    }

    let names = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys());

    let mut changes = Vec::new();
    for name in names {
        let before = prior_obj.and_then(|p| p.get(name)).filter(|v| !v.is_null());
        let after = planned.get(name).filter(|v| !v.is_null());
        match (before, after) {
            (None, Some(after)) => changes.push(AttributeChange::added(name, after.clone())),
            (Some(before), None) => {
                changes.push(AttributeChange::removed(name, before.clone()))
            },
            (Some(before), Some(after)) if before != after => changes.push(
                AttributeChange::modified(name, before.clone(), after.clone()),
            ),
            _ => {},
        }
    }

    debug!(
        changes = changes.len(),
        requires_replace,
        is_create = prior_obj.is_none(),
        "planned resource"
    );

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn is_unset(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}

fn differs(prior: Option<&Value>, planned: Option<&Value>) -> bool {
    let prior = prior.filter(|v| !v.is_null());
    let planned = planned.filter(|v| !v.is_null());
    prior != planned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock};
    use serde_json::json;

    fn cluster_schema() -> Schema {
        Schema::v0()
            .with_id("UUID of the cluster.")
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("zone", Attribute::required_string().with_force_new())
            .with_attribute(
                "plan",
                Attribute::optional_string().with_default(json!("development")),
            )
            .with_attribute("state", Attribute::computed_string())
            .with_attribute("version", Attribute::optional_computed_string().with_force_new())
            .with_attribute("control_plane_ip_filter", Attribute::optional_labels())
            .with_block(
                "network",
                NestedBlock::single(Block::new().with_attribute("id", Attribute::required_string()))
                    .with_force_new(),
            )
    }

    #[test]
    fn test_create_applies_defaults_and_lists_changes() {
        let proposed = json!({"name": "k8s", "zone": "de-fra1", "network": {"id": "net"}});
        let result = plan_resource(&cluster_schema(), None, &proposed);

        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["plan"], "development");
        let paths: Vec<_> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "plan", "zone", "network"]);
        assert!(result.changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn test_update_carries_computed_values() {
        let prior = json!({
            "id": "0ddab8f4",
            "name": "k8s",
            "zone": "de-fra1",
            "plan": "development",
            "state": "running",
            "version": "1.30",
            "network": {"id": "net"}
        });
        let proposed = json!({
            "id": null,
            "name": "k8s",
            "zone": "de-fra1",
            "plan": "production",
            "state": null,
            "version": null,
            "network": {"id": "net"}
        });

        let result = plan_resource(&cluster_schema(), Some(&prior), &proposed);

        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["id"], "0ddab8f4");
        assert_eq!(result.planned_state["state"], "running");
        assert_eq!(result.planned_state["version"], "1.30");
        assert_eq!(
            result.changes,
            vec![AttributeChange::modified("plan", json!("development"), json!("production"))]
        );
    }

    #[test]
    fn test_no_change() {
        let prior = json!({"id": "x", "name": "k8s", "zone": "z", "plan": "development", "network": {"id": "n"}});
        let result = plan_resource(&cluster_schema(), Some(&prior), &prior);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_force_new_attribute_requires_replace() {
        let prior = json!({"id": "x", "name": "k8s", "zone": "de-fra1", "state": "running", "network": {"id": "n"}});
        let proposed = json!({"name": "k8s", "zone": "fi-hel1", "network": {"id": "n"}});

        let result = plan_resource(&cluster_schema(), Some(&prior), &proposed);

        assert!(result.requires_replace);
        assert!(result.planned_state["id"].is_null());
        assert!(result.planned_state["state"].is_null());
        assert!(result.changes.iter().any(|c| c.path == "zone"));
    }

    #[test]
    fn test_force_new_block_requires_replace() {
        let prior = json!({"id": "x", "name": "k8s", "zone": "z", "network": {"id": "a"}});
        let proposed = json!({"name": "k8s", "zone": "z", "network": {"id": "b"}});
        assert!(plan_resource(&cluster_schema(), Some(&prior), &proposed).requires_replace);
    }

    #[test]
    fn test_destroy() {
        let prior = json!({"id": "x", "name": "k8s", "state": null});
        let result = plan_resource(&cluster_schema(), Some(&prior), &Value::Null);
        assert!(result.planned_state.is_null());
        assert_eq!(result.changes.len(), 2);
        assert!(result.changes.iter().all(|c| c.after.is_none()));
    }
}
