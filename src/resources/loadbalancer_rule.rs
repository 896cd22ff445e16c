use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{
    child_id, decode_state, encode_state, found, id_component_diagnostics, parse_id, Resource,
    Session,
};
use crate::client::models::{
    HttpRedirect, HttpReturn, LoadBalancerFrontendRule, MatchInteger, MatchNamedString,
    MatchNumMembersUp, MatchRange, MatchString, MatchValue, MatcherKind, RuleAction, RuleMatcher,
    SetHeader, UseBackend,
};
use crate::error::ProviderError;
use crate::id::marshal_id;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::validation;

/// `upcloud_loadbalancer_frontend_rule`: matchers plus the actions to run
/// when they match.
///
/// In state, matchers and actions are grouped by kind:
///
/// ```json
/// {
///   "matchers": {"src_port": [{"method": "equal", "value": 80, "inverse": false}]},
///   "actions": {"use_backend": [{"backend_name": "web"}]}
/// }
/// ```
///
/// ID: `<load balancer uuid>/<frontend name>/<rule name>`.
pub struct FrontendRuleResource;

const INTEGER_METHODS: &[&str] = &["equal", "greater", "greater_or_equal", "less", "less_or_equal"];
const STRING_METHODS: &[&str] = &[
    "exact", "substring", "regexp", "starts", "ends", "domain", "ip", "exists",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Inverted<T> {
    #[serde(flatten)]
    inner: T,
    #[serde(default)]
    inverse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumMembersUpModel {
    method: String,
    value: i64,
    backend_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct MatchersModel {
    src_ip: Vec<Inverted<MatchValue>>,
    src_port: Vec<Inverted<MatchInteger>>,
    src_port_range: Vec<Inverted<MatchRange>>,
    body_size: Vec<Inverted<MatchInteger>>,
    body_size_range: Vec<Inverted<MatchRange>>,
    path: Vec<Inverted<MatchString>>,
    url: Vec<Inverted<MatchString>>,
    url_query: Vec<Inverted<MatchString>>,
    host: Vec<Inverted<MatchValue>>,
    http_method: Vec<Inverted<MatchValue>>,
    cookie: Vec<Inverted<MatchNamedString>>,
    header: Vec<Inverted<MatchNamedString>>,
    url_param: Vec<Inverted<MatchNamedString>>,
    num_members_up: Vec<Inverted<NumMembersUpModel>>,
}

fn push_matchers<T: Clone>(
    out: &mut Vec<RuleMatcher>,
    items: &[Inverted<T>],
    kind: fn(T) -> MatcherKind,
) {
    out.extend(items.iter().map(|m| RuleMatcher {
        inverse: m.inverse,
        kind: kind(m.inner.clone()),
    }));
}

impl MatchersModel {
    fn to_api(&self) -> Vec<RuleMatcher> {
        let mut out = Vec::new();
        push_matchers(&mut out, &self.src_ip, MatcherKind::SrcIp);
        push_matchers(&mut out, &self.src_port, MatcherKind::SrcPort);
        push_matchers(&mut out, &self.src_port_range, MatcherKind::SrcPortRange);
        push_matchers(&mut out, &self.body_size, MatcherKind::BodySize);
        push_matchers(&mut out, &self.body_size_range, MatcherKind::BodySizeRange);
        push_matchers(&mut out, &self.path, MatcherKind::Path);
        push_matchers(&mut out, &self.url, MatcherKind::Url);
        push_matchers(&mut out, &self.url_query, MatcherKind::UrlQuery);
        push_matchers(&mut out, &self.host, MatcherKind::Host);
        push_matchers(&mut out, &self.http_method, MatcherKind::HttpMethod);
        push_matchers(&mut out, &self.cookie, MatcherKind::Cookie);
        push_matchers(&mut out, &self.header, MatcherKind::Header);
        push_matchers(&mut out, &self.url_param, MatcherKind::UrlParam);
        push_matchers(&mut out, &self.num_members_up, |m| {
            MatcherKind::NumMembersUp(MatchNumMembersUp {
                method: m.method,
                value: m.value,
                backend: m.backend_name,
            })
        });
        out
    }

    fn from_api(matchers: &[RuleMatcher]) -> Self {
        fn wrap<T>(inner: &T, inverse: bool) -> Inverted<T>
        where
            T: Clone,
        {
            Inverted {
                inner: inner.clone(),
                inverse,
            }
        }

        let mut model = Self::default();
        for m in matchers {
            let inverse = m.inverse;
            match &m.kind {
                MatcherKind::SrcIp(p) => model.src_ip.push(wrap(p, inverse)),
                MatcherKind::SrcPort(p) => model.src_port.push(wrap(p, inverse)),
                MatcherKind::SrcPortRange(p) => model.src_port_range.push(wrap(p, inverse)),
                MatcherKind::BodySize(p) => model.body_size.push(wrap(p, inverse)),
                MatcherKind::BodySizeRange(p) => model.body_size_range.push(wrap(p, inverse)),
                MatcherKind::Path(p) => model.path.push(wrap(p, inverse)),
                MatcherKind::Url(p) => model.url.push(wrap(p, inverse)),
                MatcherKind::UrlQuery(p) => model.url_query.push(wrap(p, inverse)),
                MatcherKind::Host(p) => model.host.push(wrap(p, inverse)),
                MatcherKind::HttpMethod(p) => model.http_method.push(wrap(p, inverse)),
                MatcherKind::Cookie(p) => model.cookie.push(wrap(p, inverse)),
                MatcherKind::Header(p) => model.header.push(wrap(p, inverse)),
                MatcherKind::UrlParam(p) => model.url_param.push(wrap(p, inverse)),
                MatcherKind::NumMembersUp(p) => model.num_members_up.push(Inverted {
                    inner: NumMembersUpModel {
                        method: p.method.clone(),
                        value: p.value,
                        backend_name: p.backend.clone(),
                    },
                    inverse,
                }),
            }
        }
        model
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UseBackendModel {
    backend_name: String,
}

/// Same as the API's fixed response, with the body kept as plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HttpReturnModel {
    status: i64,
    content_type: String,
    payload: String,
}

/// Presence of an action without parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Toggle {
    #[serde(default = "enabled")]
    active: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ActionsModel {
    use_backend: Vec<UseBackendModel>,
    http_return: Vec<HttpReturnModel>,
    http_redirect: Vec<HttpRedirect>,
    tcp_reject: Vec<Toggle>,
    http_reject: Vec<Toggle>,
    set_forwarded_headers: Vec<Toggle>,
    set_request_header: Vec<SetHeader>,
    set_response_header: Vec<SetHeader>,
}

impl ActionsModel {
    fn to_api(&self) -> Result<Vec<RuleAction>, ProviderError> {
        let mut out: Vec<RuleAction> = Vec::new();
        out.extend(self.use_backend.iter().map(|a| {
            RuleAction::UseBackend(UseBackend {
                backend: a.backend_name.clone(),
            })
        }));
        out.extend(self.http_return.iter().map(|a| {
            RuleAction::HttpReturn(HttpReturn {
                status: a.status,
                content_type: a.content_type.clone(),
                payload: a.payload.clone(),
            })
        }));
        for redirect in &self.http_redirect {
            if redirect.location.is_some() == redirect.scheme.is_some() {
                return Err(ProviderError::Validation(
                    "http_redirect needs exactly one of location or scheme".to_string(),
                ));
            }
            out.push(RuleAction::HttpRedirect(redirect.clone()));
        }
        let toggles = [
            (&self.tcp_reject, RuleAction::TcpReject),
            (&self.http_reject, RuleAction::HttpReject),
            (&self.set_forwarded_headers, RuleAction::SetForwardedHeaders),
        ];
        for (items, action) in toggles {
            if items.iter().any(|t| t.active) {
                out.push(action);
            }
        }
        out.extend(
            self.set_request_header
                .iter()
                .cloned()
                .map(RuleAction::SetRequestHeader),
        );
        out.extend(
            self.set_response_header
                .iter()
                .cloned()
                .map(RuleAction::SetResponseHeader),
        );
        Ok(out)
    }

    fn from_api(actions: &[RuleAction]) -> Self {
        let mut model = Self::default();
        let on = || Toggle { active: true };
        for action in actions {
            match action {
                RuleAction::UseBackend(a) => model.use_backend.push(UseBackendModel {
                    backend_name: a.backend.clone(),
                }),
                RuleAction::HttpReturn(a) => model.http_return.push(HttpReturnModel {
                    status: a.status,
                    content_type: a.content_type.clone(),
                    payload: a.payload.clone(),
                }),
                RuleAction::HttpRedirect(a) => model.http_redirect.push(a.clone()),
                RuleAction::TcpReject => model.tcp_reject.push(on()),
                RuleAction::HttpReject => model.http_reject.push(on()),
                RuleAction::SetForwardedHeaders => model.set_forwarded_headers.push(on()),
                RuleAction::SetRequestHeader(a) => model.set_request_header.push(a.clone()),
                RuleAction::SetResponseHeader(a) => model.set_response_header.push(a.clone()),
            }
        }
        model
    }

    /// The API only lists actions that are on, so a toggle configured with
    /// `active = false` is carried over from `configured`.
    fn keep_inactive_toggles(mut self, configured: &ActionsModel) -> Self {
        let pairs = [
            (&mut self.tcp_reject, &configured.tcp_reject),
            (&mut self.http_reject, &configured.http_reject),
            (&mut self.set_forwarded_headers, &configured.set_forwarded_headers),
        ];
        for (read, wanted) in pairs {
            if read.is_empty() && !wanted.is_empty() && wanted.iter().all(|t| !t.active) {
                read.clone_from(wanted);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RuleModel {
    id: String,
    frontend: String,
    name: String,
    priority: i64,
    matching_condition: String,
    matchers: MatchersModel,
    actions: ActionsModel,
}

impl RuleModel {
    fn rule(&self) -> Result<LoadBalancerFrontendRule, ProviderError> {
        Ok(LoadBalancerFrontendRule {
            name: self.name.clone(),
            priority: self.priority,
            matching_condition: if self.matching_condition.is_empty() {
                "and".to_string()
            } else {
                self.matching_condition.clone()
            },
            matchers: self.matchers.to_api(),
            actions: self.actions.to_api()?,
        })
    }

    fn from_api(
        lb: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
        configured: &ActionsModel,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            id: marshal_id(&[lb, frontend, &rule.name])?,
            frontend: marshal_id(&[lb, frontend])?,
            name: rule.name.clone(),
            priority: rule.priority,
            matching_condition: rule.matching_condition.clone(),
            matchers: MatchersModel::from_api(&rule.matchers),
            actions: ActionsModel::from_api(&rule.actions).keep_inactive_toggles(configured),
        })
    }
}

// ============================================================================
// Schema
// ============================================================================

fn matcher(block: Block) -> NestedBlock {
    NestedBlock::list(block.with_attribute(
        "inverse",
        Attribute::optional_bool()
            .with_default(Value::Bool(false))
            .with_description("Negate the matcher."),
    ))
}

fn value_matcher(description: &str) -> NestedBlock {
    matcher(
        Block::new()
            .with_description(description)
            .with_attribute("value", Attribute::required_string()),
    )
}

fn integer_matcher(description: &str) -> NestedBlock {
    matcher(
        Block::new()
            .with_description(description)
            .with_attribute(
                "method",
                Attribute::required_string().with_allowed_strings(INTEGER_METHODS),
            )
            .with_attribute("value", Attribute::required_int64()),
    )
}

fn range_matcher(description: &str) -> NestedBlock {
    matcher(
        Block::new()
            .with_description(description)
            .with_attribute("range_start", Attribute::required_int64())
            .with_attribute("range_end", Attribute::required_int64()),
    )
}

fn string_matcher(description: &str, named: bool) -> NestedBlock {
    let mut block = Block::new().with_description(description);
    if named {
        block = block.with_attribute("name", Attribute::required_string());
    }
    matcher(
        block
            .with_attribute(
                "method",
                Attribute::required_string().with_allowed_strings(STRING_METHODS),
            )
            .with_attribute("value", Attribute::optional_string())
            .with_attribute(
                "ignore_case",
                Attribute::optional_bool().with_default(Value::Bool(false)),
            ),
    )
}

fn toggle_action(description: &str) -> NestedBlock {
    NestedBlock::list(
        Block::new().with_description(description).with_attribute(
            "active",
            Attribute::optional_bool().with_default(Value::Bool(true)),
        ),
    )
    .with_max_items(1)
}

fn header_action(description: &str) -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description(description)
            .with_attribute("header", Attribute::required_string())
            .with_attribute("value", Attribute::optional_string()),
    )
}

fn matchers_block() -> Block {
    Block::new()
        .with_description("Conditions, combined with `matching_condition`.")
        .with_block("src_ip", value_matcher("Client IP address or CIDR."))
        .with_block("src_port", integer_matcher("Client port."))
        .with_block("src_port_range", range_matcher("Client port range."))
        .with_block("body_size", integer_matcher("Request body size in bytes."))
        .with_block("body_size_range", range_matcher("Request body size range."))
        .with_block("path", string_matcher("Request path.", false))
        .with_block("url", string_matcher("Request URL.", false))
        .with_block("url_query", string_matcher("URL query string.", false))
        .with_block("host", value_matcher("Host header."))
        .with_block("http_method", value_matcher("HTTP method, e.g. `GET`."))
        .with_block("cookie", string_matcher("Named cookie.", true))
        .with_block("header", string_matcher("Named request header.", true))
        .with_block("url_param", string_matcher("Named URL parameter.", true))
        .with_block(
            "num_members_up",
            matcher(
                Block::new()
                    .with_description("Number of healthy members in a backend.")
                    .with_attribute(
                        "method",
                        Attribute::required_string().with_allowed_strings(INTEGER_METHODS),
                    )
                    .with_attribute("value", Attribute::required_int64())
                    .with_attribute("backend_name", Attribute::required_string()),
            ),
        )
}

fn actions_block() -> Block {
    Block::new()
        .with_description("What to do with matching requests.")
        .with_block(
            "use_backend",
            NestedBlock::list(
                Block::new().with_attribute("backend_name", Attribute::required_string()),
            )
            .with_max_items(1),
        )
        .with_block(
            "http_return",
            NestedBlock::list(
                Block::new()
                    .with_description("Answer with a fixed response.")
                    .with_attribute("status", Attribute::required_int64())
                    .with_attribute("content_type", Attribute::required_string())
                    .with_attribute(
                        "payload",
                        Attribute::required_string().with_description("Response body as text."),
                    ),
            )
            .with_max_items(1),
        )
        .with_block(
            "http_redirect",
            NestedBlock::list(
                Block::new()
                    .with_description("Redirect. Set either `location` or `scheme`.")
                    .with_attribute("location", Attribute::optional_string())
                    .with_attribute(
                        "scheme",
                        Attribute::optional_string().with_allowed_strings(&["http", "https"]),
                    ),
            )
            .with_max_items(1),
        )
        .with_block("tcp_reject", toggle_action("Close the connection."))
        .with_block("http_reject", toggle_action("Answer with 403."))
        .with_block(
            "set_forwarded_headers",
            toggle_action("Add X-Forwarded-For, X-Forwarded-Proto and X-Forwarded-Port."),
        )
        .with_block("set_request_header", header_action("Set a request header."))
        .with_block("set_response_header", header_action("Set a response header."))
}

fn redirect_diagnostics(config: &Value) -> Vec<Diagnostic> {
    let redirects = config
        .get("actions")
        .and_then(|a| a.get("http_redirect"))
        .and_then(Value::as_array);
    let Some(redirects) = redirects else {
        return Vec::new();
    };

    redirects
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let set = |k: &str| r.get(k).map_or(false, |v| !v.is_null());
            set("location") == set("scheme")
        })
        .map(|(i, _)| {
            Diagnostic::error("Invalid http_redirect action")
                .with_detail("Exactly one of location or scheme must be set")
                .with_attribute(format!("actions.http_redirect.{}", i))
        })
        .collect()
}

#[async_trait]
impl Resource for FrontendRuleResource {
    fn type_name(&self) -> &'static str {
        "upcloud_loadbalancer_frontend_rule"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A rule of a load balancer frontend.")
            .with_id("Load balancer UUID, frontend name and rule name joined with `/`.")
            .with_attribute(
                "frontend",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the frontend."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "priority",
                Attribute::required_int64()
                    .with_description("Rules with a higher priority are evaluated first."),
            )
            .with_attribute(
                "matching_condition",
                Attribute::optional_string()
                    .with_default(Value::from("and"))
                    .with_allowed_strings(&["and", "or"]),
            )
            .with_block("matchers", NestedBlock::single(matchers_block()))
            .with_block("actions", NestedBlock::single(actions_block()))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        diagnostics.extend(redirect_diagnostics(config));
        diagnostics.extend(id_component_diagnostics(config, &["name"]));
        diagnostics
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let model: RuleModel = decode_state(planned)?;
        let [lb, frontend] = parse_id::<2>(&model.frontend)?;
        child_id(&[&lb, &frontend, &model.name])?;
        let rule = session
            .api
            .create_lb_frontend_rule(&lb, &frontend, &model.rule()?)
            .await?;
        info!(loadbalancer = %lb, frontend = %frontend, name = %rule.name, "frontend rule created");
        encode_state(&RuleModel::from_api(&lb, &frontend, &rule, &model.actions)?)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: RuleModel = decode_state(state)?;
        let [lb, frontend, name] = parse_id::<3>(&model.id)?;
        let rule = found(
            session.api.get_lb_frontend_rule(&lb, &frontend, &name).await,
            self.type_name(),
            &model.id,
        )?;
        rule.map(|r| {
            RuleModel::from_api(&lb, &frontend, &r, &model.actions).and_then(|m| encode_state(&m))
        })
        .transpose()
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: RuleModel = decode_state(prior)?;
        let planned: RuleModel = decode_state(planned)?;
        let [lb, frontend, name] = parse_id::<3>(&prior.id)?;
        child_id(&[&lb, &frontend, &planned.name])?;

        let rule = session
            .api
            .replace_lb_frontend_rule(&lb, &frontend, &name, &planned.rule()?)
            .await?;
        encode_state(&RuleModel::from_api(&lb, &frontend, &rule, &planned.actions)?)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let model: RuleModel = decode_state(state)?;
        let [lb, frontend, name] = parse_id::<3>(&model.id)?;
        session
            .api
            .delete_lb_frontend_rule(&lb, &frontend, &name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::client::CloudApi;
    use crate::resources::test_support::session;
    use crate::resources::{
        LoadBalancerBackendResource, LoadBalancerFrontendResource, LoadBalancerResource,
    };
    use serde_json::json;
    use std::sync::Arc;

    async fn frontend(session: &Session) -> String {
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
        for name in ["web", "static"] {
            LoadBalancerBackendResource
                .create(session, json!({"loadbalancer": lb, "name": name}))
                .await
                .unwrap();
        }
        let frontend = LoadBalancerFrontendResource
            .create(
                session,
                json!({
                    "loadbalancer": lb,
                    "name": "http",
                    "mode": "http",
                    "port": 80,
                    "default_backend_name": "web",
                    "networks": [{"name": "public"}]
                }),
            )
            .await
            .unwrap();
        frontend["id"].as_str().unwrap().to_string()
    }

    fn config(frontend: &str) -> Value {
        json!({
            "frontend": frontend,
            "name": "assets",
            "priority": 10,
            "matching_condition": "or",
            "matchers": {
                "path": [{"method": "starts", "value": "/assets", "ignore_case": false, "inverse": false}],
                "header": [{"name": "X-Static", "method": "exists", "inverse": true}],
                "num_members_up": [{"method": "greater", "value": 0, "backend_name": "static"}]
            },
            "actions": {
                "use_backend": [{"backend_name": "static"}],
                "set_forwarded_headers": [{"active": true}],
                "http_return": []
            }
        })
    }

    #[tokio::test]
    async fn test_create_sends_typed_matchers_and_actions() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;

        let state = FrontendRuleResource
            .create(&session, config(&frontend))
            .await
            .unwrap();
        assert_eq!(state["id"], format!("{}/assets", frontend));
        assert_eq!(state["matching_condition"], "or");
        assert_eq!(state["matchers"]["header"][0]["inverse"], true);
        assert_eq!(state["matchers"]["num_members_up"][0]["backend_name"], "static");
        assert_eq!(state["actions"]["set_forwarded_headers"], json!([{"active": true}]));

        let [lb, fe] = parse_id::<2>(&frontend).unwrap();
        let stored = fake.get_lb_frontend_rule(&lb, &fe, "assets").await.unwrap();
        let wire = serde_json::to_value(&stored).unwrap();
        assert_eq!(wire["matchers"][0]["type"], "path");
        assert_eq!(wire["matchers"][0]["match_path"]["value"], "/assets");
        assert_eq!(wire["matchers"][2]["match_num_members_up"]["backend"], "static");
        assert_eq!(wire["actions"][0]["action_use_backend"]["backend"], "static");
        assert_eq!(wire["actions"][1]["type"], "set_forwarded_headers");
    }

    #[tokio::test]
    async fn test_http_return_payload_stays_plain_in_state() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;

        let state = FrontendRuleResource
            .create(
                &session,
                json!({
                    "frontend": frontend,
                    "name": "maintenance",
                    "priority": 100,
                    "actions": {
                        "http_return": [{"status": 503, "content_type": "text/plain", "payload": "back soon"}]
                    }
                }),
            )
            .await
            .unwrap();
        assert_eq!(state["actions"]["http_return"][0]["payload"], "back soon");
        assert_eq!(state["matching_condition"], "and");

        let [lb, fe] = parse_id::<2>(&frontend).unwrap();
        let stored = fake
            .get_lb_frontend_rule(&lb, &fe, "maintenance")
            .await
            .unwrap();
        let wire = serde_json::to_value(&stored).unwrap();
        assert_eq!(wire["actions"][0]["action_http_return"]["payload"], "YmFjayBzb29u");
    }

    #[tokio::test]
    async fn test_update_replaces_rule() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;
        let state = FrontendRuleResource
            .create(&session, config(&frontend))
            .await
            .unwrap();

        let mut planned = state.clone();
        planned["name"] = json!("static-assets");
        planned["actions"] = json!({"http_redirect": [{"scheme": "https"}]});
        let updated = FrontendRuleResource
            .update(&session, state, planned)
            .await
            .unwrap();
        assert_eq!(updated["id"], format!("{}/static-assets", frontend));
        assert_eq!(updated["actions"]["http_redirect"][0]["scheme"], "https");
        assert_eq!(updated["actions"]["use_backend"], json!([]));
        assert!(fake
            .calls()
            .iter()
            .any(|c| c.starts_with("replace_lb_frontend_rule") && c.ends_with("assets static-assets")));
    }

    #[tokio::test]
    async fn test_import_by_composite_id() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend_id = frontend(&session).await;
        FrontendRuleResource
            .create(&session, config(&frontend_id))
            .await
            .unwrap();

        let [lb, _] = parse_id::<2>(&frontend_id).unwrap();
        let rule = FrontendRuleResource
            .import(&session, &format!("{}/http/assets", lb))
            .await
            .unwrap();
        assert_eq!(rule["frontend"], frontend_id);
        assert_eq!(rule["priority"], 10);
    }

    #[tokio::test]
    async fn test_name_with_separator_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;

        let mut config = config(&frontend);
        config["name"] = json!("a/b");
        assert!(FrontendRuleResource
            .validate(&config)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("name")));

        let err = FrontendRuleResource
            .create(&session, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);

        let [lb, fe] = parse_id::<2>(&frontend).unwrap();
        assert!(fake.get_lb_frontend_rule(&lb, &fe, "a/b").await.is_err());
        assert!(!fake
            .calls()
            .iter()
            .any(|c| c.starts_with("create_lb_frontend_rule")));
    }

    #[tokio::test]
    async fn test_inactive_toggle_survives_read() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;

        let mut config = config(&frontend);
        config["actions"]["tcp_reject"] = json!([{"active": false}]);
        let state = FrontendRuleResource
            .create(&session, config)
            .await
            .unwrap();
        assert_eq!(state["actions"]["tcp_reject"], json!([{"active": false}]));

        let [lb, fe] = parse_id::<2>(&frontend).unwrap();
        let stored = fake.get_lb_frontend_rule(&lb, &fe, "assets").await.unwrap();
        assert!(!stored.actions.contains(&RuleAction::TcpReject));

        let refreshed = FrontendRuleResource
            .read(&session, state.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed, state);
    }

    #[test]
    fn test_redirect_needs_exactly_one_target() {
        let resource = FrontendRuleResource;
        let both = json!({
            "frontend": "lb/http",
            "name": "r",
            "priority": 1,
            "actions": {"http_redirect": [{"location": "/x", "scheme": "https"}]}
        });
        let diagnostics = resource.validate(&both);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("actions.http_redirect.0")));

        let one = json!({
            "frontend": "lb/http",
            "name": "r",
            "priority": 1,
            "actions": {"http_redirect": [{"location": "/x"}]}
        });
        assert!(resource.validate(&one).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_redirect_is_not_sent() {
        let fake = Arc::new(FakeCloud::new());
        let session = session(&fake);
        let frontend = frontend(&session).await;

        let err = FrontendRuleResource
            .create(
                &session,
                json!({
                    "frontend": frontend,
                    "name": "bad",
                    "priority": 1,
                    "actions": {"http_redirect": [{}]}
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{}", err);
        assert!(!fake
            .calls()
            .iter()
            .any(|c| c.starts_with("create_lb_frontend_rule")));
    }
}
