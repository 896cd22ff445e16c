//! [`CloudApi`] over HTTPS with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::models::*;
use super::{ApiResult, CloudApi};
use crate::config::Credentials;
use crate::error::ProviderError;

/// Base URL of the UpCloud API.
pub const DEFAULT_BASE_URL: &str = "https://api.upcloud.com/1.3";

/// HTTP implementation of [`CloudApi`].
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpClient {
    /// Build a client.
    ///
    /// `version` ends up in the user agent, `upcloud-provider/<version>`.
    pub fn new(
        credentials: Credentials,
        timeout: Duration,
        version: &str,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent(version))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
        })
    }

    /// Use another API endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.credentials {
            Credentials::Token(token) => builder.bearer_auth(token),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            },
        }
    }

    async fn execute(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> ApiResult<Response> {
        debug!(%method, path, "API request");
        let mut builder = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        let status = response.status();
        debug!(%method, path, status = status.as_u16(), "API response");

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        Ok(self.execute(Method::GET, path, None).await?.json().await?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)?;
        Ok(self.execute(method, path, Some(body)).await?.json().await?)
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }
}

fn user_agent(version: &str) -> String {
    format!("upcloud-provider/{}", version)
}

#[derive(Deserialize)]
struct LegacyErrorBody {
    error: LegacyError,
}

#[derive(Deserialize)]
struct LegacyError {
    error_code: String,
    error_message: String,
}

#[derive(Deserialize)]
struct ProblemBody {
    title: String,
}

/// Extract a readable message from an API error body.
///
/// The older endpoints answer `{"error": {"error_code", "error_message"}}`,
/// the newer ones use problem JSON with a `title`.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(legacy) = serde_json::from_str::<LegacyErrorBody>(body) {
        return format!(
            "{} ({})",
            legacy.error.error_message, legacy.error.error_code
        );
    }
    if let Ok(problem) = serde_json::from_str::<ProblemBody>(body) {
        return problem.title;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn error_from_response(status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(status, body);
    match status.as_u16() {
        404 => ProviderError::NotFound(message),
        401 | 403 => ProviderError::PermissionDenied(message),
        409 => ProviderError::AlreadyExists(message),
        429 => ProviderError::ResourceExhausted(message),
        500..=599 => ProviderError::Unavailable(message),
        code => ProviderError::api(code, message),
    }
}

#[derive(Deserialize)]
struct AccountEnvelope {
    account: Account,
}

#[derive(Deserialize)]
struct RouterEnvelope {
    router: Router,
}

#[derive(Deserialize)]
struct ObjectStorageEnvelope {
    object_storage: ObjectStorage,
}

#[derive(Deserialize)]
struct KubeconfigEnvelope {
    kubeconfig: String,
}

fn lb_path(lb: &str) -> String {
    format!("/load-balancer/{}", lb)
}

fn backend_path(lb: &str, backend: &str) -> String {
    format!("{}/backends/{}", lb_path(lb), backend)
}

fn frontend_path(lb: &str, frontend: &str) -> String {
    format!("{}/frontends/{}", lb_path(lb), frontend)
}

#[async_trait]
impl CloudApi for HttpClient {
    async fn get_account(&self) -> ApiResult<Account> {
        let envelope: AccountEnvelope = self.get("/account").await?;
        Ok(envelope.account)
    }

    async fn create_router(&self, req: &RouterRequest) -> ApiResult<Router> {
        let envelope: RouterEnvelope = self
            .send(Method::POST, "/router", &json!({ "router": req }))
            .await?;
        Ok(envelope.router)
    }

    async fn get_router(&self, uuid: &str) -> ApiResult<Router> {
        let envelope: RouterEnvelope = self.get(&format!("/router/{}", uuid)).await?;
        Ok(envelope.router)
    }

    async fn modify_router(&self, uuid: &str, req: &RouterRequest) -> ApiResult<Router> {
        let envelope: RouterEnvelope = self
            .send(
                Method::PATCH,
                &format!("/router/{}", uuid),
                &json!({ "router": req }),
            )
            .await?;
        Ok(envelope.router)
    }

    async fn delete_router(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&format!("/router/{}", uuid)).await
    }

    async fn create_network_peering(
        &self,
        req: &CreateNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering> {
        self.send(Method::POST, "/network-peering", req).await
    }

    async fn get_network_peering(&self, uuid: &str) -> ApiResult<NetworkPeering> {
        self.get(&format!("/network-peering/{}", uuid)).await
    }

    async fn modify_network_peering(
        &self,
        uuid: &str,
        req: &ModifyNetworkPeeringRequest,
    ) -> ApiResult<NetworkPeering> {
        self.send(Method::PATCH, &format!("/network-peering/{}", uuid), req)
            .await
    }

    async fn delete_network_peering(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&format!("/network-peering/{}", uuid)).await
    }

    async fn create_gateway(&self, req: &CreateGatewayRequest) -> ApiResult<Gateway> {
        self.send(Method::POST, "/gateway", req).await
    }

    async fn get_gateway(&self, uuid: &str) -> ApiResult<Gateway> {
        self.get(&format!("/gateway/{}", uuid)).await
    }

    async fn modify_gateway(&self, uuid: &str, req: &ModifyGatewayRequest) -> ApiResult<Gateway> {
        self.send(Method::PATCH, &format!("/gateway/{}", uuid), req)
            .await
    }

    async fn delete_gateway(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&format!("/gateway/{}", uuid)).await
    }

    async fn create_kubernetes_cluster(
        &self,
        req: &CreateKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster> {
        self.send(Method::POST, "/kubernetes", req).await
    }

    async fn get_kubernetes_cluster(&self, uuid: &str) -> ApiResult<KubernetesCluster> {
        self.get(&format!("/kubernetes/{}", uuid)).await
    }

    async fn modify_kubernetes_cluster(
        &self,
        uuid: &str,
        req: &ModifyKubernetesClusterRequest,
    ) -> ApiResult<KubernetesCluster> {
        self.send(Method::PATCH, &format!("/kubernetes/{}", uuid), req)
            .await
    }

    async fn delete_kubernetes_cluster(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&format!("/kubernetes/{}", uuid)).await
    }

    async fn get_kubeconfig(&self, uuid: &str) -> ApiResult<String> {
        let envelope: KubeconfigEnvelope =
            self.get(&format!("/kubernetes/{}/kubeconfig", uuid)).await?;
        Ok(envelope.kubeconfig)
    }

    async fn create_node_group(
        &self,
        cluster: &str,
        req: &CreateNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup> {
        self.send(
            Method::POST,
            &format!("/kubernetes/{}/node-groups", cluster),
            req,
        )
        .await
    }

    async fn get_node_group(&self, cluster: &str, name: &str) -> ApiResult<KubernetesNodeGroup> {
        self.get(&format!("/kubernetes/{}/node-groups/{}", cluster, name))
            .await
    }

    async fn modify_node_group(
        &self,
        cluster: &str,
        name: &str,
        req: &ModifyNodeGroupRequest,
    ) -> ApiResult<KubernetesNodeGroup> {
        self.send(
            Method::PATCH,
            &format!("/kubernetes/{}/node-groups/{}", cluster, name),
            req,
        )
        .await
    }

    async fn delete_node_group(&self, cluster: &str, name: &str) -> ApiResult<()> {
        self.delete(&format!("/kubernetes/{}/node-groups/{}", cluster, name))
            .await
    }

    async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer> {
        self.send(Method::POST, "/load-balancer", req).await
    }

    async fn get_load_balancer(&self, uuid: &str) -> ApiResult<LoadBalancer> {
        self.get(&lb_path(uuid)).await
    }

    async fn modify_load_balancer(
        &self,
        uuid: &str,
        req: &ModifyLoadBalancerRequest,
    ) -> ApiResult<LoadBalancer> {
        self.send(Method::PATCH, &lb_path(uuid), req).await
    }

    async fn delete_load_balancer(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&lb_path(uuid)).await
    }

    async fn rename_load_balancer_network(
        &self,
        uuid: &str,
        name: &str,
        new_name: &str,
    ) -> ApiResult<LoadBalancerNetwork> {
        self.send(
            Method::PATCH,
            &format!("{}/networks/{}", lb_path(uuid), name),
            &json!({ "name": new_name }),
        )
        .await
    }

    async fn create_lb_backend(
        &self,
        lb: &str,
        req: &BackendRequest,
    ) -> ApiResult<LoadBalancerBackend> {
        self.send(Method::POST, &format!("{}/backends", lb_path(lb)), req)
            .await
    }

    async fn get_lb_backend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerBackend> {
        self.get(&backend_path(lb, name)).await
    }

    async fn modify_lb_backend(
        &self,
        lb: &str,
        name: &str,
        req: &BackendRequest,
    ) -> ApiResult<LoadBalancerBackend> {
        self.send(Method::PATCH, &backend_path(lb, name), req).await
    }

    async fn delete_lb_backend(&self, lb: &str, name: &str) -> ApiResult<()> {
        self.delete(&backend_path(lb, name)).await
    }

    async fn create_lb_member(
        &self,
        lb: &str,
        backend: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember> {
        self.send(
            Method::POST,
            &format!("{}/members", backend_path(lb, backend)),
            member,
        )
        .await
    }

    async fn get_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerMember> {
        self.get(&format!("{}/members/{}", backend_path(lb, backend), name))
            .await
    }

    async fn modify_lb_member(
        &self,
        lb: &str,
        backend: &str,
        name: &str,
        member: &LoadBalancerMember,
    ) -> ApiResult<LoadBalancerMember> {
        self.send(
            Method::PATCH,
            &format!("{}/members/{}", backend_path(lb, backend), name),
            member,
        )
        .await
    }

    async fn delete_lb_member(&self, lb: &str, backend: &str, name: &str) -> ApiResult<()> {
        self.delete(&format!("{}/members/{}", backend_path(lb, backend), name))
            .await
    }

    async fn create_lb_frontend(
        &self,
        lb: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend> {
        self.send(Method::POST, &format!("{}/frontends", lb_path(lb)), frontend)
            .await
    }

    async fn get_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<LoadBalancerFrontend> {
        self.get(&frontend_path(lb, name)).await
    }

    async fn modify_lb_frontend(
        &self,
        lb: &str,
        name: &str,
        frontend: &LoadBalancerFrontend,
    ) -> ApiResult<LoadBalancerFrontend> {
        self.send(Method::PATCH, &frontend_path(lb, name), frontend)
            .await
    }

    async fn delete_lb_frontend(&self, lb: &str, name: &str) -> ApiResult<()> {
        self.delete(&frontend_path(lb, name)).await
    }

    async fn create_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.send(
            Method::POST,
            &format!("{}/rules", frontend_path(lb, frontend)),
            rule,
        )
        .await
    }

    async fn get_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.get(&format!("{}/rules/{}", frontend_path(lb, frontend), name))
            .await
    }

    async fn replace_lb_frontend_rule(
        &self,
        lb: &str,
        frontend: &str,
        name: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.send(
            Method::PUT,
            &format!("{}/rules/{}", frontend_path(lb, frontend), name),
            rule,
        )
        .await
    }

    async fn delete_lb_frontend_rule(&self, lb: &str, frontend: &str, name: &str) -> ApiResult<()> {
        self.delete(&format!("{}/rules/{}", frontend_path(lb, frontend), name))
            .await
    }

    async fn create_object_storage(
        &self,
        req: &CreateObjectStorageRequest,
    ) -> ApiResult<ObjectStorage> {
        let envelope: ObjectStorageEnvelope = self
            .send(
                Method::POST,
                "/object-storage",
                &json!({ "object_storage": req }),
            )
            .await?;
        Ok(envelope.object_storage)
    }

    async fn get_object_storage(&self, uuid: &str) -> ApiResult<ObjectStorage> {
        let envelope: ObjectStorageEnvelope =
            self.get(&format!("/object-storage/{}", uuid)).await?;
        Ok(envelope.object_storage)
    }

    async fn modify_object_storage(
        &self,
        uuid: &str,
        req: &ModifyObjectStorageRequest,
    ) -> ApiResult<ObjectStorage> {
        let envelope: ObjectStorageEnvelope = self
            .send(
                Method::PATCH,
                &format!("/object-storage/{}", uuid),
                &json!({ "object_storage": req }),
            )
            .await?;
        Ok(envelope.object_storage)
    }

    async fn delete_object_storage(&self, uuid: &str) -> ApiResult<()> {
        self.delete(&format!("/object-storage/{}", uuid)).await
    }
}
