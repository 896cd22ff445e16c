//! gRPC server for the provider protocol.
//!
//! [`ProviderService`] is the Rust-side view of the protocol. [`serve`] wraps
//! an implementation in the generated tonic service, prints the handshake
//! line and runs until SIGTERM or SIGINT.
//!
//! Every RPC answers with a response; provider errors travel as error
//! diagnostics, never as gRPC status codes.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete, up to the shutdown timeout
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as proto;
use crate::schema::{
    has_errors, Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema,
};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// The provider protocol in plain Rust types.
///
/// # Example
///
/// ```ignore
/// use upcloud_provider::{serve, UpCloudProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     serve(UpCloudProvider::new(env!("CARGO_PKG_VERSION"))).await
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Provider, resource and data source schemas.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names. Derived from [`Self::schema`] by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Check the provider block before [`Self::configure`].
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Resolve credentials and get ready to serve resource calls.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Cancel in-flight work. Operations waiting on remote state return promptly.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan a create (no prior state), update, or destroy (null proposed state).
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the object and return its state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh a state. `None` means the object no longer exists.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Apply an in-place update.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the object.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Adopt an existing object by its ID.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "import of {}",
            resource_type
        )))
    }

    /// Look up a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

fn to_json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Empty or malformed payloads decode to `null`.
fn from_json_bytes(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

impl From<Diagnostic> for proto::Diagnostic {
    fn from(d: Diagnostic) -> Self {
        let severity = match d.severity {
            DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
            DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
        };
        proto::Diagnostic {
            severity: severity as i32,
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        }
    }
}

fn convert_diagnostics(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics.into_iter().map(Into::into).collect()
}

/// One error diagnostic for `err`. Composite IDs that cannot be split are
/// reported against the resource type they belong to.
fn error_diagnostics(resource_type: Option<&str>, err: ProviderError) -> Vec<proto::Diagnostic> {
    let diagnostic = match (resource_type, &err) {
        (Some(resource_type), ProviderError::InvalidId(_)) => {
            Diagnostic::from_error(format!("unable to unmarshal {} ID", resource_type), &err)
        }
        _ => Diagnostic::error(err.to_string()),
    };
    vec![diagnostic.into()]
}

/// Log the outcome of a call that returns diagnostics.
fn diagnostics_outcome(
    op: &str,
    result: Result<Vec<Diagnostic>, ProviderError>,
) -> Vec<proto::Diagnostic> {
    match result {
        Ok(diagnostics) if has_errors(&diagnostics) => {
            warn!(diagnostics = diagnostics.len(), "{} completed with errors", op);
            convert_diagnostics(diagnostics)
        }
        Ok(diagnostics) => {
            info!("{} completed", op);
            convert_diagnostics(diagnostics)
        }
        Err(e) => {
            error!(error = %e, "{} failed", op);
            error_diagnostics(None, e)
        }
    }
}

/// Log the outcome of a resource call, splitting it into value and diagnostics.
fn resource_outcome<T>(
    op: &str,
    resource_type: &str,
    result: Result<T, ProviderError>,
) -> (Option<T>, Vec<proto::Diagnostic>) {
    match result {
        Ok(value) => {
            info!("{} completed", op);
            (Some(value), vec![])
        }
        Err(e) => {
            error!(error = %e, "{} failed", op);
            (None, error_diagnostics(Some(resource_type), e))
        }
    }
}

impl From<&Schema> for proto::Schema {
    fn from(schema: &Schema) -> Self {
        proto::Schema {
            version: schema.version as i64,
            block: Some((&schema.block).into()),
        }
    }
}

impl From<&Block> for proto::Block {
    fn from(block: &Block) -> Self {
        let attributes = block
            .attributes
            .iter()
            .map(|(name, attr)| proto::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(to_json_bytes).unwrap_or_default(),
            })
            .collect();
        let block_types = block
            .blocks
            .iter()
            .map(|(name, nested)| {
                let nesting_mode = match nested.nesting_mode {
                    BlockNestingMode::Single => proto::nested_block::NestingMode::Single,
                    BlockNestingMode::List => proto::nested_block::NestingMode::List,
                    BlockNestingMode::Set => proto::nested_block::NestingMode::Set,
                };
                proto::NestedBlock {
                    type_name: name.clone(),
                    block: Some((&nested.block).into()),
                    nesting_mode: nesting_mode as i32,
                    min_items: nested.min_items as i32,
                    max_items: nested.max_items as i32,
                }
            })
            .collect();
        proto::Block {
            attributes,
            block_types,
            description: block.description.clone().unwrap_or_default(),
        }
    }
}

fn convert_schemas(schemas: &BTreeMap<String, Schema>) -> HashMap<String, proto::Schema> {
    schemas
        .iter()
        .map(|(name, schema)| (name.clone(), schema.into()))
        .collect()
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<proto::GetMetadataRequest>,
    ) -> Result<Response<proto::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "metadata"
        );
        Ok(Response::new(proto::GetMetadataResponse {
            server_capabilities: Some(proto::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<proto::GetSchemaRequest>,
    ) -> Result<Response<proto::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        debug!(
            resources = schema.resources.len(),
            data_sources = schema.data_sources.len(),
            "schema"
        );
        Ok(Response::new(proto::GetSchemaResponse {
            provider: Some((&schema.provider).into()),
            resources: convert_schemas(&schema.resources),
            data_sources: convert_schemas(&schema.data_sources),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<Response<proto::ValidateProviderConfigResponse>, Status> {
        let config = from_json_bytes(&request.into_inner().config);
        let result = self.provider.validate_provider_config(config).await;
        Ok(Response::new(proto::ValidateProviderConfigResponse {
            diagnostics: diagnostics_outcome("ValidateProviderConfig", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<proto::ConfigureRequest>,
    ) -> Result<Response<proto::ConfigureResponse>, Status> {
        let config = from_json_bytes(&request.into_inner().config);
        let result = self.provider.configure(config).await;
        Ok(Response::new(proto::ConfigureResponse {
            diagnostics: diagnostics_outcome("Configure", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<proto::StopRequest>,
    ) -> Result<Response<proto::StopResponse>, Status> {
        info!("stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(Response::new(proto::StopResponse { error }))
    }

    #[instrument(
        skip_all,
        name = "grpc.validate_resource_config",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn validate_resource_config(
        &self,
        request: Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<Response<proto::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .validate_resource_config(&req.resource_type, from_json_bytes(&req.config))
            .await;
        Ok(Response::new(proto::ValidateResourceConfigResponse {
            diagnostics: diagnostics_outcome("ValidateResourceConfig", result),
        }))
    }

    #[instrument(
        skip_all,
        name = "grpc.plan",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn plan(
        &self,
        request: Request<proto::PlanRequest>,
    ) -> Result<Response<proto::PlanResponse>, Status> {
        let req = request.into_inner();
        let prior_state = Some(from_json_bytes(&req.prior_state)).filter(|v| !v.is_null());
        debug!(is_create = prior_state.is_none(), "planning");

        let result = self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                from_json_bytes(&req.proposed_state),
                from_json_bytes(&req.config),
            )
            .await;
        let (plan, diagnostics) = resource_outcome("Plan", &req.resource_type, result);
        let response = match plan {
            Some(plan) => {
                debug!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "planned"
                );
                proto::PlanResponse {
                    planned_state: to_json_bytes(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics,
                }
            }
            None => proto::PlanResponse {
                diagnostics,
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(
        skip_all,
        name = "grpc.create",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> Result<Response<proto::CreateResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .create(&req.resource_type, from_json_bytes(&req.planned_state))
            .await;
        let (state, diagnostics) = resource_outcome("Create", &req.resource_type, result);
        Ok(Response::new(proto::CreateResponse {
            state: state.as_ref().map(to_json_bytes).unwrap_or_default(),
            diagnostics,
        }))
    }

    #[instrument(
        skip_all,
        name = "grpc.read",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn read(
        &self,
        request: Request<proto::ReadRequest>,
    ) -> Result<Response<proto::ReadResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .read(&req.resource_type, from_json_bytes(&req.current_state))
            .await;
        let (state, diagnostics) = resource_outcome("Read", &req.resource_type, result);
        let state = state.flatten();
        if state.is_none() && diagnostics.is_empty() {
            info!("remote object is gone, dropping it from state");
        }
        Ok(Response::new(proto::ReadResponse {
            state: state.as_ref().map(to_json_bytes).unwrap_or_default(),
            diagnostics,
        }))
    }

    #[instrument(
        skip_all,
        name = "grpc.update",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn update(
        &self,
        request: Request<proto::UpdateRequest>,
    ) -> Result<Response<proto::UpdateResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .update(
                &req.resource_type,
                from_json_bytes(&req.prior_state),
                from_json_bytes(&req.planned_state),
            )
            .await;
        let (state, diagnostics) = resource_outcome("Update", &req.resource_type, result);
        Ok(Response::new(proto::UpdateResponse {
            state: state.as_ref().map(to_json_bytes).unwrap_or_default(),
            diagnostics,
        }))
    }

    #[instrument(
        skip_all,
        name = "grpc.delete",
        fields(resource_type = %request.get_ref().resource_type)
    )]
    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .delete(&req.resource_type, from_json_bytes(&req.current_state))
            .await;
        let (_, diagnostics) = resource_outcome("Delete", &req.resource_type, result);
        Ok(Response::new(proto::DeleteResponse { diagnostics }))
    }

    #[instrument(
        skip_all,
        name = "grpc.import_resource_state",
        fields(resource_type = %request.get_ref().resource_type, id = %request.get_ref().id)
    )]
    async fn import_resource_state(
        &self,
        request: Request<proto::ImportResourceStateRequest>,
    ) -> Result<Response<proto::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .import_resource(&req.resource_type, &req.id)
            .await;
        let (imported, diagnostics) =
            resource_outcome("ImportResourceState", &req.resource_type, result);
        let imported = imported
            .unwrap_or_default()
            .into_iter()
            .map(|r| proto::ImportedResource {
                state: to_json_bytes(&r.state),
                resource_type: r.resource_type,
            })
            .collect();
        Ok(Response::new(proto::ImportResourceStateResponse {
            imported,
            diagnostics,
        }))
    }

    #[instrument(
        skip_all,
        name = "grpc.read_data_source",
        fields(data_source_type = %request.get_ref().data_source_type)
    )]
    async fn read_data_source(
        &self,
        request: Request<proto::ReadDataSourceRequest>,
    ) -> Result<Response<proto::ReadDataSourceResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .read_data_source(&req.data_source_type, from_json_bytes(&req.config))
            .await;
        let (state, diagnostics) = match result {
            Ok(state) => {
                info!("ReadDataSource completed");
                (to_json_bytes(&state), vec![])
            }
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                (vec![], error_diagnostics(None, e))
            }
        };
        Ok(Response::new(proto::ReadDataSourceResponse {
            state,
            diagnostics,
        }))
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may keep running after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Defaults: 30 second shutdown timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Resolves on SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "shutting down");
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!(signal = "CTRL+C", "shutting down");
    }

    #[cfg(not(any(unix, windows)))]
    std::future::pending::<()>().await;
}

/// Serve `provider` on a free loopback port.
///
/// Prints `UPCLOUD_PROVIDER|<protocol version>|<address>` on stdout once
/// the port is bound, then serves until SIGTERM or SIGINT.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// [`serve`] with explicit options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    run(provider, listener, options).await
}

/// Serve on a fixed address instead of a free port.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// [`serve_on`] with explicit options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    run(provider, listener, options).await
}

async fn run<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "provider listening");

    let provider = Arc::new(provider);
    let service = proto::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let shutdown = Arc::new(Notify::new());
    let shutdown_requested = Arc::clone(&shutdown);
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        async move { shutdown_requested.notified().await },
    );
    tokio::pin!(server);

    // The timeout bounds draining only, not the server's lifetime.
    tokio::select! {
        result = &mut server => result?,
        _ = wait_for_shutdown_signal() => {
            shutdown.notify_one();
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "in-flight requests still running after shutdown timeout"
                ),
            }
        }
    }

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop failed");
    }
    info!("provider stopped");
    Ok(())
}
