//! UpCloud infrastructure provider.
//!
//! An out-of-process plugin that lets an infrastructure-as-code runtime
//! manage UpCloud objects: routers, NAT gateways, network peerings, managed
//! Kubernetes clusters and node groups, load balancers with their frontends,
//! backends, members and rules, and object storage instances.
//!
//! The runtime starts the `upcloud-provider` binary, reads the handshake line
//! from stdout and talks gRPC to the advertised address. Every state and
//! configuration document travels as JSON bytes.
//!
//! # Handshake Protocol
//!
//! ```text
//! UPCLOUD_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `UPCLOUD_PROVIDER|<protocol_version>|<address>`
//!
//! # Provider Protocol
//!
//! - **GetMetadata** / **GetSchema**: resource and data source catalog
//! - **ValidateProviderConfig** / **Configure**: credentials, login check
//! - **Stop**: cancel in-flight waits
//! - **ValidateResourceConfig** / **Plan**: schema checks and plan modifiers
//! - **Create/Read/Update/Delete**: resource lifecycle
//! - **ImportResourceState**: adopt existing objects by ID
//! - **ReadDataSource**: kubeconfig lookup of a managed cluster
//!
//! # Layout
//!
//! - [`provider`]: [`UpCloudProvider`], dispatching to adapters
//! - [`resources`] and [`datasources`]: one adapter per type
//! - [`client`]: the [`client::CloudApi`] boundary and its HTTP implementation
//! - [`id`]: composite identifiers of child resources
//! - [`poll`]: bounded waiting for remote state
//! - [`server`]: gRPC plumbing and the handshake

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod datasources;
pub mod error;
pub mod id;
pub mod logging;
pub mod plan;
pub mod poll;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use config::{Credentials, ProviderConfig};
pub use error::ProviderError;
pub use id::{marshal_id, unmarshal_id, IdError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use poll::{wait_for_state, PollPolicy, StopSignal};
pub use provider::UpCloudProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
