//! # Dynamic gRPC client
//!
//! [`RpcConnection`] ties together one loaded service schema and one dialed
//! channel. Construction never touches the network: the channel dials lazily,
//! so the handle is usable immediately and an unreachable server surfaces as
//! a transport failure on the first call.
//!
//! Calls are dispatched in the background through [`RpcConnection::call`];
//! completion is delivered exactly once to the provided callback, and the
//! returned [`CallHandle`] can cancel a call that has not completed yet.
//!
//! ```rust,no_run
//! use grapnel::client::RpcConnection;
//! use serde_json::json;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = RpcConnection::connect(
//!     "protos/echo.proto",
//!     "echo",
//!     "Echo",
//!     "localhost:50051",
//!     None,
//! )?;
//! let _handle = conn.call("Say", json!({ "text": "ahoy" }), |outcome| {
//!     println!("reply: {outcome:?}");
//! })?;
//! # Ok(())
//! # }
//! ```
pub mod call;

pub use call::{CallHandle, CallOptions, DispatchError, InvocationError};

use crate::BoxError;
use crate::grpc::client::GrpcClient;
use crate::schema::{ResolveError, Schema, SchemaLoadError, SchemaLoadOptions, ServiceSchema};
use http_body::Body as HttpBody;
use std::path::Path;
use tonic::client::GrpcService;
use tonic::transport::{Channel, Endpoint};

/// Transport credentials used when dialing.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelCredentials {
    /// Plaintext HTTP/2.
    #[default]
    Insecure,
}

/// Errors that can occur when establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid server address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),
    #[error(transparent)]
    Schema(#[from] SchemaLoadError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// A connection to one service on one server.
#[derive(Debug, Clone)]
pub struct RpcConnection<S = Channel> {
    invoker: GrpcClient<S>,
    schema: ServiceSchema,
    target: String,
    credentials: ChannelCredentials,
}

impl RpcConnection {
    /// Loads a schema, resolves the service in it, and dials `address` in one
    /// step. `options` defaults to [`SchemaLoadOptions::default`]; bare
    /// `host:port` addresses are dialed as plaintext HTTP.
    pub fn connect(
        schema_path: impl AsRef<Path>,
        namespace: &str,
        service: &str,
        address: &str,
        options: Option<&SchemaLoadOptions>,
    ) -> Result<Self, ConnectError> {
        let defaults = SchemaLoadOptions::default();
        let options = options.unwrap_or(&defaults);
        let schema = Schema::load(schema_path, options)?;
        let service = schema.resolve_service(namespace, service)?;
        Self::with_service(service, address)
    }

    /// Dials `address` for an already resolved service.
    pub fn with_service(schema: ServiceSchema, address: &str) -> Result<Self, ConnectError> {
        let target = normalize_target(address);
        let endpoint = Endpoint::new(target.clone())
            .map_err(|e| ConnectError::InvalidAddress(address.to_string(), e))?;
        let channel = endpoint.connect_lazy();
        Ok(Self {
            invoker: GrpcClient::new(channel),
            schema,
            target,
            credentials: ChannelCredentials::Insecure,
        })
    }
}

impl<S> RpcConnection<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Wraps an existing `tonic`-compatible service, bypassing the network.
    ///
    /// This is the seam for exercising a server in-process, for example with
    /// [`ServiceRouter`](crate::server::router::ServiceRouter).
    pub fn from_service(service: S, schema: ServiceSchema) -> Self {
        Self {
            invoker: GrpcClient::new(service),
            schema,
            target: "in-process".to_string(),
            credentials: ChannelCredentials::Insecure,
        }
    }

    /// The resolved service this connection talks to.
    pub fn service(&self) -> &ServiceSchema {
        &self.schema
    }

    /// The dialed target URI, or `in-process`.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn credentials(&self) -> ChannelCredentials {
        self.credentials
    }
}

fn normalize_target(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
