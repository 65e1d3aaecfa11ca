//! # Dynamic gRPC server
//!
//! [`RpcServer`] serves services that are registered at runtime from loaded
//! schemas, with one JSON handler per unary method. It owns three concerns:
//!
//! * **Lifecycle**: a server binds at most once at a time. [`RpcServer::bind`]
//!   and [`RpcServer::bind_with`] move the server from `Unbound` (or `Failed`)
//!   to `Binding` synchronously; the serving task then settles it into `Bound`
//!   or `Failed` and reports through the bind observer.
//! * **Registry**: [`RpcServer::register_service`] validates a [`HandlerSet`]
//!   against the service descriptor before anything is mutated, so a failed
//!   registration leaves no partial state. Services may be registered before
//!   binding or while serving.
//! * **Serving**: an HTTP/2 accept loop dispatches requests through the
//!   [`router::ServiceRouter`], which can also be driven in-process without a
//!   listener.
//!
//! ```rust,no_run
//! use grapnel::server::RpcServer;
//! use grapnel::server::handler::{HandlerSet, MethodHandler};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = RpcServer::new();
//! server.add_service(
//!     "protos/echo.proto",
//!     "echo",
//!     "Echo",
//!     HandlerSet::new().with("Say", MethodHandler::new(|request| async move { Ok(request) })),
//!     None,
//! )?;
//! server.bind_with("127.0.0.1:50051", |outcome| match outcome {
//!     Ok(port) => println!("listening on {port}"),
//!     Err(err) => eprintln!("bind failed: {err}"),
//! })?;
//! # Ok(())
//! # }
//! ```
pub mod handler;
pub mod router;

use crate::schema::{ResolveError, Schema, SchemaLoadError, SchemaLoadOptions, ServiceSchema};
use handler::{HandlerSet, MethodHandler};
use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use parking_lot::{Mutex, RwLock};
use router::ServiceRouter;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Where a server is in its serving lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not serving and not attempting to.
    Unbound,
    /// A bind attempt is in flight.
    Binding,
    /// Serving on the given local port.
    Bound { port: u16 },
    /// The last bind attempt failed.
    Failed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Unbound => f.write_str("unbound"),
            Lifecycle::Binding => f.write_str("binding"),
            Lifecycle::Bound { port } => write!(f, "bound on port {port}"),
            Lifecycle::Failed => f.write_str("failed"),
        }
    }
}

/// Returned when a bind is requested while one is in flight or established.
#[derive(Debug, thiserror::Error)]
#[error("server is already {0}")]
pub struct AlreadyBindingError(pub Lifecycle);

/// Why a bind attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("malformed listen address '{addr}': {source}")]
    MalformedAddress {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("listen address '{addr}' is already in use")]
    AddressInUse {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("permission denied binding '{addr}'")]
    PermissionDenied {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind '{addr}': {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    fn classify(addr: &str, source: std::io::Error) -> Self {
        let addr = addr.to_string();
        match source.kind() {
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                BindError::MalformedAddress { addr, source }
            }
            std::io::ErrorKind::AddrInUse => BindError::AddressInUse { addr, source },
            std::io::ErrorKind::PermissionDenied => BindError::PermissionDenied { addr, source },
            _ => BindError::Io { addr, source },
        }
    }
}

/// Errors that can occur when registering a service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("service '{service}' is missing handlers for: {}", .missing.join(", "))]
    IncompleteHandlerSet {
        service: String,
        /// Unary methods without a handler, sorted by name.
        missing: Vec<String>,
    },
    #[error("service '{0}' is already registered")]
    DuplicateService(String),
}

/// Errors from the load-resolve-register convenience path.
#[derive(Debug, thiserror::Error)]
pub enum AddServiceError {
    #[error(transparent)]
    Schema(#[from] SchemaLoadError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Transport credentials the server accepts.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerCredentials {
    /// Plaintext HTTP/2.
    #[default]
    Insecure,
}

/// What happens when a service full name is registered a second time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReregistrationPolicy {
    /// The newest registration wins.
    #[default]
    Replace,
    /// Re-registration fails with [`RegistrationError::DuplicateService`].
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub credentials: ServerCredentials,
    pub reregistration: ReregistrationPolicy,
}

pub(crate) struct RegisteredService {
    pub(crate) schema: ServiceSchema,
    pub(crate) handlers: HashMap<String, MethodHandler>,
}

pub(crate) type Registry = Arc<RwLock<HashMap<String, Arc<RegisteredService>>>>;

/// A dynamic gRPC server.
///
/// All methods take `&self`; the server is safe to share behind an `Arc`.
/// Binding spawns onto the ambient Tokio runtime, so [`RpcServer::bind`] and
/// [`RpcServer::bind_with`] must be called from within one.
pub struct RpcServer {
    registry: Registry,
    lifecycle: Arc<Mutex<Lifecycle>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    config: ServerConfig,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Unbound)),
            shutdown: Mutex::new(None),
            config,
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Fully qualified names of the registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The routing service, for driving the server without a TCP listener.
    ///
    /// The router shares the live registry, so services registered later are
    /// visible to previously obtained routers.
    pub fn router(&self) -> ServiceRouter {
        ServiceRouter::new(self.registry.clone())
    }

    /// Registers `schema`'s service with the given handlers.
    ///
    /// Every unary method must have a handler; the error lists the missing
    /// ones and nothing is registered. Handlers for streaming or unknown
    /// methods are dropped with a warning. Registering an already present
    /// service follows the configured [`ReregistrationPolicy`].
    pub fn register_service(
        &self,
        schema: &ServiceSchema,
        handlers: HandlerSet,
    ) -> Result<(), RegistrationError> {
        let service_name = schema.full_name().to_string();
        let mut offered = handlers.into_inner();
        let mut accepted: HashMap<String, MethodHandler> = HashMap::new();
        let mut missing = Vec::new();

        for method in schema.descriptor().methods() {
            let name = method.name();
            if method.is_client_streaming() || method.is_server_streaming() {
                if offered.remove(name).is_some() {
                    tracing::warn!(
                        service = %service_name,
                        method = name,
                        "ignoring handler for streaming method"
                    );
                }
                continue;
            }
            match offered.remove(name) {
                Some(handler) => {
                    accepted.insert(name.to_string(), handler);
                }
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            missing.sort();
            return Err(RegistrationError::IncompleteHandlerSet {
                service: service_name,
                missing,
            });
        }

        for name in offered.keys() {
            tracing::warn!(
                service = %service_name,
                method = %name,
                "ignoring handler for unknown method"
            );
        }

        let mut registry = self.registry.write();
        if self.config.reregistration == ReregistrationPolicy::Reject
            && registry.contains_key(&service_name)
        {
            return Err(RegistrationError::DuplicateService(service_name));
        }
        let replaced = registry
            .insert(
                service_name.clone(),
                Arc::new(RegisteredService {
                    schema: schema.clone(),
                    handlers: accepted,
                }),
            )
            .is_some();
        drop(registry);

        if replaced {
            tracing::info!(service = %service_name, "replaced service registration");
        } else {
            tracing::debug!(service = %service_name, "registered service");
        }
        Ok(())
    }

    /// Loads a schema, resolves `namespace`/`service` in it, and registers the
    /// result in one step. `options` defaults to [`SchemaLoadOptions::default`].
    pub fn add_service(
        &self,
        schema_path: impl AsRef<Path>,
        namespace: &str,
        service: &str,
        handlers: HandlerSet,
        options: Option<&SchemaLoadOptions>,
    ) -> Result<(), AddServiceError> {
        let defaults = SchemaLoadOptions::default();
        let options = options.unwrap_or(&defaults);
        let schema = Schema::load(schema_path, options)?;
        let service = schema.resolve_service(namespace, service)?;
        self.register_service(&service, handlers)?;
        Ok(())
    }

    /// Binds to `addr` without observing the outcome.
    ///
    /// A bind failure is fatal: it is logged at error level and the process
    /// exits with a non-zero code. Use [`RpcServer::bind_with`] to observe
    /// failures instead.
    pub fn bind(&self, addr: impl Into<String>) -> Result<(), AlreadyBindingError> {
        self.bind_with(addr, |outcome| {
            if let Err(err) = outcome {
                tracing::error!(error = %err, "unobserved server bind failure");
                std::process::exit(1);
            }
        })
    }

    /// Binds to `addr`, reporting the outcome through `on_bound`.
    ///
    /// Returns [`AlreadyBindingError`] synchronously if a bind is in flight or
    /// established; rebinding after a failure or a shutdown is allowed.
    /// `on_bound` is invoked exactly once, from the serving task, with the
    /// actual local port on success. Binding port 0 picks an ephemeral port.
    pub fn bind_with<F>(&self, addr: impl Into<String>, on_bound: F) -> Result<(), AlreadyBindingError>
    where
        F: FnOnce(Result<u16, BindError>) + Send + 'static,
    {
        let addr = addr.into();
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Binding | Lifecycle::Bound { .. } => {
                    return Err(AlreadyBindingError(*lifecycle));
                }
                Lifecycle::Unbound | Lifecycle::Failed => *lifecycle = Lifecycle::Binding,
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);

        tokio::spawn(serve(
            addr,
            self.lifecycle.clone(),
            self.router(),
            shutdown_rx,
            on_bound,
        ));
        Ok(())
    }

    /// Stops accepting connections; in-flight requests are allowed to finish.
    ///
    /// The lifecycle returns to `Unbound` once the accept loop exits. Calling
    /// this on a server that is not serving is a no-op.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve<F>(
    addr: String,
    lifecycle: Arc<Mutex<Lifecycle>>,
    router: ServiceRouter,
    mut shutdown: oneshot::Receiver<()>,
    on_bound: F,
) where
    F: FnOnce(Result<u16, BindError>) + Send + 'static,
{
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = BindError::classify(&addr, source);
            *lifecycle.lock() = Lifecycle::Failed;
            tracing::warn!(%addr, error = %err, "bind attempt failed");
            on_bound(Err(err));
            return;
        }
    };
    let port = match listener.local_addr() {
        Ok(local) => local.port(),
        Err(source) => {
            *lifecycle.lock() = Lifecycle::Failed;
            on_bound(Err(BindError::Io { addr, source }));
            return;
        }
    };

    *lifecycle.lock() = Lifecycle::Bound { port };
    tracing::info!(%addr, port, "server bound");
    on_bound(Ok(port));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tracing::trace!(%remote, "accepted connection");
                    let service = TowerToHyperService::new(router.clone());
                    tokio::spawn(async move {
                        let connection = http2::Builder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), service);
                        if let Err(err) = connection.await {
                            tracing::debug!(error = %err, "connection closed with error");
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "failed to accept connection"),
            },
        }
    }

    *lifecycle.lock() = Lifecycle::Unbound;
    tracing::info!(port, "server stopped");
}
