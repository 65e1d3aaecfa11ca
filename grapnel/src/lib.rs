//! # Grapnel
//!
//! `grapnel` is a dynamic gRPC service registry and connection manager. It loads
//! Protobuf schemas at runtime (from `.proto` sources or compiled descriptor
//! sets), serves JSON handlers registered against those schemas, and dials
//! remote services as a client, all without compile-time code generation.
//!
//! ## Key components
//!
//! * **[`schema::Schema`]:** Loads Protobuf definitions at runtime and resolves
//!   `namespace` + `service` pairs into [`schema::ServiceSchema`] descriptors.
//! * **[`server::RpcServer`]:** Owns the bind lifecycle, the service registry,
//!   and the accept loop. Services are registered by descriptor, with one JSON
//!   handler per unary method.
//! * **[`client::RpcConnection`]:** A connection to a single service. Calls are
//!   dispatched in the background and complete through a caller-provided
//!   callback; each call yields a cancellable [`client::CallHandle`].
//!
//! ## JsonCodec
//!
//! An implementation of `tonic::codec::Codec` that transcodes JSON to Protobuf
//! bytes (and vice versa) on the fly. The same codec backs both the client and
//! the server side, so handlers and callers only ever see `serde_json::Value`.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.
pub mod client;
pub mod grpc;
pub mod schema;
pub mod server;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
