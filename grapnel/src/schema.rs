//! # Schema loading and resolution
//!
//! This module turns Protobuf definitions into queryable descriptors at
//! runtime. A [`Schema`] is built either by compiling `.proto` sources or by
//! decoding a serialized `FileDescriptorSet`, and it remembers the
//! [`SchemaLoadOptions`] it was loaded with so that every service resolved
//! from it transcodes JSON the same way.
//!
//! Resolution is a two-step address: a `namespace` (the Protobuf package) and
//! a `service` name within it. The two failure modes are reported separately
//! so callers can tell a typoed package from a typoed service.
mod loader;
mod options;
mod service;

pub use loader::*;
pub use options::*;
pub use service::*;
