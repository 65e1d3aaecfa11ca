//! # Generic gRPC transport
//!
//! This module contains the low-level building blocks for performing gRPC
//! calls using dynamic message types.
//!
//! Unlike standard `tonic` clients and servers, which are strongly typed
//! against generated structs, the components here work with generic
//! `serde_json::Value` payloads and transcode them to Protobuf binary format
//! on the fly.
pub mod client;
pub mod codec;
