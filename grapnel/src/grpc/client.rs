//! # Generic gRPC client
//!
//! This module wraps a standard `tonic` client to provide a generic interface
//! for unary gRPC communication. It is agnostic to the specific Protobuf
//! messages being exchanged: the connection only ensures readiness and hands
//! the prepared request, `MethodDescriptor`, and codec to `tonic`.
use super::codec::JsonCodec;
use crate::BoxError;
use crate::schema::TranscodeOptions;
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::str::FromStr;
use tonic::{client::GrpcService, transport::Channel};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
}

/// A dynamic unary gRPC client over any `tonic`-compatible service.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a unary gRPC call (single request -> single response).
    ///
    /// # Returns
    /// * `Ok(Ok(Value))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but the server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send the request or connect.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        transcode: TranscodeOptions,
        request: tonic::Request<serde_json::Value>,
    ) -> Result<Result<serde_json::Value, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = JsonCodec::client(method, transcode);
        let path = http_path(method);

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

fn http_path(method: &MethodDescriptor) -> http::uri::PathAndQuery {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
}
