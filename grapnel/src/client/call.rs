//! Background call dispatch, completion, and cancellation.
use super::RpcConnection;
use crate::BoxError;
use crate::grpc::client::GrpcRequestError;
use http_body::Body as HttpBody;
use parking_lot::Mutex;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::oneshot;
use tonic::client::GrpcService;
use tonic::metadata::errors::{InvalidMetadataKey, InvalidMetadataValue};
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue,
};
use tonic::{Code, Status};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Maximum time the call may take before it completes with
    /// [`InvocationError::DeadlineExceeded`]. Also advertised to the server
    /// via `grpc-timeout`.
    pub deadline: Option<Duration>,
    /// Metadata (headers) to attach. Keys ending in `-bin` carry binary
    /// values and are transported base64-encoded.
    pub metadata: Vec<(String, String)>,
}

/// Errors raised synchronously by [`RpcConnection::call`], before anything is
/// sent.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("method '{method}' not found on service '{service}'")]
    MethodNotFound { service: String, method: String },
    #[error("method '{method}' uses streaming, which is not supported")]
    StreamingUnsupported { method: String },
    #[error("invalid metadata (header) key '{key}': {source}")]
    InvalidMetadataKey {
        key: String,
        #[source]
        source: InvalidMetadataKey,
    },
    #[error("invalid metadata (header) value for key '{key}': {source}")]
    InvalidMetadataValue {
        key: String,
        #[source]
        source: InvalidMetadataValue,
    },
}

/// How a dispatched call failed.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The request never reached the server, or the connection broke.
    #[error("transport failure: {0}")]
    TransportFailure(#[source] BoxError),
    /// The configured deadline elapsed before a response arrived.
    #[error("call deadline exceeded")]
    DeadlineExceeded,
    /// The server processed the request and answered with a non-OK status.
    #[error("call failed with gRPC status: {0}")]
    ApplicationError(#[source] Status),
    /// The call was cancelled before it completed.
    #[error("call was cancelled")]
    Cancelled,
}

/// Handle to an in-flight call.
///
/// Dropping the handle does not cancel the call.
#[derive(Debug)]
pub struct CallHandle {
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallHandle {
    /// Cancels the call if it has not completed yet, in which case its
    /// callback observes [`InvocationError::Cancelled`]. Idempotent; after
    /// completion this is a no-op.
    pub fn cancel(&self) {
        if let Some(tx) = self.cancel.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl<S> RpcConnection<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Calls `method` with default [`CallOptions`].
    ///
    /// See [`RpcConnection::call_with`].
    pub fn call<F>(
        &self,
        method: &str,
        request: Value,
        on_complete: F,
    ) -> Result<CallHandle, DispatchError>
    where
        F: FnOnce(Result<Value, InvocationError>) + Send + 'static,
    {
        self.call_with(method, request, CallOptions::default(), on_complete)
    }

    /// Dispatches a unary call in the background.
    ///
    /// The method name and metadata are validated synchronously; on
    /// [`DispatchError`] nothing has been sent. Otherwise the call proceeds
    /// on the ambient Tokio runtime and `on_complete` is invoked exactly
    /// once, with either the decoded response or an [`InvocationError`].
    pub fn call_with<F>(
        &self,
        method: &str,
        request: Value,
        options: CallOptions,
        on_complete: F,
    ) -> Result<CallHandle, DispatchError>
    where
        F: FnOnce(Result<Value, InvocationError>) + Send + 'static,
    {
        let descriptor = self
            .service()
            .method(method)
            .ok_or_else(|| DispatchError::MethodNotFound {
                service: self.service().full_name().to_string(),
                method: method.to_string(),
            })?;
        if descriptor.is_client_streaming() || descriptor.is_server_streaming() {
            return Err(DispatchError::StreamingUnsupported {
                method: method.to_string(),
            });
        }

        let mut request = tonic::Request::new(request);
        apply_metadata(&mut request, &options.metadata)?;
        if let Some(deadline) = options.deadline {
            request.set_timeout(deadline);
        }

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let mut invoker = self.invoker.clone();
        let transcode = self.service().transcode();
        let deadline = options.deadline;

        tracing::debug!(method = %descriptor.full_name(), "dispatching call");
        tokio::spawn(async move {
            let rpc = async {
                let outcome = match deadline {
                    Some(deadline) => {
                        match tokio::time::timeout(
                            deadline,
                            invoker.unary(&descriptor, transcode, request),
                        )
                        .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => return Err(InvocationError::DeadlineExceeded),
                        }
                    }
                    None => invoker.unary(&descriptor, transcode, request).await,
                };
                match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(status)) => Err(classify_status(status)),
                    Err(GrpcRequestError::ClientNotReady(e)) => {
                        Err(InvocationError::TransportFailure(e))
                    }
                }
            };
            tokio::pin!(rpc);

            // Biased so that a cancellation issued before the first poll wins
            // over an already available response.
            let result = tokio::select! {
                biased;
                cancelled = &mut cancel_rx => match cancelled {
                    Ok(()) => Err(InvocationError::Cancelled),
                    // Handle dropped without cancelling; keep waiting.
                    Err(_) => rpc.await,
                },
                outcome = &mut rpc => outcome,
            };
            on_complete(result);
        });

        Ok(CallHandle {
            cancel: Mutex::new(Some(cancel_tx)),
        })
    }
}

fn apply_metadata(
    request: &mut tonic::Request<Value>,
    metadata: &[(String, String)],
) -> Result<(), DispatchError> {
    for (key, value) in metadata {
        if key.ends_with("-bin") {
            let name = BinaryMetadataKey::from_str(key).map_err(|source| {
                DispatchError::InvalidMetadataKey {
                    key: key.clone(),
                    source,
                }
            })?;
            request
                .metadata_mut()
                .insert_bin(name, BinaryMetadataValue::from_bytes(value.as_bytes()));
        } else {
            let name = AsciiMetadataKey::from_str(key).map_err(|source| {
                DispatchError::InvalidMetadataKey {
                    key: key.clone(),
                    source,
                }
            })?;
            let value = AsciiMetadataValue::from_str(value).map_err(|source| {
                DispatchError::InvalidMetadataValue {
                    key: key.clone(),
                    source,
                }
            })?;
            request.metadata_mut().insert(name, value);
        }
    }
    Ok(())
}

fn classify_status(status: Status) -> InvocationError {
    match status.code() {
        Code::DeadlineExceeded => InvocationError::DeadlineExceeded,
        Code::Cancelled => InvocationError::Cancelled,
        Code::Unavailable => InvocationError::TransportFailure(Box::new(status)),
        _ => InvocationError::ApplicationError(status),
    }
}
