//! Path-based dispatch for dynamically registered services.
//!
//! gRPC requests arrive as HTTP/2 `POST /namespace.Service/Method`. The
//! router looks the target up in the live registry and runs the matching
//! handler through `tonic`'s server machinery with the JSON codec. Anything
//! unroutable answers with a trailers-only `Unimplemented` response, the
//! same shape generated servers produce for unknown routes.
use super::{Registry, handler::MethodHandler};
use crate::BoxError;
use crate::grpc::codec::JsonCodec;
use crate::schema::TranscodeOptions;
use futures_util::future::BoxFuture;
use http::{HeaderValue, Request, Response, header::CONTENT_TYPE};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::convert::Infallible;
use std::task::{Context, Poll};
use tonic::Status;

/// Routes requests to the handlers of dynamically registered services.
///
/// Cloneable and cheap to clone; all clones observe the same registry, so
/// services registered after a clone was taken are still routable through it.
/// Usable directly as a `tower` service for in-process dispatch.
#[derive(Clone)]
pub struct ServiceRouter {
    registry: Registry,
}

impl ServiceRouter {
    pub(crate) fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn route(&self, path: &str) -> Result<Route, Status> {
        let (service_name, method_name) = split_path(path)
            .ok_or_else(|| Status::unimplemented(format!("malformed request path '{path}'")))?;

        let Some(entry) = self.registry.read().get(service_name).cloned() else {
            return Err(Status::unimplemented(format!(
                "service '{service_name}' is not registered"
            )));
        };
        let Some(method) = entry.schema.method(method_name) else {
            return Err(Status::unimplemented(format!(
                "method '{method_name}' not found on service '{service_name}'"
            )));
        };
        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(Status::unimplemented(format!(
                "method '{method_name}' uses streaming, which is not supported"
            )));
        }
        // Registration guarantees a handler for every unary method.
        let Some(handler) = entry.handlers.get(method_name).cloned() else {
            return Err(Status::internal(format!("no handler for '{path}'")));
        };

        Ok(Route {
            method,
            handler,
            transcode: entry.schema.transcode(),
        })
    }
}

struct Route {
    method: MethodDescriptor,
    handler: MethodHandler,
    transcode: TranscodeOptions,
}

impl<B> tower_service::Service<Request<B>> for ServiceRouter
where
    B: HttpBody + Send + 'static,
    B::Error: Into<BoxError> + Send + 'static,
{
    type Response = Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let routed = self.route(req.uri().path());
        Box::pin(async move {
            match routed {
                Ok(route) => {
                    tracing::debug!(method = %route.method.full_name(), "dispatching request");
                    let codec = JsonCodec::server(&route.method, route.transcode);
                    let mut grpc = tonic::server::Grpc::new(codec);
                    let call = HandlerCall {
                        handler: route.handler,
                    };
                    Ok(grpc.unary(call, req).await)
                }
                Err(status) => {
                    tracing::debug!(code = ?status.code(), "request not routable");
                    Ok(trailers_only(&status))
                }
            }
        })
    }
}

struct HandlerCall {
    handler: MethodHandler,
}

impl tonic::server::UnaryService<serde_json::Value> for HandlerCall {
    type Response = serde_json::Value;
    type Future = BoxFuture<'static, Result<tonic::Response<serde_json::Value>, Status>>;

    fn call(&mut self, request: tonic::Request<serde_json::Value>) -> Self::Future {
        let handler = self.handler.clone();
        Box::pin(async move {
            let reply = handler.invoke(request.into_inner()).await?;
            Ok(tonic::Response::new(reply))
        })
    }
}

fn split_path(path: &str) -> Option<(&str, &str)> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

/// A response carrying the status purely in headers, with an empty body.
fn trailers_only(status: &Status) -> Response<tonic::body::Body> {
    let mut response = Response::new(tonic::body::Body::empty());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert("grpc-status", HeaderValue::from(status.code() as i32));
    if let Ok(message) = HeaderValue::try_from(status.message()) {
        headers.insert("grpc-message", message);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::split_path;

    #[test]
    fn splits_well_formed_grpc_paths() {
        assert_eq!(
            split_path("/inventory.v1.Inventory/GetItem"),
            Some(("inventory.v1.Inventory", "GetItem"))
        );
        assert_eq!(split_path("/Echo/Say"), Some(("Echo", "Say")));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(split_path(""), None);
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("/only-service"), None);
        assert_eq!(split_path("/svc/"), None);
        assert_eq!(split_path("//Method"), None);
        assert_eq!(split_path("/svc/method/extra"), None);
    }
}
