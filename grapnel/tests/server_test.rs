use grapnel::schema::{Schema, SchemaLoadOptions, ServiceSchema};
use grapnel::server::handler::{HandlerSet, MethodHandler};
use grapnel::server::{
    BindError, Lifecycle, RegistrationError, ReregistrationPolicy, RpcServer, ServerConfig,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/schema")
        .join(name)
}

fn inventory_service() -> ServiceSchema {
    Schema::load(fixture("inventory.proto"), &SchemaLoadOptions::default())
        .unwrap()
        .resolve_service("inventory.v1", "Inventory")
        .unwrap()
}

fn unary_handlers() -> HandlerSet {
    HandlerSet::new()
        .with(
            "GetItem",
            MethodHandler::new(|_request| async move { Ok(json!({ "sku": "widget" })) }),
        )
        .with(
            "AddItem",
            MethodHandler::from_fn(|_request| Ok(json!({ "accepted": true }))),
        )
}

async fn bind_ephemeral(server: &RpcServer) -> u16 {
    let (tx, rx) = tokio::sync::oneshot::channel();
    server
        .bind_with("127.0.0.1:0", move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    rx.await.unwrap().unwrap()
}

#[test]
fn incomplete_handler_set_reports_missing_methods() {
    let server = RpcServer::new();
    let service = inventory_service();

    let only_get = HandlerSet::new().with(
        "GetItem",
        MethodHandler::from_fn(|request| Ok(request)),
    );
    let err = server.register_service(&service, only_get).unwrap_err();

    match err {
        RegistrationError::IncompleteHandlerSet {
            service, missing, ..
        } => {
            assert_eq!(service, "inventory.v1.Inventory");
            // WatchStock streams, so it is not required.
            assert_eq!(missing, vec!["AddItem".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Validation failed, so nothing was registered.
    assert!(server.service_names().is_empty());
}

#[test]
fn streaming_methods_need_no_handlers() {
    let server = RpcServer::new();
    server
        .register_service(&inventory_service(), unary_handlers())
        .unwrap();
    assert_eq!(server.service_names(), vec!["inventory.v1.Inventory"]);
}

#[test]
fn handlers_for_unknown_or_streaming_methods_are_dropped() {
    let server = RpcServer::new();
    let handlers = unary_handlers()
        .with("Ghost", MethodHandler::from_fn(|request| Ok(request)))
        .with("WatchStock", MethodHandler::from_fn(|request| Ok(request)));
    server
        .register_service(&inventory_service(), handlers)
        .unwrap();
    assert_eq!(server.service_names(), vec!["inventory.v1.Inventory"]);
}

#[test]
fn default_policy_replaces_existing_registrations() {
    let server = RpcServer::new();
    let service = inventory_service();
    server.register_service(&service, unary_handlers()).unwrap();
    server.register_service(&service, unary_handlers()).unwrap();
    assert_eq!(server.service_names().len(), 1);
}

#[test]
fn reject_policy_refuses_reregistration() {
    let server = RpcServer::with_config(ServerConfig {
        reregistration: ReregistrationPolicy::Reject,
        ..ServerConfig::default()
    });
    let service = inventory_service();
    server.register_service(&service, unary_handlers()).unwrap();

    let err = server
        .register_service(&service, unary_handlers())
        .unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateService(name) if name == "inventory.v1.Inventory"));
}

#[tokio::test]
async fn bind_reports_the_actual_port() {
    let server = RpcServer::new();
    assert_eq!(server.lifecycle(), Lifecycle::Unbound);

    let port = bind_ephemeral(&server).await;
    assert_ne!(port, 0);
    assert_eq!(server.lifecycle(), Lifecycle::Bound { port });
}

#[tokio::test]
async fn concurrent_bind_attempts_are_rejected() {
    let server = RpcServer::new();
    let port = bind_ephemeral(&server).await;

    let err = server.bind("127.0.0.1:0").unwrap_err();
    assert_eq!(err.0, Lifecycle::Bound { port });
}

#[tokio::test]
async fn malformed_address_fails_the_bind_and_allows_retry() {
    let server = RpcServer::new();

    let (tx, rx) = tokio::sync::oneshot::channel();
    server
        .bind_with("not-an-address", move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, BindError::MalformedAddress { .. }));
    assert_eq!(server.lifecycle(), Lifecycle::Failed);

    // A failed server may try again.
    let port = bind_ephemeral(&server).await;
    assert_eq!(server.lifecycle(), Lifecycle::Bound { port });
}

const BIND_FATALITY_CHILD: &str = "GRAPNEL_BIND_FATALITY_CHILD";

#[test]
fn unobserved_bind_failure_is_fatal_to_the_process() {
    if std::env::var_os(BIND_FATALITY_CHILD).is_some() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let server = RpcServer::new();
            server.bind("not-an-address").unwrap();
            // Only reached if the process outlives the failure.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        std::process::exit(0);
    }

    let output = std::process::Command::new(std::env::current_exe().unwrap())
        .args(["unobserved_bind_failure_is_fatal_to_the_process", "--exact"])
        .env(BIND_FATALITY_CHILD, "1")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn occupied_port_reports_address_in_use() {
    let first = RpcServer::new();
    let port = bind_ephemeral(&first).await;

    let second = RpcServer::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    second
        .bind_with(format!("127.0.0.1:{port}"), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, BindError::AddressInUse { .. }));
    assert_eq!(second.lifecycle(), Lifecycle::Failed);
    // The established server is unaffected.
    assert_eq!(first.lifecycle(), Lifecycle::Bound { port });
}

#[tokio::test]
async fn shutdown_returns_the_server_to_unbound() {
    let server = RpcServer::new();
    bind_ephemeral(&server).await;

    server.shutdown();
    for _ in 0..100 {
        if server.lifecycle() == Lifecycle::Unbound {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.lifecycle(), Lifecycle::Unbound);

    // A stopped server may bind again.
    let port = bind_ephemeral(&server).await;
    assert_eq!(server.lifecycle(), Lifecycle::Bound { port });
}
