//! Integration tests for the RPC client.
//!
//! These tests start either the reference server or a hand-rolled stub on
//! a temporary Unix socket and drive the client against it end to end.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use allpath_rpc::config::{ClientConfig, ServerConfig};
use allpath_rpc::functions::{FnFunction, FunctionRegistry};
use allpath_rpc::protocol::{decode_request, Request, Response};
use allpath_rpc::socket::{ConnectionMetrics, SocketListener};
use allpath_rpc::{BlockingClient, ErrorKind, Provider, RpcClient, RpcError};

const PACKAGE: &str = "dojutsu-agent";

/// Reference server on a temporary socket.
struct TestServer {
    socket_path: PathBuf,
    metrics: Arc<ConnectionMetrics>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn start(registry: FunctionRegistry) -> Self {
        Self::start_with(registry, |_| {}).await
    }

    async fn start_with<F>(registry: FunctionRegistry, configure: F) -> Self
    where
        F: FnOnce(&mut ServerConfig),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let socket_path = temp_dir.path().join("allpath_runner.sock");

        let mut config = ServerConfig::new(&socket_path);
        configure(&mut config);

        let listener = SocketListener::bind(config, registry)
            .await
            .expect("Failed to bind socket");
        let metrics = listener.metrics();

        let shutdown = Arc::new(Notify::new());
        let shutdown_for_run = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            if let Err(e) = listener.run(shutdown_for_run).await {
                eprintln!("Listener error: {}", e);
            }
        });

        Self {
            socket_path,
            metrics,
            shutdown,
            handle,
            _temp_dir: temp_dir,
        }
    }

    fn client(&self) -> RpcClient {
        client_for(&self.socket_path, Duration::from_secs(5))
    }

    async fn stop(self) {
        self.shutdown.notify_waiters();
        self.handle.abort();
    }
}

fn client_for(path: &Path, timeout: Duration) -> RpcClient {
    RpcClient::new(ClientConfig::new(path).with_call_timeout(timeout)).expect("valid config")
}

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::with_builtins(PACKAGE);
    registry.register_fn("skills_count", |_| Ok(json!({"count": 42})));
    registry.register_fn("echo", |args| Ok(json!({"args": args})));
    registry
}

/// A stub server that accepts one connection and runs `behavior` on it.
fn stub_server<F, Fut, T>(behavior: F) -> (TempDir, PathBuf, JoinHandle<T>)
where
    F: FnOnce(UnixStream) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let socket_path = temp_dir.path().join("stub.sock");
    let listener = UnixListener::bind(&socket_path).expect("Failed to bind stub socket");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        behavior(stream).await
    });

    (temp_dir, socket_path, handle)
}

/// A stub that reads the whole request, replies with `reply`, and closes.
/// Resolves to the raw request bytes.
fn replying_stub(reply: &'static [u8]) -> (TempDir, PathBuf, JoinHandle<Vec<u8>>) {
    stub_server(move |mut stream| async move {
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.expect("read request");
        stream.write_all(reply).await.expect("write reply");
        stream.shutdown().await.expect("shutdown");
        request
    })
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_skills_count_end_to_end() {
    let server = TestServer::start(registry()).await;
    let client = server.client();

    let map = client.call("skills_count", Vec::<String>::new()).await.unwrap();
    assert_eq!(map["count"], json!(42));

    assert_eq!(client.skills_count().await.unwrap(), 42);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stub_error_reply_is_remote_error() {
    let (_dir, path, stub) = replying_stub(br#"{"error": "unknown function"}"#);
    let client = client_for(&path, Duration::from_secs(5));

    let result = client.call("does_not_exist", ["a"]).await;
    match result {
        Err(err @ RpcError::Remote { .. }) => {
            assert_eq!(err.kind(), ErrorKind::Remote);
            assert!(!err.is_retryable());
            assert!(matches!(err, RpcError::Remote { ref detail } if detail == "unknown function"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reference_server_rejects_unknown_function() {
    let server = TestServer::start(registry()).await;

    let result = server.client().call("teleport", ["now"]).await;
    match result {
        Err(RpcError::Remote { detail }) => {
            assert!(detail.starts_with("Unknown function 'teleport'"), "detail: {}", detail);
            assert!(detail.contains("skills_count"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builtins() {
    let server = TestServer::start(registry()).await;
    let client = server.client();

    let pong = client.call("ping", Vec::<String>::new()).await.unwrap();
    assert_eq!(pong["pong"], true);

    let version = client.version().await.unwrap();
    assert_eq!(version.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(version.package.as_deref(), Some(PACKAGE));
    assert!(version.providers.iter().any(|p| p == "groq"));

    server.stop().await;
}

// ============================================================================
// Request encoding
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_function_and_args_round_trip() {
    let server = TestServer::start(registry()).await;
    let client = server.client();

    let cases: Vec<Vec<&str>> = vec![
        vec![],
        vec![""],
        vec!["first", "", "third", ""],
        vec!["z", "y", "x"],
        vec!["multi\nline", "tab\there", "quote \" and \\ backslash", "ünïcødé 🥷"],
    ];

    for args in cases {
        let map = client.call("echo", args.clone()).await.unwrap();
        assert_eq!(map["args"], json!(args), "args did not survive: {:?}", args);
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_envelope_on_the_wire() {
    let (_dir, path, stub) = replying_stub(br#"{"ok": true}"#);
    let client = client_for(&path, Duration::from_secs(5));

    client.call("run", ["task", "", "groq"]).await.unwrap();

    let raw = stub.await.unwrap();
    assert_eq!(
        String::from_utf8(raw.clone()).unwrap(),
        r#"{"package":"dojutsu-agent","function":"run","args":["task","","groq"]}"#
    );

    let request = decode_request(&raw).unwrap();
    assert_eq!(
        request,
        Request::new(PACKAGE, "run", ["task", "", "groq"]).unwrap()
    );
}

// ============================================================================
// Response interpretation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_key_wins_regardless_of_other_keys() {
    let (_dir, path, stub) = replying_stub(
        br#"{"execution": "fn main() {}", "total_time": 3.2, "error": "provider quota exceeded"}"#,
    );
    let client = client_for(&path, Duration::from_secs(5));

    match client.call("run", ["task"]).await {
        Err(RpcError::Remote { detail }) => assert_eq!(detail, "provider quota exceeded"),
        other => panic!("expected remote error, got {:?}", other),
    }

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_success_map_matches_parsed_json() {
    const REPLY: &[u8] = br#"{
        "byakugan": "analysis",
        "execution": "code",
        "skills_used": ["dev_expert", "github_actions"],
        "timing": {"byakugan": 1.25, "execution": 4.0},
        "total_time": 5.25,
        "cached": false,
        "note": null
    }"#;
    let (_dir, path, stub) = replying_stub(REPLY);
    let client = client_for(&path, Duration::from_secs(5));

    let map = client.call("run", ["task"]).await.unwrap();
    let expected = as_object(serde_json::from_slice(REPLY).unwrap());

    assert_eq!(map.len(), expected.len());
    for (key, value) in &expected {
        assert_eq!(map.get(key), Some(value), "mismatch for key {}", key);
    }

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exchange_returns_tagged_response() {
    let (_dir, path, stub) = replying_stub(br#"{"error": "bad args"}"#);
    let client = client_for(&path, Duration::from_secs(5));

    let request = Request::new(PACKAGE, "check_skill", Vec::<String>::new()).unwrap();
    let response = client.exchange(&request).await.unwrap();
    assert_eq!(response, Response::failure("bad args"));

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_json_is_malformed() {
    let replies: [&'static [u8]; 5] = [
        b"",
        br#"{"count": 4"#,
        b"[1, 2, 3]",
        b"\"just a string\"",
        b"Traceback (most recent call last):",
    ];

    for reply in replies {
        let (_dir, path, stub) = replying_stub(reply);
        let client = client_for(&path, Duration::from_secs(5));

        let result = client.call("skills_count", Vec::<String>::new()).await;
        match result {
            Err(err @ RpcError::MalformedResponse { .. }) => {
                assert_eq!(err.kind(), ErrorKind::MalformedResponse);
            }
            other => panic!(
                "expected malformed for {:?}, got {:?}",
                String::from_utf8_lossy(reply),
                other
            ),
        }

        stub.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_without_reply_is_malformed() {
    let (_dir, path, stub) = stub_server(|mut stream| async move {
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.expect("read request");
        drop(stream);
    });
    let client = client_for(&path, Duration::from_secs(5));

    let result = client.call("version", Vec::<String>::new()).await;
    assert!(matches!(result, Err(RpcError::MalformedResponse { .. })), "got {:?}", result);

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_response_is_malformed() {
    let (_dir, path, stub) = replying_stub(br#"{"execution": "this reply is longer than the cap"}"#);
    let client = RpcClient::new(
        ClientConfig::new(&path)
            .with_call_timeout(Duration::from_secs(5))
            .with_max_response_size(16),
    )
    .unwrap();

    let result = client.call("run", ["task"]).await;
    assert!(matches!(result, Err(RpcError::MalformedResponse { .. })), "got {:?}", result);

    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_typed_view_shape_mismatch_is_malformed() {
    let (_dir, path, stub) = replying_stub(br#"{"count": "forty-two"}"#);
    let client = client_for(&path, Duration::from_secs(5));

    let result = client.skills_count().await;
    assert!(matches!(result, Err(RpcError::MalformedResponse { .. })), "got {:?}", result);

    stub.await.unwrap();
}

// ============================================================================
// Connection failures
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_endpoint_is_connection_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nobody-home.sock");
    let client = client_for(&path, Duration::from_secs(5));

    match client.call("version", Vec::<String>::new()).await {
        Err(err @ RpcError::Connection { .. }) => {
            assert!(err.is_retryable());
            assert!(matches!(&err, RpcError::Connection { path: p, .. } if p == &path));
        }
        other => panic!("expected connection error, got {:?}", other),
    }

    // The client never creates the endpoint.
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_socket_file_is_connection_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stale.sock");

    // Bind and drop: the file stays behind but nobody listens.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let client = client_for(&path, Duration::from_secs(5));
    let result = client.call("version", Vec::<String>::new()).await;
    assert!(matches!(result, Err(RpcError::Connection { .. })), "got {:?}", result);

    // The client never deletes the endpoint either.
    assert!(path.exists());
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_server_times_out_and_connection_is_closed() {
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let (_dir, path, stub) = stub_server(move |mut stream| async move {
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.expect("read request");

        // Hold the connection open without answering until the client gives up.
        let _ = release_rx.await;

        let mut saw_close = false;
        for _ in 0..20 {
            if stream.write_all(b"{}").await.is_err() {
                saw_close = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        (request, saw_close)
    });

    let client = client_for(&path, Duration::from_millis(200));
    let started = Instant::now();
    let result = client.call("run", ["task", "key"]).await;
    let elapsed = started.elapsed();

    match result {
        Err(err @ RpcError::Timeout { timeout_ms: 200 }) => assert!(err.is_retryable()),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(190), "returned too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "took too long: {:?}", elapsed);

    release_tx.send(()).unwrap();
    let (request, saw_close) = stub.await.unwrap();
    assert!(!request.is_empty(), "request should have been fully delivered");
    assert!(saw_close, "client should have closed its end after the timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_json_then_hang_is_timeout() {
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let (_dir, path, stub) = stub_server(move |mut stream| async move {
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.expect("read request");
        stream.write_all(br#"{"execution": "fn ma"#).await.expect("write partial");
        let _ = release_rx.await;
    });

    let client = client_for(&path, Duration::from_millis(200));
    let result = client.call("run", ["task"]).await;
    assert!(
        matches!(result, Err(RpcError::Timeout { .. })),
        "a slow writer cannot be told apart from a bad one; got {:?}",
        result
    );

    release_tx.send(()).unwrap();
    stub.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reference_server_slow_function_times_out() {
    let mut registry = registry();
    registry.register_fn("run", |_| {
        std::thread::sleep(Duration::from_millis(600));
        Ok(json!({"execution": "late"}))
    });
    let server = TestServer::start(registry).await;

    let client = client_for(&server.socket_path, Duration::from_millis(200));
    let result = client.call("run", ["task"]).await;
    assert!(matches!(result, Err(RpcError::Timeout { .. })), "got {:?}", result);

    // The server survives the client walking away.
    let map = server.client().call("skills_count", Vec::<String>::new()).await.unwrap();
    assert_eq!(map["count"], 42);

    server.stop().await;
}

// ============================================================================
// Server contract
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_package_is_remote_error() {
    let server = TestServer::start(registry()).await;
    let client = RpcClient::new(
        ClientConfig::new(&server.socket_path)
            .with_call_timeout(Duration::from_secs(5))
            .with_package("senjutsu-agent"),
    )
    .unwrap();

    match client.call("skills_count", Vec::<String>::new()).await {
        Err(RpcError::Remote { detail }) => assert_eq!(detail, "Unknown package 'senjutsu-agent'"),
        other => panic!("expected remote error, got {:?}", other),
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_arity_is_remote_error() {
    let mut registry = registry();
    registry.register(Arc::new(
        FnFunction::new("check_skill", |_| Ok(json!({"safe": true, "violations": []})))
            .with_arity(1, Some(1)),
    ));
    let server = TestServer::start(registry).await;
    let client = server.client();

    match client.call("check_skill", Vec::<String>::new()).await {
        Err(RpcError::Remote { detail }) => {
            assert_eq!(detail, "Wrong args for 'check_skill': expected exactly 1, got 0")
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    let check = client.check_skill("# skill").await.unwrap();
    assert!(check.safe);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_request_gets_error_response() {
    let server = TestServer::start_with(registry(), |config| config.max_request_size = 64).await;

    let big = "x".repeat(1000);
    match server.client().call("echo", [big]).await {
        Err(RpcError::Remote { detail }) => assert!(detail.contains("too large"), "detail: {}", detail),
        other => panic!("expected remote error, got {:?}", other),
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_larger_than_socket_buffer_gets_error_response() {
    let server = TestServer::start(registry()).await;

    // Several MiB over the default cap: the client is still writing when
    // the server hits the limit.
    let big = "x".repeat(4 * 1024 * 1024);
    match server.client().call("echo", [big]).await {
        Err(err @ RpcError::Remote { .. }) => {
            assert!(!err.is_retryable());
            assert!(err.to_string().contains("too large"), "error: {}", err);
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    // The server is still answering afterwards.
    assert_eq!(server.client().skills_count().await.unwrap(), 42);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_function_reports_message() {
    let mut registry = registry();
    registry.register_fn("run", |_| {
        Err(RpcError::Function {
            kind: allpath_rpc::error::FunctionErrorKind::Failed {
                message: "API key required. Pass as arg or set GROQ_API_KEY env var.".to_string(),
            },
        })
    });
    let server = TestServer::start(registry).await;

    match server.client().call("run", ["task"]).await {
        Err(RpcError::Remote { detail }) => {
            assert_eq!(detail, "API key required. Pass as arg or set GROQ_API_KEY env var.")
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    server.stop().await;
}

// ============================================================================
// Call independence
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_calls_use_fresh_connections() {
    let server = TestServer::start(registry()).await;
    let client = server.client();

    for i in 0..5 {
        let map = client.call("echo", [i.to_string()]).await.unwrap();
        assert_eq!(map["args"], json!([i.to_string()]));
    }

    // Metrics are recorded just after the response is written.
    let deadline = Instant::now() + Duration::from_secs(2);
    while server.metrics.total_requests() < 5 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.metrics.total_requests(), 5);
    assert_eq!(server.metrics.failed_requests(), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_from_one_client() {
    let server = TestServer::start(registry()).await;
    let client = server.client();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.call("echo", [format!("call-{}", i)]).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let map = handle.await.unwrap().unwrap();
        assert_eq!(map["args"], json!([format!("call-{}", i)]));
    }

    server.stop().await;
}

// ============================================================================
// Typed helpers
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_forwards_pipeline_args() {
    let mut registry = registry();
    registry.register_fn("run", |args| {
        Ok(json!({
            "byakugan": format!("task={}", args[0]),
            "execution": format!(
                "key={} provider={} model={} verbose={}",
                args[1],
                args[2],
                args.get(3).cloned().unwrap_or_default(),
                args.get(4).cloned().unwrap_or_default()
            ),
            "skills_used": ["dev_expert"],
            "timing": {"execution": 2.0},
            "total_time": 2.5
        }))
    });
    let server = TestServer::start(registry).await;
    let client = server.client();

    let output = client
        .run("build an API", "gsk_secret", Provider::OpenAi, Some("gpt-4o"), false)
        .await
        .unwrap();
    assert_eq!(output.byakugan.as_deref(), Some("task=build an API"));
    assert_eq!(
        output.execution.as_deref(),
        Some("key=gsk_secret provider=openai model=gpt-4o verbose=")
    );
    assert_eq!(output.skills_used, vec!["dev_expert"]);
    assert_eq!(output.total_time, Some(2.5));

    // Verbose keeps its fifth slot even without a model.
    let output = client
        .run("build an API", "gsk_secret", Provider::Groq, None, true)
        .await
        .unwrap();
    assert_eq!(
        output.execution.as_deref(),
        Some("key=gsk_secret provider=groq model= verbose=true")
    );

    server.stop().await;
}

// ============================================================================
// Blocking client
// ============================================================================

#[test]
fn test_blocking_client() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("blocking.sock");

    let listener = runtime
        .block_on(SocketListener::bind(ServerConfig::new(&socket_path), registry()))
        .unwrap();
    let shutdown = Arc::new(Notify::new());
    let shutdown_for_run = Arc::clone(&shutdown);
    runtime.spawn(async move {
        let _ = listener.run(shutdown_for_run).await;
    });

    let client = BlockingClient::new(
        ClientConfig::new(&socket_path).with_call_timeout(Duration::from_secs(5)),
    )
    .unwrap();

    assert_eq!(client.skills_count().unwrap(), 42);
    assert_eq!(client.version().unwrap().package.as_deref(), Some(PACKAGE));
    assert!(matches!(
        client.call("nope", Vec::<String>::new()),
        Err(RpcError::Remote { .. })
    ));

    shutdown.notify_waiters();
}
