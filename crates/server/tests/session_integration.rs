//! Integration tests: blocking client against a TCP server
//!
//! Tests: event delivery, class/object resolution, session isolation,
//! truncated streams, built-in counters, shutdown

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shadowvm_client::{ClientConfig, ObjectData, ShadowClient};
use shadowvm_protocol::{ArgKind, NetReference};
use shadowvm_server::analysis::builtin::{EventCounts, register_builtins};
use shadowvm_server::{
    AnalysisError, AnalysisRegistry, MethodSignature, MetricsSnapshot, RemoteAnalysis, ServerConfig,
    ServerError, ServerMetrics, ShadowEntry, ShadowServer, Value,
};

// =============================================================================
// Test analysis
// =============================================================================

/// What the test analysis saw, one entry per call
type Seen = Arc<Mutex<Vec<String>>>;

struct Watcher {
    seen: Seen,
}

impl RemoteAnalysis for Watcher {
    fn method(&mut self, name: &str) -> Option<MethodSignature> {
        match name {
            "point" => MethodSignature::from_descriptor(0, "(II)V"),
            "object" => Some(MethodSignature::new(1, [ArgKind::Object])),
            _ => None,
        }
    }

    fn invoke(&mut self, slot: usize, args: &[Value]) -> Result<(), AnalysisError> {
        let line = match (slot, args) {
            (0, [x, y]) => format!("point {} {}", x, y),
            (1, [Value::Object(Some(entry))]) => describe(entry),
            _ => return Err(AnalysisError::bad_argument(0, "unexpected arguments")),
        };
        self.seen.lock().push(line);
        Ok(())
    }
}

fn describe(entry: &ShadowEntry) -> String {
    let class = entry.class().map_or("?", |c| c.name());
    match entry.as_str() {
        Some(value) => format!("{class} {value}"),
        None => class.to_string(),
    }
}

fn watcher_registry() -> (AnalysisRegistry, Seen) {
    let seen = Seen::default();
    let mut registry = AnalysisRegistry::new();
    let watcher_seen = Arc::clone(&seen);
    registry.register("test.Watcher", move || {
        Box::new(Watcher {
            seen: Arc::clone(&watcher_seen),
        }) as Box<dyn RemoteAnalysis>
    });
    (registry, seen)
}

// =============================================================================
// Harness
// =============================================================================

struct Running {
    addr: SocketAddr,
    metrics: Arc<ServerMetrics>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start(registry: AnalysisRegistry) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        port: addr.port(),
        ..Default::default()
    };
    let server = ShadowServer::new(config, registry);
    let metrics = server.metrics();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.serve(listener, cancel.clone()));
    Running {
        addr,
        metrics,
        cancel,
        task,
    }
}

impl Running {
    /// Wait until `done` sessions have finished
    async fn sessions_finished(&self, done: u64) -> MetricsSnapshot {
        for _ in 0..500 {
            let snapshot = self.metrics.snapshot();
            if snapshot.connections_total >= done && snapshot.connections_active == 0 {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sessions did not finish: {:?}", self.metrics.snapshot());
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap().unwrap();
    }
}

/// Run a blocking client against the server
async fn with_client<F>(addr: SocketAddr, f: F)
where
    F: FnOnce(&ShadowClient) + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let client = ShadowClient::connect(addr, ClientConfig::default()).unwrap();
        f(&client);
        client.close().unwrap();
    })
    .await
    .unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_point_event_delivered_once() {
    let (registry, seen) = watcher_registry();
    let server = start(registry).await;

    with_client(server.addr, |client| {
        let id = client.register_method("test.Watcher.point").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event.send_int(3);
        event.send_int(4);
        event.analysis_end().unwrap();
    })
    .await;

    let snapshot = server.sessions_finished(1).await;
    assert_eq!(snapshot.sessions_failed, 0);
    assert_eq!(*seen.lock(), vec!["point 3 4"]);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_class_load_resolves_object_class() {
    let (registry, seen) = watcher_registry();
    let server = start(registry).await;

    with_client(server.addr, |client| {
        let class_ref = client
            .load_class("pkg/Foo", NetReference::from_raw(100), &[], None)
            .unwrap();
        let obj = client.new_object(class_ref).unwrap();

        let id = client.register_method("test.Watcher.object").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event.send_object(Some(obj));
        event.analysis_end().unwrap();
    })
    .await;

    server.sessions_finished(1).await;
    assert_eq!(*seen.lock(), vec!["pkg/Foo"]);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inline_string_data() {
    let (registry, seen) = watcher_registry();
    let server = start(registry).await;

    with_client(server.addr, |client| {
        let string_class = client
            .load_class("java/lang/String", NetReference::NULL, &[], None)
            .unwrap();
        let s = client.new_object(string_class).unwrap();

        let id = client.register_method("test.Watcher.object").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event
            .send_object_plus_data(s, ObjectData::String("hello"))
            .unwrap();
        event.analysis_end().unwrap();
    })
    .await;

    server.sessions_finished(1).await;
    assert_eq!(*seen.lock(), vec!["java/lang/String hello"]);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_isolated() {
    let (registry, seen) = watcher_registry();
    let server = start(registry).await;

    // Both clients allocate identical references for different classes
    let clients = ["a/First", "b/Second"].map(|name| {
        with_client(server.addr, move |client| {
            let class_ref = client
                .load_class(name, NetReference::from_raw(7), &[], None)
                .unwrap();
            let obj = client.new_object(class_ref).unwrap();
            assert_eq!(obj, NetReference::object(2, 1));

            let id = client.register_method("test.Watcher.object").unwrap();
            for _ in 0..50 {
                let mut event = client.analysis_start(id).unwrap();
                event.send_object(Some(obj));
                event.analysis_end().unwrap();
            }
        })
    });
    let [a, b] = clients;
    tokio::join!(a, b);

    let snapshot = server.sessions_finished(2).await;
    assert_eq!(snapshot.sessions_failed, 0);

    let seen = seen.lock();
    assert_eq!(seen.len(), 100);
    assert_eq!(seen.iter().filter(|s| *s == "a/First").count(), 50);
    assert_eq!(seen.iter().filter(|s| *s == "b/Second").count(), 50);
    drop(seen);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_stream_fails_session_only() {
    let (registry, seen) = watcher_registry();
    let server = start(registry).await;
    let addr = server.addr;

    tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        // REGISTER_ANALYSIS announcing a 16-byte name, only 3 bytes sent
        stream.write_all(&[6, 0, 1, 0, 16, b'a', b'b', b'c']).unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();
    })
    .await
    .unwrap();

    let snapshot = server.sessions_finished(1).await;
    assert_eq!(snapshot.sessions_failed, 1);

    // the server keeps serving
    with_client(addr, |client| {
        let id = client.register_method("test.Watcher.point").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event.send_int(1);
        event.send_int(2);
        event.analysis_end().unwrap();
    })
    .await;

    let snapshot = server.sessions_finished(2).await;
    assert_eq!(snapshot.sessions_failed, 1);
    assert_eq!(*seen.lock(), vec!["point 1 2"]);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_counter_totals() {
    let counts = EventCounts::new();
    let mut registry = AnalysisRegistry::new();
    register_builtins(&mut registry, &counts);
    let server = start(registry).await;

    with_client(server.addr, |client| {
        let tick = client.register_method("shadowvm.EventCounter.tick").unwrap();
        for i in 0..5 {
            let mut event = client.analysis_start(tick).unwrap();
            event.send_long(i);
            event.analysis_end().unwrap();
        }
        client.objects_freed(&[NetReference::object(1, 1)]).unwrap();
    })
    .await;

    server.sessions_finished(1).await;
    let snapshot = counts.snapshot();
    assert_eq!(snapshot.sessions, 1);
    assert_eq!(snapshot.invocations["tick"], 5);
    // the reference was never registered, so no analysis saw a free
    assert_eq!(snapshot.frees, 0);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_finishes_open_sessions() {
    let counts = EventCounts::new();
    let mut registry = AnalysisRegistry::new();
    register_builtins(&mut registry, &counts);
    let server = start(registry).await;
    let addr = server.addr;

    // Keep the connection open until the server has stopped
    let (registered_tx, registered_rx) = std::sync::mpsc::channel();
    let (stopped_tx, stopped_rx) = std::sync::mpsc::channel::<()>();
    let client = tokio::task::spawn_blocking(move || {
        let client = ShadowClient::connect(addr, ClientConfig::default()).unwrap();
        let id = client.register_method("shadowvm.EventCounter.open").unwrap();
        let event = client.analysis_start(id).unwrap();
        event.analysis_end().unwrap();
        client.flush().unwrap();
        registered_tx.send(()).unwrap();
        let _ = stopped_rx.recv();
    });

    tokio::task::spawn_blocking(move || registered_rx.recv().unwrap())
        .await
        .unwrap();
    while server.metrics.snapshot().messages_received < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    server.stop().await;
    assert_eq!(counts.snapshot().invocations["open"], 1);

    stopped_tx.send(()).unwrap();
    client.await.unwrap();
}
