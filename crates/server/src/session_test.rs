//! Tests for the session worker, over in-memory duplex streams

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use shadowvm_client::{ClientConfig, ShadowClient};
use shadowvm_protocol::{NetReference, ProtocolError, WireReader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{HandlerTable, RequestHandler};
use crate::error::{Result, SessionError, ShadowError};
use crate::metrics::ServerMetrics;
use crate::session::{Session, SessionConfig, SessionEnd, SessionState};
use crate::test_util::{CallLog, recording_registry, take_calls};

/// Bytes a client produces
fn client_bytes(f: impl FnOnce(&ShadowClient<Vec<u8>>)) -> Vec<u8> {
    let client = ShadowClient::new(Vec::new(), ClientConfig::default());
    f(&client);
    client.into_inner().unwrap()
}

fn point_event(client: &ShadowClient<Vec<u8>>) {
    let id = client.register_method("test.First.point").unwrap();
    let mut event = client.analysis_start(id).unwrap();
    event.send_int(3);
    event.send_int(4);
    event.analysis_end().unwrap();
}

struct Harness {
    session: Session,
    log: CallLog,
    metrics: Arc<ServerMetrics>,
}

fn harness(handlers: HandlerTable, config: SessionConfig) -> Harness {
    let (registry, log) = recording_registry();
    let metrics = Arc::new(ServerMetrics::new());
    let session = Session::new(1, registry, Arc::new(handlers), config, Arc::clone(&metrics));
    Harness {
        session,
        log,
        metrics,
    }
}

/// Feed `input` through a duplex of `capacity` bytes, then close the write side
async fn run_with(mut harness: Harness, input: Vec<u8>, capacity: usize) -> (Result<SessionEnd>, Harness) {
    let (mut client, server) = tokio::io::duplex(capacity);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(async move {
        let result = harness.session.run(server, &cancel).await;
        (result, harness)
    });

    // the session may stop reading early on errors
    let _ = client.write_all(&input).await;
    let _ = client.shutdown().await;
    task.await.unwrap()
}

async fn run(input: Vec<u8>) -> (Result<SessionEnd>, Harness) {
    run_with(harness(HandlerTable::standard(), SessionConfig::default()), input, 64 * 1024).await
}

// =============================================================================
// Normal operation
// =============================================================================

#[tokio::test]
async fn test_point_event_then_close() {
    let input = client_bytes(|client| {
        point_event(client);
        client.close().unwrap();
    });

    let (result, h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Closed);
    assert_eq!(take_calls(&h.log), vec!["first:0(3, 4)", "first:exit"]);

    // REGISTER_ANALYSIS, ANALYZE, CLOSE
    assert_eq!(h.metrics.snapshot().messages_received, 3);
}

#[tokio::test]
async fn test_eof_runs_exit_hooks() {
    let input = client_bytes(point_event);

    let (result, h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Eof);
    assert_eq!(take_calls(&h.log), vec!["first:0(3, 4)", "first:exit"]);
}

#[tokio::test]
async fn test_bytes_after_close_are_ignored() {
    let mut input = client_bytes(|client| client.close().unwrap());
    input.push(0x42);

    let (result, _h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Closed);
}

#[tokio::test]
async fn test_byte_by_byte_delivery() {
    let input = client_bytes(|client| {
        point_event(client);
        client.close().unwrap();
    });

    let h = harness(HandlerTable::standard(), SessionConfig::default());
    let (result, h) = run_with(h, input, 1).await;
    assert_eq!(result.unwrap(), SessionEnd::Closed);
    assert_eq!(take_calls(&h.log), vec!["first:0(3, 4)", "first:exit"]);
}

#[tokio::test]
async fn test_class_load_then_object_event() {
    let loader = NetReference::from_raw(100);
    let mut refs = (NetReference::NULL, NetReference::NULL);
    let input = client_bytes(|client| {
        let class_ref = client.load_class("pkg/Foo", loader, &[], None).unwrap();
        let obj = client.new_object(class_ref).unwrap();
        let id = client.register_method("test.First.obj").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event.send_object(Some(obj));
        event.analysis_end().unwrap();
        refs = (class_ref, obj);
    });
    let (class_ref, obj) = refs;

    let (result, h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Eof);

    let shadows = &h.session.state().shadows;
    let class = shadows.resolve(class_ref).unwrap();
    assert_eq!(class.as_class().unwrap().name(), "pkg/Foo");
    assert_eq!(class.as_class().unwrap().loader(), loader);

    let object = shadows.resolve(obj).unwrap();
    assert_eq!(object.class().unwrap().name(), "pkg/Foo");
    assert_eq!(
        take_calls(&h.log),
        vec![format!("first:1(pkg/Foo@{})", obj.object_id()), "first:exit".to_string()]
    );
}

#[tokio::test]
async fn test_object_free_reaches_analyses() {
    let s = NetReference::object(9, 2);
    let input = client_bytes(|client| {
        client.register_method("test.Second.any").unwrap();
        client.string_info(s, "bye").unwrap();
        client.objects_freed(&[s, NetReference::object(77, 2)]).unwrap();
    });

    let (result, h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Eof);
    assert!(h.session.state().shadows.resolve(s).is_err());
    assert_eq!(take_calls(&h.log), vec!["second:free \"bye\"", "second:exit"]);
}

#[tokio::test]
async fn test_large_free_batch_in_small_chunks() {
    let s = NetReference::object(9, 2);
    let input = client_bytes(|client| {
        client.register_method("test.Second.any").unwrap();
        client.string_info(s, "bye").unwrap();
        let mut batch: Vec<_> = (100..5100).map(|i| NetReference::object(i, 2)).collect();
        batch.push(s);
        client.objects_freed(&batch).unwrap();
        client.close().unwrap();
    });

    let h = harness(HandlerTable::standard(), SessionConfig::default());
    let (result, h) = run_with(h, input, 256).await;
    assert_eq!(result.unwrap(), SessionEnd::Closed);
    assert_eq!(take_calls(&h.log), vec!["second:free \"bye\"", "second:exit"]);
    assert_eq!(h.metrics.snapshot().messages_received, 4);
}

#[tokio::test]
async fn test_object_state_survives_across_events() {
    let mut obj = NetReference::NULL;
    let input = client_bytes(|client| {
        let class_ref = client.load_class("pkg/Foo", NetReference::NULL, &[], None).unwrap();
        obj = client.new_object(class_ref).unwrap();
        let id = client.register_method("test.First.visit").unwrap();
        for _ in 0..2 {
            let mut event = client.analysis_start(id).unwrap();
            event.send_object(Some(obj));
            event.analysis_end().unwrap();
        }
    });

    let (result, h) = run(input).await;
    assert_eq!(result.unwrap(), SessionEnd::Eof);
    let id = obj.object_id();
    assert_eq!(
        take_calls(&h.log),
        vec![
            format!("first:visit pkg/Foo@{id} #1"),
            format!("first:visit pkg/Foo@{id} #2"),
            "first:exit".to_string(),
        ]
    );
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_truncated_message_is_desync() {
    let mut input = client_bytes(point_event);
    input.pop();

    let (result, h) = run(input).await;
    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::Protocol(ProtocolError::Truncated { .. })));
    assert!(err.is_desync());

    // the registration went through, the event did not
    assert_eq!(take_calls(&h.log), vec!["first:exit"]);
}

#[tokio::test]
async fn test_unknown_tag_is_desync() {
    let mut input = client_bytes(|client| {
        client.register_method("test.First.point").unwrap();
    });
    input.extend_from_slice(&[0x42, 1, 2, 3]);

    let (result, h) = run(input).await;
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::UnknownTag(0x42)))
    ));
    assert_eq!(take_calls(&h.log), vec!["first:exit"]);
}

#[tokio::test]
async fn test_unresolved_reference_is_fatal() {
    let input = client_bytes(|client| {
        let id = client.register_method("test.First.obj").unwrap();
        let mut event = client.analysis_start(id).unwrap();
        event.send_object(Some(NetReference::object(5, 3)));
        event.analysis_end().unwrap();
    });

    let (result, _h) = run(input).await;
    assert!(matches!(
        result,
        Err(SessionError::Shadow(ShadowError::Unresolved(_)))
    ));
}

#[tokio::test]
async fn test_oversized_message_rejected() {
    let input = client_bytes(|client| {
        client
            .load_class("pkg/Big", NetReference::NULL, &[0u8; 512], None)
            .unwrap();
    });
    let config = SessionConfig {
        max_message_size: 128,
        ..Default::default()
    };

    let h = harness(HandlerTable::standard(), config);
    let (result, _h) = run_with(h, input, 64 * 1024).await;
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::MessageTooLarge { .. }))
    ));
}

#[tokio::test]
async fn test_message_over_limit_in_one_read_rejected() {
    let config = SessionConfig {
        max_message_size: 256,
        ..Default::default()
    };
    // the code length equals the limit, the whole message exceeds it
    let input = client_bytes(|client| {
        client
            .load_class("pkg/Edge", NetReference::NULL, &[0u8; 256], None)
            .unwrap();
    });

    let h = harness(HandlerTable::standard(), config);
    let (result, _h) = run_with(h, input, 64 * 1024).await;
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::MessageTooLarge { max: 256, .. }))
    ));
}

#[tokio::test]
async fn test_cancellation_runs_exit_hooks() {
    let input = client_bytes(|client| {
        client.register_method("test.First.point").unwrap();
    });

    let mut h = harness(HandlerTable::standard(), SessionConfig::default());
    let metrics = Arc::clone(&h.metrics);
    let (mut client, server) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    client.write_all(&input).await.unwrap();

    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let result = h.session.run(server, &token).await;
        (result, h)
    });
    while metrics.snapshot().messages_received < 1 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let (result, h) = task.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Cancelled);
    let calls = take_calls(&h.log);
    assert_eq!(calls.last().map(String::as_str), Some("first:exit"));
    drop(client);
}

// =============================================================================
// Replies
// =============================================================================

fn ping(reader: &mut WireReader<'_>, out: &mut BytesMut, state: &mut SessionState, _: bool) -> Result<()> {
    let value = reader.read_u32()?;
    out.put_u32(value.wrapping_add(state.id as u32));
    Ok(())
}

#[tokio::test]
async fn test_handler_replies_are_flushed() {
    let mut handlers = HandlerTable::standard();
    handlers.register(
        100,
        RequestHandler {
            name: "ping",
            handle: ping,
            exit: None,
        },
    );
    let mut h = harness(handlers, SessionConfig::default());

    let (mut client, server) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(async move { h.session.run(server, &cancel).await });

    client.write_all(&[100, 0, 0, 0, 41]).await.unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(u32::from_be_bytes(reply), 42);

    client.write_all(&[0]).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);
}
