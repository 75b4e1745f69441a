use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::prelude::*;
use pubnub_chat::codec::WireRecord;
use pubnub_chat::transport::{PubNubTransport, Transport};
use pubnub_chat::{ChatConfig, ChatError, Console};
use tokio::io::AsyncWriteExt;

const SUB_KEY: &str = "sub-c-test";
const SUBSCRIBE_PATH: &str = "/v2/subscribe/sub-c-test/chat-room,chat-room-pnpres/0";

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn config(server: &MockServer) -> ChatConfig {
    ChatConfig {
        publish_key: "pub-c-test".into(),
        subscribe_key: SUB_KEY.into(),
        origin: Some(server.base_url()),
        shutdown_grace: Duration::ZERO,
        ..Default::default()
    }
}

fn envelope(channel: &str, publisher: Option<&str>, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "a": "3",
        "f": 0,
        "i": publisher,
        "p": { "t": "150", "r": 1 },
        "k": SUB_KEY,
        "c": channel,
        "d": data,
        "b": channel,
    })
}

async fn mock_poll<'a>(
    server: &'a MockServer,
    tt: &str,
    next_tt: &str,
    messages: serde_json::Value,
    delay: Duration,
) -> httpmock::Mock<'a> {
    let body = serde_json::json!({ "t": { "t": next_tt, "r": 1 }, "m": messages });
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(SUBSCRIBE_PATH)
                .query_param("tt", tt)
                .query_param("uuid", "bob");
            then.status(200)
                .delay(delay)
                .header("content-type", "application/json")
                .json_body(body);
        })
        .await
}

async fn wait_for(out: &SharedBuf, needle: &str) {
    let found = tokio::time::timeout(Duration::from_secs(10), async {
        while !out.text().contains(needle) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(found.is_ok(), "never saw {needle:?} in:\n{}", out.text());
}

#[tokio::test]
async fn full_session_against_mock_backend() {
    let server = MockServer::start_async().await;
    mock_poll(&server, "0", "100", serde_json::json!([]), Duration::ZERO).await;
    mock_poll(
        &server,
        "100",
        "200",
        serde_json::json!([
            envelope(
                "chat-room-pnpres",
                None,
                serde_json::json!({ "action": "join", "uuid": "carol", "occupancy": 2, "timestamp": 1 }),
            ),
            envelope(
                "chat-room",
                Some("carol"),
                serde_json::json!({ "username": "carol", "message": "hi bob", "timestamp": "12:00:00" }),
            ),
            envelope(
                "chat-room",
                Some("bob"),
                serde_json::json!({ "username": "bob", "message": "own echo", "timestamp": "12:00:01" }),
            ),
        ]),
        Duration::ZERO,
    )
    .await;
    mock_poll(
        &server,
        "200",
        "200",
        serde_json::json!([]),
        Duration::from_secs(60),
    )
    .await;
    let publish = server
        .mock_async(|when, then| {
            when.method(GET)
                .path_contains("/publish/pub-c-test/sub-c-test/0/chat-room/0/")
                .path_contains("hello")
                .query_param("uuid", "bob");
            then.status(200)
                .json_body(serde_json::json!([1, "Sent", "17000000000000000"]));
        })
        .await;
    let leave = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/presence/sub-key/sub-c-test/channel/chat-room/leave");
            then.status(200).json_body(serde_json::json!({
                "status": 200,
                "message": "OK",
                "action": "leave",
                "service": "Presence",
            }));
        })
        .await;

    let out = SharedBuf::default();
    let console = Console::new(out.clone());
    let (mut stdin, reader) = tokio::io::duplex(1024);
    let session = tokio::spawn(pubnub_chat::run(
        config(&server),
        console,
        tokio::io::BufReader::new(reader),
    ));

    stdin.write_all(b"bob\n").await.unwrap();
    wait_for(&out, "carol: hi bob").await;

    stdin.write_all(b"hello\nquit\n").await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok(), "{result:?}");

    let text = out.text();
    assert!(text.contains("Welcome bob!"));
    assert!(text.contains("✅ Connected to PubNub!"));
    assert!(text.contains("🟢 carol joined the chat"));
    assert!(text.contains("💬 [12:00:00] carol: hi bob"));
    assert!(!text.contains("own echo"));
    assert!(text.ends_with("👋 Goodbye!\n"));
    publish.assert_async().await;
    leave.assert_async().await;
}

#[tokio::test]
async fn forbidden_subscribe_ends_session_with_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(SUBSCRIBE_PATH);
            then.status(403).json_body(serde_json::json!({
                "status": 403,
                "message": "Forbidden",
                "error": true,
            }));
        })
        .await;
    let publish = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/publish/");
            then.status(200);
        })
        .await;

    let out = SharedBuf::default();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        pubnub_chat::run(
            config(&server),
            Console::new(out.clone()),
            "bob\nhello\n".as_bytes(),
        ),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(ChatError::Transport(_))), "{result:?}");
    assert!(out.text().contains("PubNub error"));
    assert!(!out.text().contains("✅ Connected"));
    assert_eq!(publish.hits_async().await, 0);
}

async fn mock_publish<'a>(server: &'a MockServer, text: &str, status: u16) -> httpmock::Mock<'a> {
    let body = if status == 200 {
        serde_json::json!([1, "Sent", "17000000000000000"])
    } else {
        serde_json::json!({ "status": status, "message": "Forbidden", "error": true })
    };
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path_contains("/publish/pub-c-test/sub-c-test/0/chat-room/0/")
                .path_contains(text);
            then.status(status).json_body(body);
        })
        .await
}

#[tokio::test]
async fn rejected_publish_maps_to_publish_error() {
    let server = MockServer::start_async().await;
    mock_publish(&server, "denied", 403).await;
    mock_publish(&server, "allowed", 200).await;

    let (transport, _events) = PubNubTransport::connect(&config(&server), "bob").unwrap();
    let record = |text: &str| WireRecord {
        username: "bob".into(),
        message: text.into(),
        timestamp: "12:00:00".into(),
    };

    match transport.publish("chat-room", &record("denied")).await {
        Err(ChatError::Publish(msg)) => assert!(msg.contains("403"), "{msg}"),
        other => panic!("expected Publish error, got {other:?}"),
    }
    assert_eq!(transport.publish("chat-room", &record("allowed")).await.unwrap(), 200);
}

#[tokio::test]
async fn session_continues_after_rejected_publish() {
    let server = MockServer::start_async().await;
    mock_poll(&server, "0", "100", serde_json::json!([]), Duration::ZERO).await;
    mock_poll(
        &server,
        "100",
        "100",
        serde_json::json!([]),
        Duration::from_secs(60),
    )
    .await;
    let denied = mock_publish(&server, "denied", 403).await;
    let allowed = mock_publish(&server, "allowed", 200).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/leave");
            then.status(200).json_body(serde_json::json!({ "status": 200 }));
        })
        .await;

    let out = SharedBuf::default();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        pubnub_chat::run(
            config(&server),
            Console::new(out.clone()),
            "bob\ndenied\nallowed\nquit\n".as_bytes(),
        ),
    )
    .await
    .unwrap();

    assert!(result.is_ok(), "{result:?}");
    assert_eq!(denied.hits_async().await, 1);
    assert_eq!(allowed.hits_async().await, 1);
    assert!(out.text().ends_with("👋 Goodbye!\n"));
}
