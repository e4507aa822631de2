//! End-to-end tests over a real WebSocket connection.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chatstream_protocol::{codec, ClientFrame, Frame, FrameKind};
use chatstream_server::sources::ScriptedSource;
use chatstream_server::{ChatServer, ServerConfig, TokenSource};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server<S: TokenSource>(source: S) -> SocketAddr {
    let server = ChatServer::with_config(source, ServerConfig::default().with_logging(false));
    let router = server.build_router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

async fn connect(addr: SocketAddr, session_id: &str) -> WsClient {
    let url = format!("ws://{}/ws/{}", addr, session_id);
    let (client, _) = connect_async(url.as_str()).await.expect("connect websocket");
    client
}

async fn send_message(client: &mut WsClient, text: &str) {
    let payload = serde_json::to_string(&ClientFrame::new(text)).expect("encode client frame");
    client
        .send(Message::Text(payload.into()))
        .await
        .expect("send client frame");
}

/// Read frames, skipping transport-level messages, until one arrives.
async fn next_frame(client: &mut WsClient) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection ended while waiting for frame")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return codec::decode(text.as_str()).expect("server sent undecodable frame");
        }
    }
}

/// Read frames until a terminal frame for the current turn arrives.
async fn read_turn(client: &mut WsClient) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(client).await;
        let kind = frame.kind();
        frames.push(frame);
        if matches!(kind, FrameKind::AiComplete | FrameKind::Error) {
            return frames;
        }
    }
}

#[tokio::test]
async fn test_turn_streams_in_order_with_shared_timestamp() {
    let addr = spawn_server(ScriptedSource::new(["Hel", "lo"])).await;
    let mut client = connect(addr, "session-order").await;

    let greeting = next_frame(&mut client).await;
    assert_eq!(greeting.kind(), FrameKind::Status);

    send_message(&mut client, "hi").await;
    let frames = read_turn(&mut client).await;
    let kinds: Vec<_> = frames.iter().map(Frame::kind).collect();
    assert_eq!(
        kinds,
        vec![
            FrameKind::UserMessage,
            FrameKind::AiStart,
            FrameKind::AiChunk,
            FrameKind::AiChunk,
            FrameKind::AiComplete,
        ]
    );

    let chunks: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            Frame::AiChunk(c) => Some(c.chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Hel", "lo"]);

    let turn = frames[0].timestamp();
    assert!(frames.iter().all(|f| f.timestamp() == turn));
}

#[tokio::test]
async fn test_next_turn_accepted_after_terminal_frame() {
    let addr = spawn_server(ScriptedSource::new(["ok"])).await;
    let mut client = connect(addr, "session-turns").await;
    next_frame(&mut client).await; // greeting

    for i in 0..3 {
        send_message(&mut client, &format!("message {}", i)).await;
        let frames = read_turn(&mut client).await;
        assert_eq!(
            frames.last().map(Frame::kind),
            Some(FrameKind::AiComplete),
            "turn {} should complete",
            i
        );
    }
}

#[tokio::test]
async fn test_second_message_mid_turn_is_rejected() {
    let source = ScriptedSource::new(["a", "b", "c", "d"])
        .with_fragment_delay(Duration::from_millis(50));
    let addr = spawn_server(source).await;
    let mut client = connect(addr, "session-busy").await;
    next_frame(&mut client).await; // greeting

    send_message(&mut client, "first").await;

    // Wait for the reply to open, then interrupt it.
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(&mut client).await;
        let kind = frame.kind();
        frames.push(frame);
        if kind == FrameKind::AiStart {
            break;
        }
    }
    send_message(&mut client, "second").await;

    loop {
        let frame = next_frame(&mut client).await;
        let kind = frame.kind();
        frames.push(frame);
        if kind == FrameKind::AiComplete {
            break;
        }
    }

    let starts = frames.iter().filter(|f| f.kind() == FrameKind::AiStart).count();
    assert_eq!(starts, 1, "a rejected message must not open a second reply");

    let rejection = frames
        .iter()
        .find_map(|f| match f {
            Frame::Error(e) => Some(e.message.clone()),
            _ => None,
        })
        .expect("mid-turn message should be answered with an error frame");
    assert!(rejection.contains("already in progress"));

    // The interrupted turn still delivered every fragment.
    let chunks: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            Frame::AiChunk(c) => Some(c.chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_failing_source_reports_error_and_recovers() {
    let addr = spawn_server(ScriptedSource::new(["par"]).with_failure("backend gone")).await;
    let mut client = connect(addr, "session-failure").await;
    next_frame(&mut client).await; // greeting

    send_message(&mut client, "hi").await;
    let frames = read_turn(&mut client).await;
    let kinds: Vec<_> = frames.iter().map(Frame::kind).collect();
    assert_eq!(
        kinds,
        vec![
            FrameKind::UserMessage,
            FrameKind::AiStart,
            FrameKind::AiChunk,
            FrameKind::Error,
        ]
    );

    // The failed turn frees the session for the next message.
    send_message(&mut client, "again").await;
    let frames = read_turn(&mut client).await;
    assert_eq!(frames[0].kind(), FrameKind::UserMessage);
}

#[tokio::test]
async fn test_undecodable_payload_answered_without_closing() {
    let addr = spawn_server(ScriptedSource::new(["ok"])).await;
    let mut client = connect(addr, "session-garbage").await;
    next_frame(&mut client).await; // greeting

    client
        .send(Message::Text("{not json".to_string().into()))
        .await
        .expect("send garbage");
    let frame = next_frame(&mut client).await;
    assert_eq!(frame.kind(), FrameKind::Error);

    // The connection is still usable.
    send_message(&mut client, "hi").await;
    let frames = read_turn(&mut client).await;
    assert_eq!(frames.last().map(Frame::kind), Some(FrameKind::AiComplete));
}

#[tokio::test]
async fn test_duplicate_session_id_is_refused() {
    let addr = spawn_server(ScriptedSource::new(["ok"])).await;
    let mut first = connect(addr, "session-dup").await;
    next_frame(&mut first).await; // greeting

    let mut second = connect(addr, "session-dup").await;
    let frame = next_frame(&mut second).await;
    match frame {
        Frame::Error(e) => assert!(e.message.contains("already connected")),
        other => panic!("expected refusal, got {:?}", other),
    }

    // The original connection is untouched.
    send_message(&mut first, "hi").await;
    let frames = read_turn(&mut first).await;
    assert_eq!(frames.last().map(Frame::kind), Some(FrameKind::AiComplete));
}

#[tokio::test]
async fn test_sessions_do_not_observe_each_other() {
    let addr = spawn_server(ScriptedSource::new(["ok"])).await;
    let mut left = connect(addr, "session-left").await;
    let mut right = connect(addr, "session-right").await;
    next_frame(&mut left).await; // greeting
    next_frame(&mut right).await; // greeting

    send_message(&mut left, "hello from left").await;
    let frames = read_turn(&mut left).await;
    assert_eq!(frames.last().map(Frame::kind), Some(FrameKind::AiComplete));

    // Nothing from left's turn leaks onto right's channel.
    let leaked = tokio::time::timeout(Duration::from_millis(200), right.next()).await;
    assert!(leaked.is_err(), "right channel received {:?}", leaked);
}

#[tokio::test]
async fn test_disconnect_mid_stream_frees_the_session() {
    let source = ScriptedSource::new(["a"; 100]).with_fragment_delay(Duration::from_millis(20));
    let addr = spawn_server(source).await;

    let mut client = connect(addr, "session-gone").await;
    next_frame(&mut client).await; // greeting
    send_message(&mut client, "hi").await;

    // Leave while the reply is still streaming.
    loop {
        if next_frame(&mut client).await.kind() == FrameKind::AiChunk {
            break;
        }
    }
    client.close(None).await.expect("close websocket");
    drop(client);

    // The server tears the session down shortly after; a reconnect with the
    // same id must get a fresh session instead of a duplicate refusal.
    let mut accepted = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut retry = connect(addr, "session-gone").await;
        match next_frame(&mut retry).await {
            Frame::Status(_) => {
                accepted = true;
                break;
            }
            Frame::Error(_) => continue,
            other => panic!("unexpected frame on reconnect: {:?}", other),
        }
    }
    assert!(accepted, "session was never released after disconnect");
}
