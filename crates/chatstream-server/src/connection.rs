//! Per-connection WebSocket handling.
//!
//! Each accepted channel gets one handler task running the message loop, one
//! writer task draining the outbound queue, and at most one turn task at a
//! time. All outbound frames, whether produced here or by the streaming
//! coordinator, funnel through the same queue, so their order on the wire is
//! the order they were produced.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::future::OptionFuture;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chatstream_protocol::{codec, Frame};

use crate::error::{Result, ServerError};
use crate::registry::{SessionHandle, TurnState};
use crate::source::TokenSource;
use crate::{turn, AppState};

/// Cloneable handle for pushing outbound frames to one connection.
///
/// Frames are delivered to the peer in send order. Sending fails only once
/// the connection is gone, which callers use as their signal to stop.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ConnectionHandle {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame for delivery.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| ServerError::ConnectionClosed)
    }
}

/// Handler for the `GET /ws/{session_id}` upgrade endpoint.
pub async fn ws_handler<S: TokenSource>(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Drive one connection from upgrade to close.
async fn handle_socket<S: TokenSource>(socket: WebSocket, session_id: String, state: AppState<S>) {
    log::info!("WebSocket connected: {}", session_id);

    let (ws_tx, mut ws_rx) = socket.split();
    let (handle, outbound_rx) = ConnectionHandle::new();
    let writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));

    let (session, created) = state.registry.get_or_create(&session_id).await;
    if !created {
        // Another connection drives this id; refuse without touching it.
        log::warn!("Rejected duplicate connection for session: {}", session_id);
        let _ = handle.send(Frame::error(
            "This session is already connected elsewhere.",
            Utc::now(),
        ));
        drop(handle);
        let _ = writer.await;
        return;
    }

    let _ = handle.send(Frame::status(state.config.greeting.clone(), Utc::now()));

    let cancel = CancellationToken::new();
    let mut turn_task: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            Some(finished) = OptionFuture::from(turn_task.as_mut()) => {
                if let Err(e) = finished {
                    log::error!("Turn task for session {} failed: {}", session_id, e);
                }
                turn_task = None;
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&text, &session, &handle, &state, &cancel, &mut turn_task).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = handle.send(Frame::error(
                            "Binary frames are not supported on this channel.",
                            Utc::now(),
                        ));
                    }
                    // The transport answers pings on its own.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        log::info!("Client closed session: {}", session_id);
                        break;
                    }
                    Some(Err(e)) => {
                        log::warn!("WebSocket error on session {}: {}", session_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Teardown: stop the in-flight turn before the session goes away.
    cancel.cancel();
    if let Some(task) = turn_task.take() {
        if let Err(e) = task.await {
            log::error!("Turn task for session {} failed during close: {}", session_id, e);
        }
    }
    state.registry.remove(&session_id).await;
    drop(handle);
    let _ = writer.await;
    log::info!("WebSocket disconnected: {}", session_id);
}

/// Process one inbound text payload.
async fn handle_text<S: TokenSource>(
    text: &str,
    session: &SessionHandle,
    handle: &ConnectionHandle,
    state: &AppState<S>,
    cancel: &CancellationToken,
    turn_task: &mut Option<JoinHandle<()>>,
) {
    let frame = match codec::decode_client(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("Undecodable client frame: {}", e);
            let _ = handle.send(Frame::error(
                format!("Could not read message: {}", e),
                Utc::now(),
            ));
            return;
        }
    };

    let message = frame.message.trim();
    if message.is_empty() {
        return;
    }

    // A turn that already terminated may not have been reaped by the select
    // loop yet; collect it here so the finished turn cannot shadow an idle
    // session.
    if turn_task.as_ref().is_some_and(JoinHandle::is_finished) {
        if let Some(task) = turn_task.take() {
            if let Err(e) = task.await {
                log::error!("Turn task failed: {}", e);
            }
        }
    }

    let streaming = {
        let session = session.lock().await;
        session.turn_state() == TurnState::AwaitingCompletion
    };
    if streaming || turn_task.is_some() {
        // One turn at a time; the in-flight reply is unaffected.
        let _ = handle.send(Frame::error(
            "A reply is already in progress. Please wait for it to finish.",
            Utc::now(),
        ));
        return;
    }

    session
        .lock()
        .await
        .set_turn_state(TurnState::AwaitingCompletion);
    *turn_task = Some(tokio::spawn(turn::run_turn(
        state.source.clone(),
        session.clone(),
        handle.clone(),
        message.to_string(),
        cancel.child_token(),
        state.config.stream_timeout,
    )));
}

/// Drain the outbound queue into the socket, preserving order.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = rx.recv().await {
        let text = match codec::encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                log::error!("Dropping frame that failed to encode: {}", e);
                continue;
            }
        };
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            log::debug!("WebSocket send failed, client disconnected");
            break;
        }
    }
    let _ = ws_tx.close().await;
}
