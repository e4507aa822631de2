//! Streaming coordinator: drives one token stream per turn.
//!
//! One invocation handles one turn end to end: record the user message,
//! announce the reply, forward fragments as they arrive, and close the turn
//! with exactly one terminal frame. A failed or cancelled reply never leaves
//! a partial assistant message in the session history.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use chatstream_protocol::{ChatMessage, Frame};

use crate::connection::ConnectionHandle;
use crate::registry::{SessionHandle, TurnState};
use crate::source::TokenSource;

/// Run one turn: stream the reply for `text` into the connection.
///
/// Terminates the turn with `ai_complete` or `error`, or silently when
/// cancelled or when the connection is gone, and always returns the session
/// to `Idle`.
pub(crate) async fn run_turn<S: TokenSource>(
    source: S,
    session: SessionHandle,
    handle: ConnectionHandle,
    text: String,
    cancel: CancellationToken,
    stream_timeout: Duration,
) {
    // The turn timestamp: assigned once, carried by every frame of this turn.
    let turn_started = Utc::now();

    let history = {
        let mut session = session.lock().await;
        session.push(ChatMessage::user(text.clone(), turn_started));
        session.history().to_vec()
    };

    let opened = handle.send(Frame::user_message(text, turn_started)).is_ok()
        && handle.send(Frame::ai_start(turn_started)).is_ok();
    if !opened {
        log::debug!("Connection gone before reply started, abandoning turn");
        settle(&session).await;
        return;
    }

    let mut stream = match source.open(&history).await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("Token source failed to open: {}", e);
            settle(&session).await;
            let _ = handle.send(Frame::error(e.user_message(), turn_started));
            return;
        }
    };

    let mut reply = String::new();
    loop {
        let step = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Turn cancelled mid-stream, dropping source");
                settle(&session).await;
                return;
            }
            step = tokio::time::timeout(stream_timeout, stream.next()) => step,
        };

        match step {
            // Bounded wait expired: treat the stream as failed.
            Err(_) => {
                log::warn!(
                    "No fragment within {:?}, aborting reply after {} chars",
                    stream_timeout,
                    reply.len()
                );
                settle(&session).await;
                let _ = handle.send(Frame::error(
                    crate::ServerError::StreamTimeout(stream_timeout).user_message(),
                    turn_started,
                ));
                return;
            }
            Ok(Some(Ok(fragment))) => {
                reply.push_str(&fragment);
                if handle.send(Frame::ai_chunk(fragment, turn_started)).is_err() {
                    log::debug!("Connection gone mid-stream, abandoning turn");
                    settle(&session).await;
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                log::error!("Token stream failed after {} chars: {}", reply.len(), e);
                // The partial reply is discarded, not recorded.
                settle(&session).await;
                let _ = handle.send(Frame::error(
                    format!("The assistant reply failed: {}", e),
                    turn_started,
                ));
                return;
            }
            Ok(None) => {
                let mut session = session.lock().await;
                session.push(ChatMessage::assistant(reply, Utc::now()));
                session.set_turn_state(TurnState::Idle);
                drop(session);
                let _ = handle.send(Frame::ai_complete(turn_started));
                return;
            }
        }
    }
}

/// Return the session to `Idle` without recording a reply.
async fn settle(session: &SessionHandle) {
    session.lock().await.set_turn_state(TurnState::Idle);
}
