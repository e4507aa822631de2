//! Session registry: id-keyed state for live chat sessions.
//!
//! Sessions exist only while their channel is open. The registry is the one
//! piece of state shared across connections; a session's own fields are only
//! ever touched by the connection that claimed it, so the per-session lock
//! is uncontended in normal operation.

use std::collections::HashMap;
use std::sync::Arc;

use chatstream_protocol::ChatMessage;
use tokio::sync::Mutex;

/// Whether a session is ready for input or has a reply in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Ready to accept the next user message.
    #[default]
    Idle,
    /// A reply is streaming; new user messages are rejected.
    AwaitingCompletion,
}

/// Server-side state for one chat session.
#[derive(Debug)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    turn_state: TurnState,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
            turn_state: TurnState::Idle,
        }
    }

    /// The client-chosen session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The conversation so far, in insertion order.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Append a message to the history.
    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// The current turn state.
    pub fn turn_state(&self) -> TurnState {
        self.turn_state
    }

    /// Set the turn state.
    pub fn set_turn_state(&mut self, state: TurnState) {
        self.turn_state = state;
    }
}

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Concurrency-safe map from session id to session state.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for `id`, creating it if absent.
    ///
    /// The boolean is true when this call created the session. A caller that
    /// receives `false` is looking at a session another connection already
    /// drives and must not take ownership of it.
    pub async fn get_or_create(&self, id: &str) -> (SessionHandle, bool) {
        let mut sessions = self.inner.lock().await;
        match sessions.get(id) {
            Some(session) => (session.clone(), false),
            None => {
                let session = Arc::new(Mutex::new(Session::new(id)));
                sessions.insert(id.to_string(), session.clone());
                (session, true)
            }
        }
    }

    /// Fetch the session for `id` if it is live.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.inner.lock().await.get(id).cloned()
    }

    /// Remove the session for `id`. Unknown ids are a no-op.
    pub async fn remove(&self, id: &str) {
        if self.inner.lock().await.remove(id).is_some() {
            log::info!("Session removed: {}", id);
        }
    }

    /// Ids of all live sessions.
    pub async fn session_ids(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
