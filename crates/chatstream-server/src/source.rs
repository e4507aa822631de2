//! Token source trait and built-in sources.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chatstream_protocol::ChatMessage;
use futures_util::Stream;

use crate::error::Result;

/// Failure produced by a token stream mid-flight.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for lazy assistant-reply streams.
///
/// The stream ends after the last fragment on success; a failure surfaces as
/// one `Err` item, after which the stream must not be polled again.
pub type TokenStream = Pin<Box<dyn Stream<Item = std::result::Result<String, SourceError>> + Send>>;

/// Trait for producing assistant replies as lazy fragment streams.
///
/// Implementors receive the full conversation so far and return a stream
/// that emits the reply incrementally. How the fragments are produced, by a
/// hosted model, a local process, or a script, is invisible to the engine.
#[async_trait]
pub trait TokenSource: Clone + Send + Sync + 'static {
    /// Open a reply stream for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if no stream could be opened at all; failures after
    /// streaming began are reported through the stream itself.
    async fn open(&self, history: &[ChatMessage]) -> Result<TokenStream>;
}

/// A source that echoes the last user message back, word by word.
///
/// Stands in for a real model during development and demos.
#[derive(Debug, Clone)]
pub struct EchoSource {
    fragment_delay: Duration,
}

impl EchoSource {
    /// Create an echo source with the given delay between fragments.
    pub fn new(fragment_delay: Duration) -> Self {
        Self { fragment_delay }
    }
}

impl Default for EchoSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl TokenSource for EchoSource {
    async fn open(&self, history: &[ChatMessage]) -> Result<TokenStream> {
        let text = history
            .iter()
            .rev()
            .find(|msg| msg.is_user())
            .map(|msg| msg.content.clone())
            .unwrap_or_default();

        let reply = if text.trim().is_empty() {
            "I did not catch that.".to_string()
        } else {
            format!("Echo: {}", text)
        };

        let delay = self.fragment_delay;
        let words: Vec<String> = reply.split_whitespace().map(|s| s.to_string()).collect();

        Ok(Box::pin(async_stream::stream! {
            for word in words {
                yield Ok(format!("{} ", word));
                tokio::time::sleep(delay).await;
            }
        }))
    }
}

/// Ready-made sources and streams for tests and demos.
pub mod sources {
    use super::*;

    /// A stream that yields the given fragments and completes.
    pub fn scripted(fragments: Vec<String>) -> TokenStream {
        Box::pin(async_stream::stream! {
            for fragment in fragments {
                yield Ok(fragment);
            }
        })
    }

    /// A stream that yields the given fragments and then fails.
    pub fn failing(fragments: Vec<String>, error: impl Into<String>) -> TokenStream {
        let error = error.into();
        Box::pin(async_stream::stream! {
            for fragment in fragments {
                yield Ok(fragment);
            }
            yield Err(SourceError::from(error));
        })
    }

    /// A stream that never yields anything.
    pub fn pending() -> TokenStream {
        Box::pin(futures_util::stream::pending())
    }

    /// A source that replays the same script for every turn.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedSource {
        fragments: Vec<String>,
        fragment_delay: Duration,
        fail_with: Option<String>,
        never_yield: bool,
    }

    impl ScriptedSource {
        /// Create a source that streams the given fragments.
        pub fn new(fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                fragments: fragments.into_iter().map(Into::into).collect(),
                ..Default::default()
            }
        }

        /// Create a source whose streams never produce anything.
        pub fn stalled() -> Self {
            Self {
                never_yield: true,
                ..Default::default()
            }
        }

        /// Sleep this long before each fragment.
        pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
            self.fragment_delay = delay;
            self
        }

        /// Fail with this message after the scripted fragments.
        pub fn with_failure(mut self, message: impl Into<String>) -> Self {
            self.fail_with = Some(message.into());
            self
        }
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn open(&self, _history: &[ChatMessage]) -> Result<TokenStream> {
            if self.never_yield {
                return Ok(pending());
            }

            let fragments = self.fragments.clone();
            let delay = self.fragment_delay;
            let fail_with = self.fail_with.clone();

            Ok(Box::pin(async_stream::stream! {
                for fragment in fragments {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    yield Ok(fragment);
                }
                if let Some(message) = fail_with {
                    yield Err(SourceError::from(message));
                }
            }))
        }
    }
}
