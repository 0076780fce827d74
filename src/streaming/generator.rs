use super::ChatTransport;
use crate::error::StreamError;
use crate::session::{Message, SessionStore};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the fragment channel between the producer task and the
/// consumer. Bounded so a slow consumer applies backpressure to the remote
/// read instead of buffering the whole reply.
const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// Ordered, finite stream of reply fragments for one turn.
///
/// Fragments arrive in generation order; after the last fragment the stream
/// ends, or delivers a single terminal error if the remote exchange failed
/// partway. Dropping the stream stops delivery but the turn still runs to
/// completion in the background so the session context settles.
pub struct ResponseStream {
    rx: mpsc::Receiver<Result<String, StreamError>>,
}

impl ResponseStream {
    pub async fn recv(&mut self) -> Option<Result<String, StreamError>> {
        self.rx.recv().await
    }

    /// Drain the stream and return the concatenated reply text.
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        let mut full = String::new();
        while let Some(item) = self.recv().await {
            full.push_str(&item?);
        }
        Ok(full)
    }

    /// A stream that is already finished.
    fn empty() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx }
    }
}

/// Produces streamed assistant replies, one in-flight turn per session.
pub struct ResponseGenerator {
    transport: Arc<dyn ChatTransport>,
    store: SessionStore,
}

impl ResponseGenerator {
    pub fn new(transport: Arc<dyn ChatTransport>, store: SessionStore) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Send the newest message of `history` and stream the reply.
    ///
    /// A chat handle for the session is created lazily, seeded with
    /// everything except the pending last message. An empty or missing last
    /// message produces an empty stream without touching the remote service.
    /// A second call for the same session while a turn is still streaming is
    /// rejected with [`StreamError::SessionBusy`]; callers serialize turns.
    pub fn stream(
        &self,
        session_id: &str,
        history: &[Message],
        system_prompt: &str,
    ) -> Result<ResponseStream, StreamError> {
        let seed = if history.is_empty() {
            history
        } else {
            &history[..history.len() - 1]
        };
        let handle = self.store.ensure_handle(session_id, seed, system_prompt);

        // An empty newest turn is a deliberate no-op, not an error.
        let Some(last) = history.last().filter(|msg| !msg.content.is_empty()) else {
            debug!(
                "No pending message for session '{}', nothing to send",
                session_id
            );
            return Ok(ResponseStream::empty());
        };

        if !self.store.begin_turn(session_id) {
            warn!(
                "Rejected overlapping stream call for session '{}'",
                session_id
            );
            return Err(StreamError::SessionBusy(session_id.to_string()));
        }

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let transport = self.transport.clone();
        let store = self.store.clone();
        let session_id = session_id.to_string();
        let system_prompt = handle.system_prompt().to_string();
        let prior_turns = handle.turns().to_vec();
        let message = last.content.clone();

        tokio::spawn(async move {
            let (frag_tx, mut frag_rx) = mpsc::channel::<String>(FRAGMENT_CHANNEL_CAPACITY);

            let send_task = tokio::spawn({
                let transport = transport.clone();
                let message = message.clone();
                async move {
                    transport
                        .send_message_stream(system_prompt, prior_turns, message, frag_tx)
                        .await
                }
            });

            // Forward fragments as they arrive while accumulating the full
            // reply for the handle commit.
            let mut full_reply = String::new();
            let mut receiver_gone = false;
            while let Some(fragment) = frag_rx.recv().await {
                full_reply.push_str(&fragment);
                if !receiver_gone && tx.send(Ok(fragment)).await.is_err() {
                    // Consumer stopped reading; keep draining so the handle
                    // still settles.
                    debug!("Fragment consumer for session '{}' went away", session_id);
                    receiver_gone = true;
                }
            }

            let result = match send_task.await {
                Ok(result) => result,
                Err(e) => Err(StreamError::Transport(format!(
                    "send task failed: {}",
                    e
                ))),
            };

            match result {
                Ok(()) => {
                    store.commit_exchange(&session_id, message, full_reply);
                    debug!("Turn committed for session '{}'", session_id);
                }
                Err(e) => {
                    // Handle left untouched: the next attempt retries against
                    // the same context without reseeding history.
                    warn!("Stream failed for session '{}': {}", session_id, e);
                    let _ = tx.send(Err(e)).await;
                }
            }
            store.end_turn(&session_id);
        });

        Ok(ResponseStream { rx })
    }

    /// Forget a session's conversational context. The next `stream` call for
    /// this id starts a fresh handle seeded from whatever history the caller
    /// supplies.
    pub fn delete_conversation(&self, session_id: &str) {
        self.store.remove(session_id);
        info!("Conversation '{}' deleted", session_id);
    }
}
