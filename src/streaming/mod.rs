//! Streaming conversation replies.
//!
//! The generator turns one pending user message into an ordered stream of
//! reply fragments, keeping the session's chat handle in sync as a side
//! effect. The remote protocol is abstracted behind [`ChatTransport`].

mod generator;

pub use generator::{ResponseGenerator, ResponseStream};

use crate::error::StreamError;
use crate::session::Turn;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport for one streamed model exchange.
///
/// Implementations send `message` against the supplied conversational
/// context and push reply fragments into `fragments` in arrival order,
/// returning once the remote stream ends. Returning an error after some
/// fragments were sent is normal; nothing already pushed is retracted.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message_stream(
        &self,
        system_prompt: String,
        prior_turns: Vec<Turn>,
        message: String,
        fragments: mpsc::Sender<String>,
    ) -> Result<(), StreamError>;
}
