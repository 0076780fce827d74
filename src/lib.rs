//! Conversation streaming and speech synthesis core for Zemenai.ai.
//!
//! Two independent pipelines share this crate. Text generation: the
//! [`streaming::ResponseGenerator`] keeps one chat handle per session in a
//! [`session::SessionStore`] and exposes each assistant reply as an ordered
//! stream of fragments. Speech: the [`speech::Speaker`] requests remote
//! synthesis, decodes the raw PCM payload and schedules playback, degrading
//! to an on-device voice when the remote path yields nothing usable.
//!
//! The vendor protocol is confined to [`gemini`]; everything else talks
//! through the `ChatTransport` and `SpeechTransport` traits.

pub mod audio_toolkit;
pub mod cli;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod playback;
pub mod session;
pub mod settings;
pub mod speech;
pub mod streaming;

pub use error::{AudioError, SpeechError, StreamError};
pub use gemini::GeminiClient;
pub use playback::PlaybackScheduler;
pub use session::{ChatHandle, Message, Role, SessionStore};
pub use settings::AppSettings;
pub use speech::{Speaker, SpeechResult, SpeechSynthesizer, SpeechTransport};
pub use streaming::{ChatTransport, ResponseGenerator, ResponseStream};

/// Initialize console logging.
///
/// Honors `RUST_LOG` when set; otherwise defaults to info, or debug when
/// the debug flag is on.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}
