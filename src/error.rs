use thiserror::Error;

/// Errors surfaced by the conversation streaming layer.
///
/// A transport or API failure is delivered as the terminal item of the
/// fragment stream; fragments already yielded are never retracted. The
/// session's chat handle survives a failed turn so the caller can retry
/// without reseeding history.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Network-level failure talking to the model service.
    #[error("chat request failed: {0}")]
    Transport(String),

    /// The model service answered with a non-success status.
    #[error("chat request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    /// The model refused the prompt (safety feedback, no candidates).
    #[error("model blocked the request: {0}")]
    Blocked(String),

    /// A response is already streaming for this session; the caller must
    /// wait for it to complete or fail before sending the next turn.
    #[error("a response is already streaming for session '{0}'")]
    SessionBusy(String),
}

/// Errors from the speech synthesis path.
///
/// `NoAudioData` is deliberately distinct from the transport variants: it
/// means the request itself succeeded but the response carried no usable
/// payload, which is the signal to fall back to local synthesis.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Network-level failure talking to the speech service.
    #[error("speech request failed: {0}")]
    Transport(String),

    /// The speech service answered with a non-success status.
    #[error("speech request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport succeeded but the response held no audio payload
    /// (malformed or safety-filtered).
    #[error("no audio data returned from model")]
    NoAudioData,

    /// Decoding or playing the returned audio failed.
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Errors from PCM decoding and audio output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioError {
    /// The payload is not valid s16le PCM (odd length or undecodable).
    #[error("malformed PCM payload: {0}")]
    MalformedPayload(String),

    /// Opening the output device or playing the buffer failed.
    #[error("audio output failed: {0}")]
    Output(String),
}
