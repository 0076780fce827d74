//! Speech synthesis with a deterministic local fallback.
//!
//! The remote voice returns raw PCM which flows through the codec and the
//! playback scheduler; any failure along that path degrades to the
//! on-device fallback voice instead of surfacing an error to the user.

use crate::audio_toolkit::pcm;
use crate::error::SpeechError;
use crate::fallback::FallbackSpeech;
use crate::playback::PlaybackScheduler;
use crate::settings::FALLBACK_LOCALE;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Transport for one remote speech request.
#[async_trait]
pub trait SpeechTransport: Send + Sync {
    /// Synthesize `text` with the fixed voice profile and return the raw
    /// PCM payload. Returns [`SpeechError::NoAudioData`] when the request
    /// succeeded but no payload came back.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Outcome of a synthesis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechResult {
    /// Raw PCM from the remote voice, ready for the codec.
    Remote(Vec<u8>),
    /// Local synthesis request, bypassing the PCM pipeline entirely.
    Fallback { text: String, locale: String },
}

/// Requests remote speech and decides between it and the local fallback.
pub struct SpeechSynthesizer {
    transport: Arc<dyn SpeechTransport>,
    fallback_locale: String,
}

impl SpeechSynthesizer {
    pub fn new(transport: Arc<dyn SpeechTransport>) -> Self {
        Self {
            transport,
            fallback_locale: FALLBACK_LOCALE.to_string(),
        }
    }

    /// Synthesize `text`, degrading to the local voice on any remote
    /// failure. Never fails; the worst case is reduced voice quality.
    pub async fn synthesize(&self, text: &str) -> SpeechResult {
        match self.transport.synthesize_speech(text).await {
            Ok(bytes) => SpeechResult::Remote(bytes),
            Err(SpeechError::NoAudioData) => {
                warn!("Speech model returned no audio data, using local fallback");
                self.fallback_for(text)
            }
            Err(e) => {
                warn!("Speech synthesis failed ({}), using local fallback", e);
                self.fallback_for(text)
            }
        }
    }

    fn fallback_for(&self, text: &str) -> SpeechResult {
        SpeechResult::Fallback {
            text: text.to_string(),
            locale: self.fallback_locale.clone(),
        }
    }
}

/// Speaks a piece of text end to end: remote synthesis, PCM decode,
/// scheduled playback, with the local voice as the degraded path.
pub struct Speaker {
    synthesizer: SpeechSynthesizer,
    scheduler: PlaybackScheduler,
    fallback: Arc<dyn FallbackSpeech>,
    // Covers the whole pending-or-playing window, not just playback.
    busy: Arc<AtomicBool>,
}

impl Speaker {
    pub fn new(
        synthesizer: SpeechSynthesizer,
        scheduler: PlaybackScheduler,
        fallback: Arc<dyn FallbackSpeech>,
    ) -> Self {
        Self {
            synthesizer,
            scheduler,
            fallback,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a speak request is currently pending or playing.
    pub fn is_speaking(&self) -> bool {
        self.busy.load(Ordering::SeqCst) || self.scheduler.is_active()
    }

    /// Speak `text` aloud, resolving when playback (or the fallback
    /// hand-off) is done.
    ///
    /// One playback slot: a request arriving while another is pending or
    /// playing is dropped rather than queued or overlapped, so a single
    /// output device never plays twice at once. This also applies to
    /// requests for different texts; see DESIGN.md.
    pub async fn speak(&self, text: &str) {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("Speech already pending or playing, ignoring repeat request");
            return;
        }

        match self.synthesizer.synthesize(text).await {
            SpeechResult::Remote(bytes) => match pcm::decode_to_samples(&bytes) {
                Ok(samples) => {
                    if let Err(e) = self.scheduler.play(samples).await {
                        warn!("Audio playback failed ({}), using local fallback", e);
                        self.fallback.speak(text, FALLBACK_LOCALE);
                    }
                }
                Err(e) => {
                    warn!(
                        "Discarding malformed speech payload ({}), using local fallback",
                        e
                    );
                    self.fallback.speak(text, FALLBACK_LOCALE);
                }
            },
            SpeechResult::Fallback { text, locale } => {
                self.fallback.speak(&text, &locale);
            }
        }

        self.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct FakeSpeechTransport {
        payload: Option<Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FakeSpeechTransport {
        fn with_payload(payload: Vec<u8>) -> Self {
            Self {
                payload: Some(payload),
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                payload: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechTransport for FakeSpeechTransport {
        async fn synthesize_speech(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.payload {
                Some(bytes) => Ok(bytes.clone()),
                None => Err(SpeechError::NoAudioData),
            }
        }
    }

    /// Counts invocations instead of spawning a process.
    struct CountingFallback {
        calls: AtomicUsize,
    }

    impl CountingFallback {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FallbackSpeech for CountingFallback {
        fn speak(&self, _text: &str, _locale: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_synthesize_returns_remote_payload() {
        let transport = Arc::new(FakeSpeechTransport::with_payload(vec![0x00, 0x40]));
        let synthesizer = SpeechSynthesizer::new(transport);

        match synthesizer.synthesize("ሰላም").await {
            SpeechResult::Remote(bytes) => assert_eq!(bytes, vec![0x00, 0x40]),
            other => panic!("expected remote payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_audio_data_falls_back_with_locale() {
        let transport = Arc::new(FakeSpeechTransport::empty());
        let synthesizer = SpeechSynthesizer::new(transport);

        match synthesizer.synthesize("ሰላም").await {
            SpeechResult::Fallback { text, locale } => {
                assert_eq!(text, "ሰላም");
                assert_eq!(locale, "am-ET");
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_payload_invokes_fallback_exactly_once() {
        let transport = Arc::new(FakeSpeechTransport::empty());
        let fallback = Arc::new(CountingFallback::new());
        let speaker = Speaker::new(
            SpeechSynthesizer::new(transport),
            PlaybackScheduler::new(None, 1.0),
            fallback.clone(),
        );

        speaker.speak("ሰላም").await;

        // The fallback ran once and the PCM pipeline was never entered.
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test]
    async fn test_malformed_payload_routes_to_fallback() {
        // Odd byte length: not valid s16le PCM.
        let transport = Arc::new(FakeSpeechTransport::with_payload(vec![0x00, 0x40, 0x7f]));
        let fallback = Arc::new(CountingFallback::new());
        let speaker = Speaker::new(
            SpeechSynthesizer::new(transport),
            PlaybackScheduler::new(None, 1.0),
            fallback.clone(),
        );

        speaker.speak("ሰላም").await;
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    /// Blocks inside the transport until released, to hold the speak slot
    /// open.
    struct BlockingSpeechTransport {
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechTransport for BlockingSpeechTransport {
        async fn synthesize_speech(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Err(SpeechError::NoAudioData)
        }
    }

    #[tokio::test]
    async fn test_repeat_speak_request_is_dropped_while_pending() {
        let transport = Arc::new(BlockingSpeechTransport {
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let fallback = Arc::new(CountingFallback::new());
        let speaker = Arc::new(Speaker::new(
            SpeechSynthesizer::new(transport.clone()),
            PlaybackScheduler::new(None, 1.0),
            fallback.clone(),
        ));

        let first = tokio::spawn({
            let speaker = speaker.clone();
            async move { speaker.speak("first").await }
        });

        // Let the first request reach the transport and park there.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(speaker.is_speaking());

        // The repeat request is a no-op, not a queue entry.
        speaker.speak("second").await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        transport.release.notify_one();
        first.await.unwrap();
        assert!(!speaker.is_speaking());
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }
}
