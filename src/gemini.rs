//! Wire-level client for the Gemini generative and speech models.
//!
//! Everything protocol-specific lives here; the rest of the crate talks to
//! this module through the [`ChatTransport`] and [`SpeechTransport`] traits.

use crate::error::{AudioError, SpeechError, StreamError};
use crate::session::{Role, Turn};
use crate::settings::{AppSettings, TTS_VOICE};
use crate::speech::SpeechTransport;
use crate::streaming::ChatTransport;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(rename = "safetySettings", skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Vec::is_empty")]
    response_modalities: Vec<String>,
    #[serde(rename = "speechConfig", skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    /// Sampling parameters for conversational replies.
    fn chat() -> Self {
        Self {
            temperature: Some(0.5),
            top_k: Some(40),
            top_p: Some(0.95),
            max_output_tokens: Some(2048),
            response_modalities: Vec::new(),
            speech_config: None,
        }
    }

    /// Audio-only response with a fixed prebuilt voice.
    fn speech(voice_name: &str) -> Self {
        Self {
            temperature: None,
            top_k: None,
            top_p: None,
            max_output_tokens: None,
            response_modalities: vec!["AUDIO".to_string()],
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice_name.to_string(),
                    },
                },
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechConfig {
    #[serde(rename = "voiceConfig")]
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
struct VoiceConfig {
    #[serde(rename = "prebuiltVoiceConfig")]
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
struct PrebuiltVoiceConfig {
    #[serde(rename = "voiceName")]
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

const BLOCK_MEDIUM_AND_ABOVE: &str = "BLOCK_MEDIUM_AND_ABOVE";

fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|&category| SafetySetting {
        category,
        threshold: BLOCK_MEDIUM_AND_ABOVE,
    })
    .collect()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_part(self) -> Option<ResponsePart> {
        self.candidates?
            .into_iter()
            .next()?
            .content?
            .parts?
            .into_iter()
            .next()
    }
}

/// HTTP client for the Gemini API, bound to one chat model and one speech
/// model.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    chat_model: String,
    tts_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chat_model: settings.chat_model.clone(),
            tts_model: settings.tts_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn role_name(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }

    fn build_chat_request(
        system_prompt: &str,
        prior_turns: &[Turn],
        message: &str,
    ) -> GenerateContentRequest {
        let mut contents: Vec<Content> = prior_turns
            .iter()
            .map(|turn| Content {
                role: Some(Self::role_name(turn.role).to_string()),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: message.to_string(),
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            }),
            generation_config: Some(GenerationConfig::chat()),
            safety_settings: default_safety_settings(),
        }
    }
}

/// Extract the text fragment carried by one SSE line, if any.
///
/// Lines that are not `data:` events, and chunks that fail to parse, are
/// skipped rather than treated as fatal; a safety block terminates the
/// stream with an error.
fn parse_sse_line(line: &str) -> Result<Option<String>, StreamError> {
    let Some(json) = line.strip_prefix("data: ") else {
        return Ok(None);
    };

    match serde_json::from_str::<GenerateContentResponse>(json) {
        Ok(chunk) => {
            if let Some(reason) = chunk
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.clone())
            {
                return Err(StreamError::Blocked(reason));
            }
            Ok(chunk.first_part().and_then(|part| part.text))
        }
        Err(e) => {
            debug!("Skipping unparseable stream chunk: {}", e);
            Ok(None)
        }
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    async fn send_message_stream(
        &self,
        system_prompt: String,
        prior_turns: Vec<Turn>,
        message: String,
        fragments: mpsc::Sender<String>,
    ) -> Result<(), StreamError> {
        let request = Self::build_chat_request(&system_prompt, &prior_turns, &message);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.chat_model, self.api_key
        );

        debug!(
            "Streaming chat request to model '{}' ({} prior turns)",
            self.chat_model,
            prior_turns.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(StreamError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        // SSE events arrive on line boundaries, but the byte chunks do not;
        // buffer until a full line is available so multi-byte characters are
        // never split.
        let mut pending: Vec<u8> = Vec::new();

        while let Some(item) = stream.next().await {
            let bytes = item
                .map_err(|e| StreamError::Transport(format!("response stream failed: {}", e)))?;
            pending.extend_from_slice(&bytes);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(text) = parse_sse_line(line.trim())? {
                    if fragments.send(text).await.is_err() {
                        debug!("Fragment receiver dropped, draining remote stream");
                    }
                }
            }
        }

        // Trailing data without a final newline.
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            if let Some(text) = parse_sse_line(line.trim())? {
                let _ = fragments.send(text).await;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SpeechTransport for GeminiClient {
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig::speech(TTS_VOICE)),
            safety_settings: Vec::new(),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.tts_model, self.api_key
        );

        debug!(
            "Speech request to model '{}' ({} chars)",
            self.tts_model,
            text.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(SpeechError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Transport(format!("failed to parse speech response: {}", e)))?;

        // A safety-filtered or otherwise empty response is NoAudioData, not a
        // transport error: the caller falls back to local synthesis.
        let payload = parsed
            .first_part()
            .and_then(|part| part.inline_data)
            .map(|inline| inline.data)
            .ok_or(SpeechError::NoAudioData)?;

        general_purpose::STANDARD.decode(payload).map_err(|e| {
            SpeechError::Audio(AudioError::MalformedPayload(format!(
                "invalid base64 audio payload: {}",
                e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_camel_case() {
        let turns = vec![Turn {
            role: Role::Assistant,
            text: "ሰላም".to_string(),
        }];
        let request = GeminiClient::build_chat_request("prompt", &turns, "Hello");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["contents"][0]["role"], "model");
        assert_eq!(value["contents"][1]["role"], "user");
        assert_eq!(value["contents"][1]["parts"][0]["text"], "Hello");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "prompt");
        assert_eq!(value["generationConfig"]["temperature"], 0.5);
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(value["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_speech_config_serializes_voice() {
        let config = GenerationConfig::speech("Kore");
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["responseModalities"][0], "AUDIO");
        assert_eq!(
            value["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_parse_sse_line_extracts_text() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Se"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("Se".to_string()));
    }

    #[test]
    fn test_parse_sse_line_ignores_non_data_lines() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keepalive").unwrap(), None);
    }

    #[test]
    fn test_parse_sse_line_skips_garbage() {
        assert_eq!(parse_sse_line("data: {not json").unwrap(), None);
    }

    #[test]
    fn test_parse_sse_line_surfaces_block_reason() {
        let line = r#"data: {"promptFeedback":{"blockReason":"SAFETY"}}"#;
        match parse_sse_line(line) {
            Err(StreamError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked error, got {:?}", other),
        }
    }
}
