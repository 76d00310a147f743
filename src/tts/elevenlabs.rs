//! ElevenLabs implementation of [`SpeechSynthesizer`].
//!
//! `POST {base_url}/v1/text-to-speech/{voice_id}` with the `xi-api-key`
//! header; the response body is the encoded audio named by `Accept`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{TtsConfig, VoiceSettings};
use crate::tts::{AudioClip, SpeechSynthesizer, TtsError};

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// `{"detail": "..."}` or `{"detail": {"status": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

fn error_detail(raw: &str) -> String {
    match serde_json::from_str::<ErrorBody>(raw) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| detail.to_string()),
        Err(_) => raw.trim().to_string(),
    }
}

pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    config: TtsConfig,
}

impl ElevenLabsSynthesizer {
    pub fn from_config(config: &TtsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                TtsError::NotConfigured("ElevenLabs API key is not set (ELEVENLABS_API_KEY)".into())
            })?;

        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: &self.config.voice,
        };

        log::debug!("tts: synthesizing {} chars", text.len());

        let response = self
            .client
            .post(self.url())
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, &self.config.accept)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let detail = error_detail(&raw);
            log::warn!("tts: ElevenLabs returned {status}: {detail}");
            return Err(TtsError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.accept.clone());

        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(TtsError::EmptyAudio);
        }

        log::debug!("tts: received {} bytes ({content_type})", data.len());
        Ok(AudioClip::new(data, content_type))
    }
}
