//! Speech API client: text-to-speech and speech-to-text byte shuffling.
//!
//! The speech backend is optional; the gateway answers 500 with a
//! remediation hint when no client is configured.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Default speech API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.fish.audio/v1";

/// One transcription segment with timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

/// Transcription result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

/// Client for the speech API.
pub struct SpeechClient {
    api_key: String,
    voice_model: String,
    base_url: String,
    client: Client,
}

impl SpeechClient {
    pub fn new(api_key: String, voice_model: String) -> Self {
        Self::with_base_url(api_key, voice_model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, voice_model: String, base_url: String) -> Self {
        Self {
            api_key,
            voice_model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Synthesize MP3 audio for `text`.
    pub async fn text_to_speech(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        let body = serde_json::json!({
            "text": text,
            "format": "mp3",
            "voice": self.voice_model,
        });
        let resp = self
            .client
            .post(format!("{}/tts", self.base_url))
            .bearer_auth(&self.api_key)
            .header("model", &self.voice_model)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("speech API returned {status}: {text}");
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Transcribe an uploaded recording. `language` is an optional hint
    /// like "en".
    pub async fn speech_to_text(
        &self,
        audio: Vec<u8>,
        language: Option<&str>,
    ) -> anyhow::Result<Transcript> {
        let part = Part::bytes(audio)
            .file_name("recording.webm")
            .mime_str("audio/webm")?;
        let form = Form::new().part("audio", part);

        let mut req = self
            .client
            .post(format!("{}/asr", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form);
        if let Some(lang) = language {
            req = req.header("language", lang);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("speech API returned {status}: {text}");
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcript_tolerates_sparse_responses() {
        let t: Transcript = serde_json::from_value(json!({ "text": "hello" })).unwrap();
        assert_eq!(t.text, "hello");
        assert!(t.segments.is_empty());

        let t: Transcript = serde_json::from_value(json!({
            "text": "hello there",
            "duration": 1.5,
            "segments": [{ "text": "hello there", "start": 0.0, "end": 1.5 }]
        }))
        .unwrap();
        assert_eq!(t.segments.len(), 1);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = SpeechClient::with_base_url(
            "key".into(),
            "voice".into(),
            "http://localhost:7000/".into(),
        );
        assert_eq!(c.base_url, "http://localhost:7000");
    }
}
