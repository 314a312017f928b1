//! **Speech synthesis boundary** — translated text in, audio file out.
//!
//! `synthesize` returns a plain bool: `true` guarantees a readable audio file
//! at the requested path, `false` means the segment gets no audio. Backends
//! absorb every failure; the pipeline worker only branches on the bool.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Backend that renders text to an audio file. Must not error; return `false`
/// on any failure.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Render `text` in `voice` to `out_path`. On `true` the file exists and
    /// is readable.
    async fn synthesize(&self, text: &str, voice: &str, out_path: &Path) -> bool;
}

/// OpenAI-compatible speech API (`POST {base}/audio/speech`), response bytes
/// written to the target path.
#[derive(Debug, Clone)]
pub struct SpeechApi {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    client: reqwest::Client,
}

impl SpeechApi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    async fn render(&self, text: &str, voice: &str) -> Option<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        res.bytes().await.ok().map(|b| b.to_vec())
    }
}

#[async_trait]
impl SynthesisBackend for SpeechApi {
    async fn synthesize(&self, text: &str, voice: &str, out_path: &Path) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(audio) = self.render(text, voice).await else {
            warn!("Speech synthesis failed for {} chars", text.len());
            return false;
        };
        if audio.is_empty() {
            warn!("Speech synthesis returned an empty body");
            return false;
        }
        if let Some(parent) = out_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Cannot create audio directory {}: {}", parent.display(), e);
                return false;
            }
        }
        match tokio::fs::write(out_path, &audio).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot write synthesized audio {}: {}", out_path.display(), e);
                false
            }
        }
    }
}

/// Test/dry-run backend: writes a stub file and succeeds, unless told to fail.
#[derive(Debug, Default)]
pub struct SilentSynthesizer {
    /// 1-based segment ordinals this backend refuses to synthesize.
    fail_on: Vec<u64>,
    calls: std::sync::atomic::AtomicU64,
}

impl SilentSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th synthesize call (1-based) for each n in `ordinals`.
    pub fn failing_on(ordinals: Vec<u64>) -> Self {
        Self {
            fail_on: ordinals,
            calls: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl SynthesisBackend for SilentSynthesizer {
    async fn synthesize(&self, _text: &str, _voice: &str, out_path: &Path) -> bool {
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if self.fail_on.contains(&call) {
            return false;
        }
        if let Some(parent) = out_path.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                return false;
            }
        }
        tokio::fs::write(out_path, b"silence").await.is_ok()
    }
}

/// Pick a synthesis backend from config: the speech API when keyed, otherwise
/// a silent stub so unconfigured deployments still deliver subtitles.
pub fn create_synthesizer(config: &PipelineConfig) -> PipelineResult<Box<dyn SynthesisBackend>> {
    if let Some(ref key) = config.tts_api_key {
        return Ok(Box::new(SpeechApi::new(
            config.tts_api_url.clone(),
            key.clone(),
            config.tts_model.clone(),
        )?));
    }
    warn!("No TTS_API_KEY; synthesized audio will be silent stubs");
    Ok(Box::new(SilentSynthesizer::new()))
}
