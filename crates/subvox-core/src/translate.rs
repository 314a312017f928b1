//! **Translation boundary** — segment text in, target-language text out.
//!
//! Backends never fail the pipeline: any transport or parse problem is
//! absorbed, logged, and surfaced as a [`Translation`] carrying the documented
//! failure marker with `ok: false`. The caller decides how to present
//! failures; it never has to handle an `Err`.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Substituted for the translated text when every engine fails.
pub const TRANSLATION_FAILED: &str = "[translation failed]";

/// Outcome of one translation call. `ok: false` means `text` is the failure
/// marker, not a real translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    pub ok: bool,
}

impl Translation {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            text: TRANSLATION_FAILED.to_string(),
            ok: false,
        }
    }
}

/// Backend that translates one text span. Must not error; absorb failures
/// and return [`Translation::failed`].
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Translation;
}

/// Pass-through backend for tests and unconfigured deployments.
#[derive(Debug, Default)]
pub struct EchoTranslator;

#[async_trait]
impl TranslationBackend for EchoTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, _target_lang: &str) -> Translation {
        Translation::success(text)
    }
}

/// Azure Cognitive Translator v3.
#[derive(Debug, Clone)]
pub struct AzureTranslator {
    /// Base endpoint without trailing slash.
    pub endpoint: String,
    pub key: String,
    pub region: String,
    client: reqwest::Client,
}

impl AzureTranslator {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        region: impl Into<String>,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            key: key.into(),
            region: region.into(),
            client,
        })
    }

    async fn call(&self, text: &str, from: &str, to: &str) -> Option<String> {
        let url = format!("{}/translate", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!([{ "Text": text }]);
        let res = self
            .client
            .post(&url)
            .query(&[("api-version", "3.0"), ("from", from), ("to", to)])
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Ocp-Apim-Subscription-Region", &self.region)
            .json(&body)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let json: serde_json::Value = res.json().await.ok()?;
        json.get(0)?
            .get("translations")?
            .get(0)?
            .get("text")?
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl TranslationBackend for AzureTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Translation {
        if text.trim().is_empty() {
            return Translation::success("");
        }
        match self.call(text, source_lang, target_lang).await {
            Some(translated) => Translation::success(translated),
            None => {
                warn!("Azure translation failed for {} chars", text.len());
                Translation::failed()
            }
        }
    }
}

/// Generic JSON translation endpoint: `POST {"text": ...}` -> `{"predicted": ...}`.
/// Fits self-hosted model servers that expose a single-route API.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    pub url: String,
    client: reqwest::Client,
}

impl HttpTranslator {
    pub fn new(url: impl Into<String>) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn call(&self, text: &str) -> Option<String> {
        let res = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let json: serde_json::Value = res.json().await.ok()?;
        json.get("predicted")?.as_str().map(str::to_string)
    }
}

#[async_trait]
impl TranslationBackend for HttpTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, _target_lang: &str) -> Translation {
        if text.trim().is_empty() {
            return Translation::success("");
        }
        match self.call(text).await {
            Some(translated) => Translation::success(translated),
            None => {
                warn!("Translation endpoint {} failed", self.url);
                Translation::failed()
            }
        }
    }
}

/// Pick a translation engine from config.
/// Priority: Azure if keyed, then the generic endpoint, then echo.
pub fn create_translator(config: &PipelineConfig) -> PipelineResult<Box<dyn TranslationBackend>> {
    if let (Some(key), Some(region)) = (
        config.azure_translator_key.as_ref(),
        config.azure_translator_region.as_ref(),
    ) {
        return Ok(Box::new(AzureTranslator::new(
            config.azure_translator_endpoint.clone(),
            key.clone(),
            region.clone(),
        )?));
    }
    if let Some(ref url) = config.translate_url {
        return Ok(Box::new(HttpTranslator::new(url.clone())?));
    }
    warn!("No translation engine configured; subtitles will pass through untranslated");
    Ok(Box::new(EchoTranslator))
}
