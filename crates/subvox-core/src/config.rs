//! Pipeline configuration loaded from the environment.
//!
//! Everything tunable lives here: flush thresholds, delivery pacing, adapter
//! endpoints and credentials, the media directory. The struct is assembled
//! once at process start and handed by reference into the components that
//! need it; no component reads ambient env on its own.

use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration loaded from environment.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | SUBVOX_SEGMENT_MAX_WORDS | 5 | Close a segment once it holds this many words. |
/// | SUBVOX_SEGMENT_MAX_SECONDS | 3.0 | Close a segment once it spans this many seconds. |
/// | SUBVOX_FRAME_SAMPLES | 4000 | PCM samples fed to the recognizer per frame. |
/// | SUBVOX_WARMUP_COUNT | 3 | Subtitles buffered before live delivery starts flowing freely. |
/// | SUBVOX_WARMUP_WAIT_SECS | 10 | Overall budget for the warm-up phase. |
/// | SUBVOX_POLL_INTERVAL_MS | 200 | Queue poll tick during warm-up. |
/// | SUBVOX_LIVE_WAIT_SECS | 1 | Per-item queue wait during live delivery. |
/// | SUBVOX_SOURCE_LANG / SUBVOX_TARGET_LANG | en / ta | Translation language pair. |
/// | SUBVOX_MEDIA_DIR | media | Uploads, extracted audio, synthesized clips. |
/// | SUBVOX_SESSION_TTL_SECS | 0 | Evict completed sessions older than this (0 = never). |
/// | AZURE_TRANSLATOR_KEY / _REGION / _ENDPOINT | — | Azure Translator v3 credentials. |
/// | SUBVOX_TRANSLATE_URL | — | Generic JSON translate endpoint (fallback engine). |
/// | TTS_API_URL / TTS_API_KEY / TTS_MODEL | openai / — / tts-1 | Speech synthesis API. |
/// | SUBVOX_TTS_VOICE | alloy | Synthesis voice id. |
/// | VOSK_MODEL_PATH | — | Vosk model directory (feature `vosk`). |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Word-count flush threshold for the segment accumulator.
    pub segment_max_words: usize,
    /// Duration flush threshold for the segment accumulator, in seconds.
    pub segment_max_seconds: f64,
    /// PCM samples per recognizer frame (16 kHz mono s16le).
    pub frame_samples: usize,
    /// Subtitle records accumulated before the delivery stream goes live.
    pub warmup_count: usize,
    /// Overall wait budget for the warm-up phase.
    pub warmup_wait: Duration,
    /// Poll tick used while waiting inside the warm-up budget.
    pub poll_interval: Duration,
    /// Per-item wait in the live delivery phase.
    pub live_wait: Duration,
    /// Source language fed to the translator (recognizer language).
    pub source_lang: String,
    /// Target language for translation and synthesis.
    pub target_lang: String,
    /// Root directory for uploaded media, extracted audio, and synthesized clips.
    pub media_dir: PathBuf,
    /// Completed-session eviction TTL; `None` disables the sweep.
    pub session_ttl: Option<Duration>,
    /// AZURE_TRANSLATOR_KEY: enables the Azure translation engine when set.
    pub azure_translator_key: Option<String>,
    /// AZURE_TRANSLATOR_REGION: required alongside the key.
    pub azure_translator_region: Option<String>,
    /// AZURE_TRANSLATOR_ENDPOINT: override for sovereign clouds.
    pub azure_translator_endpoint: String,
    /// SUBVOX_TRANSLATE_URL: generic `{"text"} -> {"predicted"}` endpoint.
    pub translate_url: Option<String>,
    /// TTS_API_URL: OpenAI-compatible base URL for speech synthesis.
    pub tts_api_url: String,
    /// TTS_API_KEY: bearer key for synthesis; unset disables real synthesis.
    pub tts_api_key: Option<String>,
    /// TTS_MODEL: tts-1 (fast) or tts-1-hd.
    pub tts_model: String,
    /// SUBVOX_TTS_VOICE: alloy, echo, fable, onyx, nova, shimmer, ...
    pub tts_voice: String,
    /// VOSK_MODEL_PATH: model directory for the local recognizer.
    pub vosk_model_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_max_words: 5,
            segment_max_seconds: 3.0,
            frame_samples: 4000,
            warmup_count: 3,
            warmup_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            live_wait: Duration::from_secs(1),
            source_lang: "en".to_string(),
            target_lang: "ta".to_string(),
            media_dir: PathBuf::from("media"),
            session_ttl: None,
            azure_translator_key: None,
            azure_translator_region: None,
            azure_translator_endpoint: "https://api.cognitive.microsofttranslator.com".to_string(),
            translate_url: None,
            tts_api_url: "https://api.openai.com/v1".to_string(),
            tts_api_key: None,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            vosk_model_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load from environment. Unset or invalid => defaults (see struct doc table).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            segment_max_words: env_usize("SUBVOX_SEGMENT_MAX_WORDS", defaults.segment_max_words).max(1),
            segment_max_seconds: env_f64("SUBVOX_SEGMENT_MAX_SECONDS", defaults.segment_max_seconds),
            frame_samples: env_usize("SUBVOX_FRAME_SAMPLES", defaults.frame_samples).max(1),
            warmup_count: env_usize("SUBVOX_WARMUP_COUNT", defaults.warmup_count),
            warmup_wait: Duration::from_secs(env_u64("SUBVOX_WARMUP_WAIT_SECS", 10)),
            poll_interval: Duration::from_millis(env_u64("SUBVOX_POLL_INTERVAL_MS", 200).max(10)),
            live_wait: Duration::from_secs(env_u64("SUBVOX_LIVE_WAIT_SECS", 1).max(1)),
            source_lang: env_string("SUBVOX_SOURCE_LANG", &defaults.source_lang),
            target_lang: env_string("SUBVOX_TARGET_LANG", &defaults.target_lang),
            media_dir: PathBuf::from(env_string("SUBVOX_MEDIA_DIR", "media")),
            session_ttl: match env_u64("SUBVOX_SESSION_TTL_SECS", 0) {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            azure_translator_key: env_opt_string("AZURE_TRANSLATOR_KEY"),
            azure_translator_region: env_opt_string("AZURE_TRANSLATOR_REGION"),
            azure_translator_endpoint: env_string(
                "AZURE_TRANSLATOR_ENDPOINT",
                &defaults.azure_translator_endpoint,
            ),
            translate_url: env_opt_string("SUBVOX_TRANSLATE_URL"),
            tts_api_url: env_string("TTS_API_URL", &defaults.tts_api_url),
            tts_api_key: env_opt_string("TTS_API_KEY"),
            tts_model: env_string("TTS_MODEL", &defaults.tts_model),
            tts_voice: env_string("SUBVOX_TTS_VOICE", &defaults.tts_voice),
            vosk_model_path: env_opt_string("VOSK_MODEL_PATH"),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env_opt_string(name).unwrap_or_else(|| default.to_string())
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}
