//! # subvox-core — streaming subtitle translation pipeline
//!
//! Turns a continuous stream of decoded audio into a bounded sequence of
//! timed, translated, synthesized subtitle units, delivered live while the
//! source is still being processed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       Pipeline Worker (per session)            │
//! │  ┌───────────┐  ┌────────────┐  ┌─────────────┐  ┌──────────┐ │
//! │  │ PCM Frames│→ │ Recognizer │→ │  Segment    │→ │Translate │ │
//! │  │  (wav)    │  │  (vosk)    │  │ Accumulator │  │ + Synth  │ │
//! │  └───────────┘  └────────────┘  └─────────────┘  └────┬─────┘ │
//! │                                                       ↓       │
//! │                                              ┌────────────┐   │
//! │                                              │Session Queue│──┼─→ Delivery
//! │                                              └────────────┘   │   Stream
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker owns one session's mutation rights; delivery and status
//! queries only read. The queue is the only synchronization hand-off, and
//! it carries a single completion sentinel after the last record.

pub mod config;
pub mod delivery;
pub mod error;
pub mod media;
pub mod recognizer;
pub mod segment;
pub mod session;
pub mod synthesis;
pub mod translate;
pub mod worker;

pub use config::PipelineConfig;
pub use delivery::{subtitle_events, DeliveryConfig, DeliveryEvent};
pub use error::{PipelineError, PipelineResult};
pub use media::{extract_audio, fetch_remote, AudioSource, FetchedMedia, VecFrameSource, WavFrameSource};
pub use recognizer::{create_recognizer, RecognizerBackend, ScriptedRecognizer};
#[cfg(feature = "vosk")]
pub use recognizer::VoskRecognizer;
pub use segment::{Segment, SegmentAccumulator, SegmenterConfig, WordToken};
pub use session::{QueueItem, Session, SessionId, SessionRegistry, SubtitleRecord};
pub use synthesis::{create_synthesizer, SilentSynthesizer, SpeechApi, SynthesisBackend};
pub use translate::{
    create_translator, AzureTranslator, EchoTranslator, HttpTranslator, Translation,
    TranslationBackend, TRANSLATION_FAILED,
};
pub use worker::run_session;
