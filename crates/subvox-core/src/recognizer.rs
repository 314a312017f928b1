//! **Speech recognition boundary** — fixed-size PCM frames in, timestamped
//! word tokens out.
//!
//! The pipeline never looks inside the recognizer: it feeds frames and gets
//! back whatever words the engine has committed since the last call, plus a
//! final flush at end-of-stream. Implement `RecognizerBackend` for local Vosk
//! (feature `vosk`) or wire a scripted backend for tests and dry runs.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::segment::WordToken;
use std::collections::VecDeque;
use tracing::warn;

/// Streaming recognizer: PCM frames (16 kHz mono s16le) in, committed word
/// tokens out. An empty vec means nothing was committed for this frame.
pub trait RecognizerBackend: Send {
    /// Feed one frame. Returns word tokens finalized by this frame, if any.
    fn accept_frame(&mut self, frame: &[i16]) -> PipelineResult<Vec<WordToken>>;

    /// Drain whatever the engine still holds at end-of-stream.
    fn final_flush(&mut self) -> PipelineResult<Vec<WordToken>>;
}

/// Deterministic recognizer driven by a prepared script of per-frame token
/// batches. Used by tests, and as the fallback backend when no model is
/// configured so the rest of the pipeline can be exercised end to end.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    frames: VecDeque<Vec<WordToken>>,
    tail: Vec<WordToken>,
}

impl ScriptedRecognizer {
    /// Recognizer that commits nothing. Every frame yields an empty batch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `frames[i]` is returned for the i-th `accept_frame` call; `tail` is
    /// returned by `final_flush`.
    pub fn new(frames: Vec<Vec<WordToken>>, tail: Vec<WordToken>) -> Self {
        Self {
            frames: frames.into(),
            tail,
        }
    }
}

impl RecognizerBackend for ScriptedRecognizer {
    fn accept_frame(&mut self, _frame: &[i16]) -> PipelineResult<Vec<WordToken>> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }

    fn final_flush(&mut self) -> PipelineResult<Vec<WordToken>> {
        Ok(std::mem::take(&mut self.tail))
    }
}

// -----------------------------------------------------------------------------
// Local Vosk recognizer (optional feature). Requires libvosk; see README.
// -----------------------------------------------------------------------------
#[cfg(feature = "vosk")]
mod vosk_backend {
    use super::*;
    use vosk::{CompleteResult, DecodingState, Model, Recognizer};

    /// Local Vosk recognizer with word-level timestamps enabled.
    /// Download models from https://alphacephei.com/vosk/models
    /// (e.g. vosk-model-small-en-us-0.15).
    pub struct VoskRecognizer {
        recognizer: Recognizer,
    }

    impl VoskRecognizer {
        /// Load the model from `model_path` and build a 16 kHz recognizer.
        pub fn new(model_path: &str, sample_rate: f32) -> PipelineResult<Self> {
            let model = Model::new(model_path).ok_or_else(|| {
                PipelineError::Recognizer(format!("Vosk model load failed: {model_path}"))
            })?;
            let mut recognizer = Recognizer::new(&model, sample_rate).ok_or_else(|| {
                PipelineError::Recognizer("Vosk recognizer init failed".to_string())
            })?;
            recognizer.set_words(true);
            Ok(Self { recognizer })
        }

        fn words_of(result: CompleteResult<'_>) -> Vec<WordToken> {
            match result.single() {
                Some(single) => single
                    .result
                    .iter()
                    .map(|w| WordToken::new(w.word, w.start as f64, w.end as f64))
                    .collect(),
                None => Vec::new(),
            }
        }
    }

    impl RecognizerBackend for VoskRecognizer {
        fn accept_frame(&mut self, frame: &[i16]) -> PipelineResult<Vec<WordToken>> {
            match self.recognizer.accept_waveform(frame) {
                Ok(DecodingState::Finalized) => Ok(Self::words_of(self.recognizer.result())),
                Ok(_) => Ok(Vec::new()),
                Err(e) => Err(PipelineError::Recognizer(e.to_string())),
            }
        }

        fn final_flush(&mut self) -> PipelineResult<Vec<WordToken>> {
            Ok(Self::words_of(self.recognizer.final_result()))
        }
    }
}

#[cfg(feature = "vosk")]
pub use vosk_backend::VoskRecognizer;

/// Create the best available recognizer for this config.
/// Priority: (1) Vosk if `VOSK_MODEL_PATH` is set (requires the `vosk`
/// feature), (2) an inert scripted backend so sessions still run end to end.
pub fn create_recognizer(config: &PipelineConfig) -> PipelineResult<Box<dyn RecognizerBackend>> {
    #[cfg(feature = "vosk")]
    {
        if let Some(ref path) = config.vosk_model_path {
            return Ok(Box::new(vosk_backend::VoskRecognizer::new(path, 16000.0)?));
        }
    }
    #[cfg(not(feature = "vosk"))]
    {
        if config.vosk_model_path.is_some() {
            warn!("VOSK_MODEL_PATH is set but the `vosk` feature is disabled");
        }
    }
    warn!("No recognizer model configured; sessions will produce no words");
    Ok(Box::new(ScriptedRecognizer::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_replays_frames_then_tail() {
        let mut rec = ScriptedRecognizer::new(
            vec![vec![], vec![WordToken::new("hi", 0.0, 0.2)]],
            vec![WordToken::new("bye", 0.5, 0.7)],
        );
        assert!(rec.accept_frame(&[0; 4]).unwrap().is_empty());
        assert_eq!(rec.accept_frame(&[0; 4]).unwrap()[0].word, "hi");
        // Script exhausted: further frames commit nothing.
        assert!(rec.accept_frame(&[0; 4]).unwrap().is_empty());
        assert_eq!(rec.final_flush().unwrap()[0].word, "bye");
        assert!(rec.final_flush().unwrap().is_empty());
    }

    #[test]
    fn empty_recognizer_commits_nothing() {
        let mut rec = ScriptedRecognizer::empty();
        assert!(rec.accept_frame(&[1, 2, 3]).unwrap().is_empty());
        assert!(rec.final_flush().unwrap().is_empty());
    }
}
