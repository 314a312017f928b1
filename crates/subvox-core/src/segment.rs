//! Online segmentation of recognized words into subtitle-sized spans.
//!
//! Words arrive one at a time with their recognizer timestamps. The
//! accumulator buffers them and closes a segment when either flush policy
//! fires: enough words for a readable subtitle line, or enough elapsed time
//! that the viewer should not keep waiting. Both thresholds are configuration,
//! not constants — readability vs. latency is a tuning decision.

use serde::{Deserialize, Serialize};

/// One finalized word from the recognizer, with timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub word: String,
    /// Start offset in the source audio, seconds.
    pub start: f64,
    /// End offset in the source audio, seconds.
    pub end: f64,
}

impl WordToken {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// A contiguous span of words ready for translation and synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Space-joined words of the span.
    pub text: String,
    /// Start of the first word folded in, seconds.
    pub start: f64,
    /// End of the most recent word folded in, seconds.
    pub end: f64,
}

impl Segment {
    /// Span duration in seconds. Always >= 0 for accumulator output.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Flush policy for the accumulator.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Close once the buffer holds this many words (default 5).
    pub max_words: usize,
    /// Close once the buffered span covers this many seconds (default 3.0).
    pub max_duration_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_words: 5,
            max_duration_secs: 3.0,
        }
    }
}

/// Buffers word tokens for one recognizer stream and emits closed segments.
///
/// `accept` folds a token in and returns a segment when a flush policy fires;
/// `flush` emits whatever remains at end-of-stream. The buffer never emits an
/// empty segment.
#[derive(Debug)]
pub struct SegmentAccumulator {
    config: SegmenterConfig,
    words: Vec<String>,
    start: Option<f64>,
    end: f64,
}

impl SegmentAccumulator {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            words: Vec::new(),
            start: None,
            end: 0.0,
        }
    }

    /// Number of words currently buffered.
    pub fn buffered(&self) -> usize {
        self.words.len()
    }

    /// Fold one word token in. Returns a closed segment when the word-count
    /// or duration threshold is reached (word count checked first).
    pub fn accept(&mut self, token: WordToken) -> Option<Segment> {
        let word = token.word.trim();
        if word.is_empty() {
            return None;
        }
        if self.start.is_none() {
            self.start = Some(token.start);
        }
        self.end = token.end;
        self.words.push(word.to_string());

        let duration = self.end - self.start.unwrap_or(self.end);
        if self.words.len() >= self.config.max_words || duration >= self.config.max_duration_secs {
            self.take_segment()
        } else {
            None
        }
    }

    /// Emit the remaining buffer at end-of-stream, threshold or not.
    /// Returns `None` when nothing is buffered. Call exactly once.
    pub fn flush(&mut self) -> Option<Segment> {
        self.take_segment()
    }

    fn take_segment(&mut self) -> Option<Segment> {
        let start = self.start.take()?;
        if self.words.is_empty() {
            return None;
        }
        let segment = Segment {
            text: self.words.join(" "),
            start,
            end: self.end,
        };
        self.words.clear();
        Some(segment)
    }
}
