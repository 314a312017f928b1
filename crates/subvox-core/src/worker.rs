//! The per-session producer: audio frames in, published subtitle records out.
//!
//! One worker task per session. Frames are fed to the recognizer, committed
//! words to the accumulator, and every closed segment runs the sequential
//! translate -> synthesize -> publish step. Adapter failures never kill the
//! loop: translation falls back to the failure marker, synthesis failures
//! drop the one segment. The stop flag is only observed between frames, so
//! buffered words always reach a subtitle decision before the sentinel goes
//! out.

use crate::config::PipelineConfig;
use crate::media::AudioSource;
use crate::recognizer::RecognizerBackend;
use crate::segment::{Segment, SegmentAccumulator, SegmenterConfig};
use crate::session::{Session, SubtitleRecord};
use crate::synthesis::SynthesisBackend;
use crate::translate::TranslationBackend;
use std::sync::Arc;
use tracing::{info, warn};

/// Run one session's pipeline to completion. Always finishes the session
/// (sentinel + completion flag), whatever the adapters do.
pub async fn run_session(
    session: Arc<Session>,
    mut source: Box<dyn AudioSource>,
    mut recognizer: Box<dyn RecognizerBackend>,
    translator: Arc<dyn TranslationBackend>,
    synthesizer: Arc<dyn SynthesisBackend>,
    config: Arc<PipelineConfig>,
) {
    let mut accumulator = SegmentAccumulator::new(SegmenterConfig {
        max_words: config.segment_max_words,
        max_duration_secs: config.segment_max_seconds,
    });
    let mut published: u64 = 0;
    info!("Session {}: pipeline started", session.id);

    loop {
        if !session.is_active() {
            info!("Session {}: stop requested, draining", session.id);
            break;
        }
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Session {}: audio source error: {}", session.id, e);
                break;
            }
        };
        let words = match recognizer.accept_frame(&frame) {
            Ok(words) => words,
            Err(e) => {
                warn!("Session {}: recognizer error: {}", session.id, e);
                break;
            }
        };
        for token in words {
            if let Some(segment) = accumulator.accept(token) {
                if publish_segment(&session, segment, &*translator, &*synthesizer, &config, published)
                    .await
                {
                    published += 1;
                }
            }
        }
    }

    // End-of-stream: fold whatever the recognizer still holds, then flush the
    // remainder below either threshold.
    match recognizer.final_flush() {
        Ok(words) => {
            for token in words {
                if let Some(segment) = accumulator.accept(token) {
                    if publish_segment(&session, segment, &*translator, &*synthesizer, &config, published)
                        .await
                    {
                        published += 1;
                    }
                }
            }
        }
        Err(e) => warn!("Session {}: recognizer final flush error: {}", session.id, e),
    }
    if let Some(segment) = accumulator.flush() {
        if publish_segment(&session, segment, &*translator, &*synthesizer, &config, published).await {
            published += 1;
        }
    }

    session.finish();
    info!("Session {}: pipeline complete, {} subtitle(s)", session.id, published);
}

/// Translate, synthesize, and publish one closed segment. Returns whether a
/// record was published (and its index consumed). The candidate index is
/// `published + 1`, so delivered indices stay gapless across synthesis
/// failures.
async fn publish_segment(
    session: &Session,
    segment: Segment,
    translator: &dyn TranslationBackend,
    synthesizer: &dyn SynthesisBackend,
    config: &PipelineConfig,
    published: u64,
) -> bool {
    let translation = translator
        .translate(&segment.text, &config.source_lang, &config.target_lang)
        .await;

    let index = published + 1;
    let clip_name = format!("{index}.mp3");
    let clip_path = config
        .media_dir
        .join(session.id.to_string())
        .join(&clip_name);
    if !synthesizer
        .synthesize(&translation.text, &config.tts_voice, &clip_path)
        .await
    {
        warn!(
            "Session {}: synthesis failed, dropping segment {:.2}s-{:.2}s",
            session.id, segment.start, segment.end
        );
        return false;
    }

    let record = SubtitleRecord {
        index,
        start: segment.start,
        end: segment.end,
        text: translation.text,
        translated: translation.ok,
        audio_ref: format!("/media/{}/{}", session.id, clip_name),
    };
    if let Err(e) = session.publish(record).await {
        warn!("Session {}: queue closed: {}", session.id, e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VecFrameSource;
    use crate::recognizer::ScriptedRecognizer;
    use crate::session::{QueueItem, SessionRegistry};
    use crate::segment::WordToken;
    use crate::synthesis::SilentSynthesizer;
    use crate::translate::{EchoTranslator, Translation, TRANSLATION_FAILED};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingTranslator;

    #[async_trait]
    impl TranslationBackend for FailingTranslator {
        async fn translate(&self, _text: &str, _from: &str, _to: &str) -> Translation {
            Translation::failed()
        }
    }

    fn test_config(media_dir: &std::path::Path) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            media_dir: media_dir.to_path_buf(),
            ..PipelineConfig::default()
        })
    }

    fn five_words() -> Vec<WordToken> {
        vec![
            WordToken::new("hi", 0.0, 0.2),
            WordToken::new("there", 0.2, 0.5),
            WordToken::new("my", 0.5, 0.7),
            WordToken::new("good", 0.7, 0.9),
            WordToken::new("friend", 0.9, 1.2),
        ]
    }

    async fn drain(session: &Session) -> (Vec<SubtitleRecord>, usize) {
        let mut records = Vec::new();
        let mut sentinels = 0;
        loop {
            match session.recv_timeout(Duration::from_millis(100)).await {
                Some(QueueItem::Subtitle(r)) => records.push(r),
                Some(QueueItem::Complete) => {
                    sentinels += 1;
                    break;
                }
                None => break,
            }
        }
        (records, sentinels)
    }

    #[tokio::test]
    async fn full_run_publishes_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();

        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::silence(1, 4)),
            Box::new(ScriptedRecognizer::new(vec![five_words()], vec![])),
            Arc::new(EchoTranslator),
            Arc::new(SilentSynthesizer::new()),
            test_config(dir.path()),
        )
        .await;

        let (records, sentinels) = drain(&session).await;
        assert_eq!(sentinels, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].text, "hi there my good friend");
        assert_eq!(records[0].start, 0.0);
        assert_eq!(records[0].end, 1.2);
        assert!(records[0].translated);
        assert!(session.is_complete());

        // The synthesized clip exists where audio_ref points.
        let clip = dir.path().join(session.id.to_string()).join("1.mp3");
        assert!(clip.is_file());
        assert!(records[0].audio_ref.ends_with("/1.mp3"));
    }

    #[tokio::test]
    async fn sub_threshold_tail_is_flushed_at_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();

        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::silence(1, 4)),
            Box::new(ScriptedRecognizer::new(
                vec![],
                vec![WordToken::new("hello", 0.0, 0.4)],
            )),
            Arc::new(EchoTranslator),
            Arc::new(SilentSynthesizer::new()),
            test_config(dir.path()),
        )
        .await;

        let (records, sentinels) = drain(&session).await;
        assert_eq!(sentinels, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[0].end, 0.4);
    }

    #[tokio::test]
    async fn synthesis_failure_drops_record_and_reuses_index() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();

        // Two closable segments; synthesis fails for the first call.
        let second: Vec<WordToken> = (0..5)
            .map(|i| WordToken::new(format!("w{i}"), 2.0 + i as f64 * 0.1, 2.1 + i as f64 * 0.1))
            .collect();
        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::silence(2, 4)),
            Box::new(ScriptedRecognizer::new(vec![five_words(), second], vec![])),
            Arc::new(EchoTranslator),
            Arc::new(SilentSynthesizer::failing_on(vec![1])),
            test_config(dir.path()),
        )
        .await;

        let (records, sentinels) = drain(&session).await;
        assert_eq!(sentinels, 1);
        assert_eq!(records.len(), 1);
        // The surviving segment gets index 1, not its ordinal 2.
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].text, "w0 w1 w2 w3 w4");
    }

    #[tokio::test]
    async fn translation_failure_still_delivers_marked_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();

        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::silence(1, 4)),
            Box::new(ScriptedRecognizer::new(vec![five_words()], vec![])),
            Arc::new(FailingTranslator),
            Arc::new(SilentSynthesizer::new()),
            test_config(dir.path()),
        )
        .await;

        let (records, _) = drain(&session).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, TRANSLATION_FAILED);
        assert!(!records[0].translated);
    }

    #[tokio::test]
    async fn stop_signal_still_drains_recognizer_tail() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();
        session.stop();

        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::silence(100, 4)),
            Box::new(ScriptedRecognizer::new(
                vec![],
                vec![WordToken::new("tail", 0.0, 0.3)],
            )),
            Arc::new(EchoTranslator),
            Arc::new(SilentSynthesizer::new()),
            test_config(dir.path()),
        )
        .await;

        let (records, sentinels) = drain(&session).await;
        assert_eq!(sentinels, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "tail");
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn empty_stream_completes_with_zero_records() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = registry.create();

        run_session(
            Arc::clone(&session),
            Box::new(VecFrameSource::new(vec![])),
            Box::new(ScriptedRecognizer::empty()),
            Arc::new(EchoTranslator),
            Arc::new(SilentSynthesizer::new()),
            test_config(dir.path()),
        )
        .await;

        let (records, sentinels) = drain(&session).await;
        assert!(records.is_empty());
        assert_eq!(sentinels, 1);
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn concurrent_sessions_keep_independent_indices() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let config = test_config(dir.path());

        let mut handles = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let session = registry.create();
            ids.push(session.id);
            let cfg = Arc::clone(&config);
            handles.push(tokio::spawn(run_session(
                session,
                Box::new(VecFrameSource::silence(1, 4)),
                Box::new(ScriptedRecognizer::new(vec![five_words()], vec![])),
                Arc::new(EchoTranslator),
                Arc::new(SilentSynthesizer::new()),
                cfg,
            )));
        }
        for h in handles {
            h.await.unwrap();
        }

        for id in ids {
            let session = registry.get(&id).unwrap();
            let (records, sentinels) = drain(&session).await;
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].index, 1);
            assert_eq!(sentinels, 1);
            assert!(records[0].audio_ref.contains(&id.to_string()));
        }
    }
}
