//! Media handling around the pipeline: audio extraction, PCM framing, and
//! remote acquisition. All heavy lifting is delegated to external tools
//! (ffmpeg, yt-dlp); this module only drives them and validates their output.

use crate::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Sample rate the recognizer and the extraction step agree on.
pub const SAMPLE_RATE: u32 = 16_000;

/// Extract mono 16 kHz s16le audio from `video` into `wav` via ffmpeg.
/// Surfaces a structured error before any session work starts when the input
/// is missing or ffmpeg fails.
pub async fn extract_audio(video: &Path, wav: &Path) -> PipelineResult<()> {
    if !video.is_file() {
        return Err(PipelineError::Media(format!(
            "media file not found: {}",
            video.display()
        )));
    }
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(wav)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| PipelineError::Media(format!("ffmpeg spawn failed: {e}")))?;
    if !status.success() {
        return Err(PipelineError::Media(format!(
            "ffmpeg exited with {status} for {}",
            video.display()
        )));
    }
    if !wav.is_file() {
        return Err(PipelineError::Media(format!(
            "ffmpeg produced no output at {}",
            wav.display()
        )));
    }
    debug!("Extracted audio: {} -> {}", video.display(), wav.display());
    Ok(())
}

/// A downloaded remote media file.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// Download a remote video (YouTube et al.) into `dir` via yt-dlp.
/// The downloader is an external collaborator; any failure is a structured
/// media error.
pub async fn fetch_remote(url: &str, dir: &Path, file_stem: &str) -> PipelineResult<FetchedMedia> {
    tokio::fs::create_dir_all(dir).await?;
    let out_path = dir.join(format!("{file_stem}.mp4"));
    let output = Command::new("yt-dlp")
        .args(["-f", "mp4", "--no-simulate", "--print", "title", "-o"])
        .arg(&out_path)
        .arg(url)
        .output()
        .await
        .map_err(|e| PipelineError::Media(format!("yt-dlp spawn failed: {e}")))?;
    if !output.status.success() {
        return Err(PipelineError::Media(format!(
            "yt-dlp failed for {url}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    if !out_path.is_file() {
        return Err(PipelineError::Media(format!(
            "yt-dlp reported success but produced no file for {url}"
        )));
    }
    let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!("Fetched remote media \"{}\" -> {}", title, out_path.display());
    Ok(FetchedMedia {
        path: out_path,
        title,
    })
}

/// Fixed-size PCM frame pull, the worker's view of the audio input.
/// `Ok(None)` signals end-of-stream; the final frame may be short.
pub trait AudioSource: Send {
    fn next_frame(&mut self) -> PipelineResult<Option<Vec<i16>>>;
}

/// Frames a 16 kHz mono 16-bit WAV file (the extraction step's output).
/// A spec mismatch is rejected up front rather than silently resampled.
pub struct WavFrameSource {
    samples: hound::WavIntoSamples<std::io::BufReader<std::fs::File>, i16>,
    frame_samples: usize,
}

impl std::fmt::Debug for WavFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavFrameSource")
            .field("frame_samples", &self.frame_samples)
            .finish_non_exhaustive()
    }
}

impl WavFrameSource {
    pub fn open(path: &Path, frame_samples: usize) -> PipelineResult<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 1
            || spec.sample_rate != SAMPLE_RATE
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(PipelineError::Media(format!(
                "expected mono 16-bit {} Hz PCM, got {} ch / {}-bit / {} Hz",
                SAMPLE_RATE, spec.channels, spec.bits_per_sample, spec.sample_rate
            )));
        }
        Ok(Self {
            samples: reader.into_samples::<i16>(),
            frame_samples: frame_samples.max(1),
        })
    }
}

impl AudioSource for WavFrameSource {
    fn next_frame(&mut self) -> PipelineResult<Option<Vec<i16>>> {
        let mut frame = Vec::with_capacity(self.frame_samples);
        for sample in self.samples.by_ref() {
            frame.push(sample?);
            if frame.len() == self.frame_samples {
                break;
            }
        }
        if frame.is_empty() {
            Ok(None)
        } else {
            Ok(Some(frame))
        }
    }
}

/// In-memory source for tests: yields the given frames, then end-of-stream.
pub struct VecFrameSource {
    frames: std::collections::VecDeque<Vec<i16>>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Vec<i16>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// `count` frames of zeroed PCM, enough to drive a scripted recognizer.
    pub fn silence(count: usize, frame_samples: usize) -> Self {
        Self::new(vec![vec![0; frame_samples]; count])
    }
}

impl AudioSource for VecFrameSource {
    fn next_frame(&mut self) -> PipelineResult<Option<Vec<i16>>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn frames_a_valid_wav_with_short_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        write_wav(&path, SAMPLE_RATE, 1, &[7; 10]);

        let mut source = WavFrameSource::open(&path, 4).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().len(), 4);
        assert_eq!(source.next_frame().unwrap().unwrap().len(), 4);
        assert_eq!(source.next_frame().unwrap().unwrap().len(), 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        write_wav(&path, 44_100, 1, &[0; 8]);
        let err = WavFrameSource::open(&path, 4).unwrap_err();
        assert!(matches!(err, PipelineError::Media(_)));
    }

    #[test]
    fn rejects_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        write_wav(&path, SAMPLE_RATE, 2, &[0; 8]);
        assert!(WavFrameSource::open(&path, 4).is_err());
    }

    #[tokio::test]
    async fn extract_audio_rejects_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_audio(&dir.path().join("nope.mp4"), &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Media(_)));
    }

    #[test]
    fn vec_source_drains_then_ends() {
        let mut source = VecFrameSource::silence(2, 3);
        assert_eq!(source.next_frame().unwrap().unwrap(), vec![0, 0, 0]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
