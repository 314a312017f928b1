//! Stream handlers: session start, live SSE delivery, status, stop, and
//! remote fetch.
//!
//! The gateway only wires HTTP to the core: uploads land on disk, ffmpeg
//! extracts the PCM track, a worker task is spawned, and from then on this
//! module just reads session state. Input and resource errors surface as
//! structured JSON before any worker starts.

use crate::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use subvox_core::{
    create_recognizer, extract_audio, fetch_remote, run_session, subtitle_events, DeliveryConfig,
    DeliveryEvent, PipelineError, SessionId, WavFrameSource,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Structured JSON error: `{"error": ...}` with a matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Media(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("unknown session: {raw}")))
}

/// POST /api/v1/streams — accept a media upload, extract its audio, start a
/// session worker, and return the session id plus playback references.
pub async fn create_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut video: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed upload: {e}")))?
    {
        if field.name() == Some("video") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("upload read failed: {e}")))?;
            video = Some(bytes.to_vec());
            break;
        }
    }
    let Some(video) = video else {
        return Err(ApiError::bad_request("no `video` part in upload"));
    };

    // Stage the upload and extract audio before the session exists, so a
    // broken file never leaves a dead registry entry behind.
    let staging = state
        .config
        .media_dir
        .join(format!("upload-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(PipelineError::from)?;
    let video_path = staging.join("source.mp4");
    tokio::fs::write(&video_path, &video)
        .await
        .map_err(PipelineError::from)?;
    let wav_path = staging.join("source.wav");
    extract_audio(&video_path, &wav_path).await?;

    let session = state.registry.create();
    let session_dir = state.config.media_dir.join(session.id.to_string());
    if let Err(e) = tokio::fs::rename(&staging, &session_dir).await {
        session.finish();
        return Err(PipelineError::from(e).into());
    }

    // Failures past this point finish the session so the registry never
    // holds an entry whose stream cannot terminate.
    let source = match WavFrameSource::open(&session_dir.join("source.wav"), state.config.frame_samples)
    {
        Ok(source) => source,
        Err(e) => {
            session.finish();
            return Err(e.into());
        }
    };
    let recognizer = match create_recognizer(&state.config) {
        Ok(recognizer) => recognizer,
        Err(e) => {
            session.finish();
            return Err(e.into());
        }
    };
    tokio::spawn(run_session(
        Arc::clone(&session),
        Box::new(source),
        recognizer,
        Arc::clone(&state.translator),
        Arc::clone(&state.synthesizer),
        Arc::clone(&state.config),
    ));
    info!("Session {}: worker spawned ({} byte upload)", session.id, video.len());

    let body = json!({
        "session_id": session.id,
        "media_url": format!("/media/{}/source.mp4", session.id),
        "audio_url": format!("/media/{}/source.wav", session.id),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// GET /api/v1/streams/:id/live — SSE stream of subtitle events terminated by
/// `{"complete": true}`.
pub async fn live_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state.registry.get(&id)?;
    let config = DeliveryConfig::from_pipeline(&state.config);

    let stream = subtitle_events(session, config).map(|event| {
        let payload = match event {
            DeliveryEvent::Subtitle(record) => json!({
                "index": record.index,
                "start": record.start,
                "end": record.end,
                "text": record.text,
                "translated": record.translated,
                "audio_url": record.audio_ref,
            }),
            DeliveryEvent::Complete => json!({ "complete": true }),
        };
        Ok(Event::default()
            .json_data(&payload)
            .unwrap_or_else(|_| Event::default().data("{}")))
    });
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// GET /api/v1/streams/:id — the poll-style status query: everything
/// published so far plus the completion flag. Never blocks.
pub async fn stream_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state.registry.get(&id)?;
    let (subtitles, processing_complete) = session.snapshot().await;
    Ok(Json(json!({
        "session_id": session.id,
        "subtitles": subtitles,
        "processing_complete": processing_complete,
    })))
}

/// POST /api/v1/streams/:id/stop — ask the worker to wind down. It still
/// flushes buffered words before completing.
pub async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state.registry.get(&id)?;
    session.stop();
    info!("Session {}: stop requested", session.id);
    Ok(Json(json!({
        "session_id": session.id,
        "stopping": true,
        "processing_complete": session.is_complete(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

/// POST /api/v1/fetch — download a remote video into the media dir so the
/// client can turn around and upload-by-reference.
pub async fn fetch_media(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.url.trim().is_empty() {
        return Err(ApiError::bad_request("empty url"));
    }
    let downloads = state.config.media_dir.join("downloads");
    let stem = Uuid::new_v4().to_string();
    let fetched = fetch_remote(req.url.trim(), &downloads, &stem)
        .await
        .map_err(|e| {
            warn!("Remote fetch failed: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(json!({
        "media_url": format!("/media/downloads/{stem}.mp4"),
        "title": fetched.title,
    })))
}
