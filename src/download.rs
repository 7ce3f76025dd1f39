// ABOUTME: Download endpoint handlers: validate the url parameter, pick a format,
// ABOUTME: and stream the media bytes back, raw for MP4 or through ffmpeg for MP3

use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::transcode;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn handle_ytmp4(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let Some(url) = non_empty_url(&params) else {
        return missing_url_response();
    };
    match process_video(&state, url).await {
        Ok(response) => response,
        Err(e) => {
            error!("Video download failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn handle_ytmp3(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let Some(url) = non_empty_url(&params) else {
        return missing_url_response();
    };
    match process_audio(&state, url).await {
        Ok(response) => response,
        Err(e) => {
            error!("Audio download failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn non_empty_url(params: &DownloadParams) -> Option<&str> {
    params.url.as_deref().filter(|url| !url.is_empty())
}

fn missing_url_response() -> Response {
    (StatusCode::BAD_REQUEST, "Missing 'url' parameter").into_response()
}

async fn process_video(state: &AppState, url: &str) -> Result<Response> {
    let video = state
        .youtube
        .resolve(url)
        .await
        .map_err(|e| anyhow!("Failed to get video info: {}", e))?;

    let format = video
        .first_format_with_audio()
        .ok_or_else(|| anyhow!("No video+audio format available"))?;

    info!("Serving video {} ({}) as mp4", video.id, video.title);

    let stream = state
        .youtube
        .open_stream(format)
        .await
        .map_err(|e| anyhow!("Failed to get video stream: {}", e))?;

    // Headers are already sent once the body starts; a mid-copy failure can
    // only be logged and shows up as a truncated download.
    let stream = stream.inspect_err(|e| error!("Failed to send video: {}", e));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&video.title, "mp4"),
        )
        .body(Body::from_stream(stream))?;
    Ok(response)
}

async fn process_audio(state: &AppState, url: &str) -> Result<Response> {
    let video = state
        .youtube
        .resolve(url)
        .await
        .map_err(|e| anyhow!("Failed to get video info: {}", e))?;

    let format = video
        .first_audio_format()
        .ok_or_else(|| anyhow!("No audio format available"))?;

    info!("Serving audio of {} ({}) as mp3", video.id, video.title);

    let stream = state
        .youtube
        .open_stream(format)
        .await
        .map_err(|e| anyhow!("Failed to get audio stream: {}", e))?;

    let body = transcode::mp3_stream(stream)
        .map_err(|e| anyhow!("Failed to convert audio to mp3: {}", e))?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&video.title, "mp3"),
        )
        .body(body)?;
    Ok(response)
}

/// Replace path separators so the title is safe as a download filename.
/// Every other character passes through unchanged.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            _ => c,
        })
        .collect()
}

fn attachment_disposition(title: &str, extension: &str) -> String {
    format!(
        "attachment; filename=\"{}.{}\"",
        sanitize_filename(title),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube::YoutubeClient;
    use crate::Config;
    use axum::body::to_bytes;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            youtube: YoutubeClient::new().unwrap(),
            config: Config {
                port: 8080,
                fetch_api_url: None,
            },
        })
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_filename("My Song"), "My Song");
        // Only path separators are replaced; other characters pass through.
        assert_eq!(sanitize_filename("a:b*c?d"), "a:b*c?d");
        assert_eq!(sanitize_filename(""), "");
    }

    #[test]
    fn test_sanitize_filename_idempotent() {
        for title in ["a/b\\c", "plain", "x//y", "\\\\server\\share"] {
            let once = sanitize_filename(title);
            assert_eq!(sanitize_filename(&once), once);
        }
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("My Song", "mp4"),
            "attachment; filename=\"My Song.mp4\""
        );
        assert_eq!(
            attachment_disposition("a/b", "mp3"),
            "attachment; filename=\"a-b.mp3\""
        );
    }

    #[tokio::test]
    async fn test_missing_url_returns_bad_request() {
        let state = test_state();

        for params in [
            DownloadParams { url: None },
            DownloadParams {
                url: Some(String::new()),
            },
        ] {
            let response = handle_ytmp4(
                State(state.clone()),
                Query(DownloadParams {
                    url: params.url.clone(),
                }),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"Missing 'url' parameter");

            let response = handle_ytmp3(State(state.clone()), Query(params)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"Missing 'url' parameter");
        }
    }
}
