//! HTTP implementation of [`AnnotationBackend`] using [`reqwest`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::api::client::{AnnotationBackend, ApiError, validate_upload_path, video_mime};
use crate::api::types::{
    ExportFormat, ExportPayload, ExportSummary, SaveAnnotationsResponse, StatusResponse,
    UploadResponse, VideoInfo,
};
use crate::timing::FrameIndex;
use crate::wire::{
    self, ActionPayload, AnnotationsPayload, FramePayload, ObjectPayload, ObjectTrackPayload,
    PosePayload, PoseTrackPayload,
};

/// HTTP client for one backend instance.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`) with a
    /// per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn video_url_of(&self, video_id: &str, rest: &str) -> String {
        self.url(&format!("/video/{}{}", video_id, rest))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into an
    /// [`ApiError::Status`] carrying the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AnnotationBackend for HttpBackend {
    async fn upload(&self, path: &Path) -> Result<UploadResponse, ApiError> {
        validate_upload_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        log::info!("Uploading {} ({} bytes)", file_name, bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(video_mime(path))?;
        let form = reqwest::multipart::Form::new().part("video", part);

        let response = self.client.post(self.url("/upload")).multipart(form).send().await?;
        Self::parse_response(response).await
    }

    async fn status(&self, video_id: &str) -> Result<StatusResponse, ApiError> {
        self.get_json(self.video_url_of(video_id, "/status")).await
    }

    async fn info(&self, video_id: &str) -> Result<VideoInfo, ApiError> {
        self.get_json(self.video_url_of(video_id, "/info")).await
    }

    async fn get_pose(&self, video_id: &str) -> Result<PoseTrackPayload, ApiError> {
        self.get_json(self.video_url_of(video_id, "/pose")).await
    }

    async fn get_objects(&self, video_id: &str) -> Result<ObjectTrackPayload, ApiError> {
        self.get_json(self.video_url_of(video_id, "/objects")).await
    }

    async fn get_actions(&self, video_id: &str) -> Result<Vec<ActionPayload>, ApiError> {
        self.get_json(self.video_url_of(video_id, "/actions")).await
    }

    async fn get_frame(&self, video_id: &str, frame: FrameIndex) -> Result<FramePayload, ApiError> {
        let number = u64::from(frame) + 1;
        self.get_json(self.video_url_of(video_id, &format!("/frame/{}", number)))
            .await
    }

    async fn save_annotations(
        &self,
        video_id: &str,
        annotations: &AnnotationsPayload,
    ) -> Result<SaveAnnotationsResponse, ApiError> {
        let url = self.video_url_of(video_id, "/annotations");
        log::debug!("POST {} ({:?})", url, annotations.tracks());
        let response = self.client.post(url).json(annotations).send().await?;
        Self::parse_response(response).await
    }

    async fn put_pose(&self, video_id: &str, frame: FrameIndex, pose: &PosePayload) -> Result<(), ApiError> {
        let url = self.video_url_of(video_id, &format!("/pose/{}", wire::frame_key(frame)));
        log::debug!("PUT {}", url);
        let response = self.client.put(url).json(pose).send().await?;
        Self::check_status(response).await
    }

    async fn put_objects(
        &self,
        video_id: &str,
        frame: FrameIndex,
        objects: &[ObjectPayload],
    ) -> Result<(), ApiError> {
        let url = self.video_url_of(video_id, &format!("/objects/{}", wire::frame_key(frame)));
        log::debug!("PUT {}", url);
        let response = self.client.put(url).json(objects).send().await?;
        Self::check_status(response).await
    }

    async fn add_action(&self, video_id: &str, action: &ActionPayload) -> Result<(), ApiError> {
        let url = self.video_url_of(video_id, "/actions");
        log::debug!("POST {}", url);
        let response = self.client.post(url).json(action).send().await?;
        Self::check_status(response).await
    }

    async fn delete_action(&self, video_id: &str, index: usize) -> Result<(), ApiError> {
        let url = self.video_url_of(video_id, &format!("/actions/{}", index));
        log::debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        Self::check_status(response).await
    }

    async fn export(&self, video_id: &str, format: ExportFormat) -> Result<ExportPayload, ApiError> {
        let url = self.video_url_of(video_id, "/export");
        log::debug!("GET {}?format={}", url, format);
        let response = self
            .client
            .get(url)
            .query(&[("format", format.as_str())])
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(ExportPayload {
            format,
            content_type,
            bytes,
        })
    }

    async fn export_summary(&self, video_id: &str) -> Result<ExportSummary, ApiError> {
        self.get_json(self.video_url_of(video_id, "/export/summary")).await
    }

    fn video_url(&self, video_id: &str) -> String {
        self.video_url_of(video_id, "/file")
    }
}
