//! In-memory backend double for tests.
//!
//! Stores tracks the way the real backend does (frame keys, one-based action
//! frames, actions kept sorted on append), counts calls per operation and
//! tracks how many requests are in flight at once.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::client::{AnnotationBackend, ApiError, validate_upload_path};
use crate::api::types::{
    ActionAvailability, AvailableData, ExportFormat, ExportPayload, ExportSummary,
    ObjectAvailability, PoseAvailability, ProcessingStatus, SaveAnnotationsResponse, StatusResponse,
    UploadResponse, VideoInfo,
};
use crate::timing::FrameIndex;
use crate::wire::{
    self, ActionPayload, AnnotationsPayload, FramePayload, ObjectPayload, ObjectTrackPayload,
    PosePayload, PoseTrackPayload,
};

#[derive(Debug, Default)]
struct Store {
    pose: Option<PoseTrackPayload>,
    objects: Option<ObjectTrackPayload>,
    actions: Option<Vec<ActionPayload>>,
    statuses: VecDeque<String>,
    failures: HashMap<String, VecDeque<u16>>,
    calls: HashMap<String, usize>,
    requests: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    store: Mutex<Store>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pose(self, pose: PoseTrackPayload) -> Self {
        self.store.lock().unwrap().pose = Some(pose);
        self
    }

    pub fn with_objects(self, objects: ObjectTrackPayload) -> Self {
        self.store.lock().unwrap().objects = Some(objects);
        self
    }

    pub fn with_actions(self, actions: Vec<ActionPayload>) -> Self {
        self.store.lock().unwrap().actions = Some(actions);
        self
    }

    /// Every request sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Statuses returned by successive `status` calls; `completed` once
    /// exhausted.
    pub fn script_statuses<'s>(&self, statuses: impl IntoIterator<Item = &'s str>) {
        let mut store = self.store.lock().unwrap();
        store.statuses.extend(statuses.into_iter().map(str::to_string));
    }

    /// Make the next call of `op` fail with an HTTP status.
    pub fn fail_next(&self, op: &str, status: u16) {
        let mut store = self.store.lock().unwrap();
        store.failures.entry(op.to_string()).or_default().push_back(status);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.store.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    /// Requests received so far, as `op` or `op:target`.
    pub fn requests(&self) -> Vec<String> {
        self.store.lock().unwrap().requests.clone()
    }

    /// Highest number of requests seen in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn stored_actions(&self) -> Vec<ActionPayload> {
        self.store.lock().unwrap().actions.clone().unwrap_or_default()
    }

    pub fn stored_pose(&self, frame: FrameIndex) -> Option<PosePayload> {
        let store = self.store.lock().unwrap();
        store.pose.as_ref()?.get(&wire::frame_key(frame)).cloned()
    }

    pub fn stored_objects(&self, frame: FrameIndex) -> Option<Vec<ObjectPayload>> {
        let store = self.store.lock().unwrap();
        store.objects.as_ref()?.get(&wire::frame_key(frame)).cloned()
    }

    async fn enter(&self, op: &str, target: Option<String>) -> Result<InFlight<'_>, ApiError> {
        let failure = {
            let mut store = self.store.lock().unwrap();
            *store.calls.entry(op.to_string()).or_default() += 1;
            let request = match target {
                Some(t) => format!("{}:{}", op, t),
                None => op.to_string(),
            };
            store.requests.push(request);
            store.failures.get_mut(op).and_then(VecDeque::pop_front)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight {
            counter: &self.in_flight,
        };

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(status) => Err(ApiError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(guard),
        }
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::Status {
            status: 404,
            body: format!("{} not found", what),
        }
    }
}

#[async_trait]
impl AnnotationBackend for MockBackend {
    async fn upload(&self, path: &Path) -> Result<UploadResponse, ApiError> {
        validate_upload_path(path)?;
        let _guard = self.enter("upload", None).await?;
        Ok(UploadResponse {
            video_id: "mock-video".to_string(),
            filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            status: Some(ProcessingStatus::Queued),
            message: None,
        })
    }

    async fn status(&self, video_id: &str) -> Result<StatusResponse, ApiError> {
        let _guard = self.enter("status", None).await?;
        let next = self.store.lock().unwrap().statuses.pop_front();
        let status = next.as_deref().unwrap_or("completed");
        let Ok(status) = status.parse::<ProcessingStatus>();
        Ok(StatusResponse {
            video_id: video_id.to_string(),
            status,
        })
    }

    async fn info(&self, video_id: &str) -> Result<VideoInfo, ApiError> {
        let _guard = self.enter("info", None).await?;
        let store = self.store.lock().unwrap();
        Ok(VideoInfo {
            video_id: video_id.to_string(),
            has_pose: store.pose.is_some(),
            has_objects: store.objects.is_some(),
            has_actions: store.actions.is_some(),
            frame_count: store.pose.as_ref().map_or(0, |p| p.len() as u32),
            status: ProcessingStatus::Completed,
        })
    }

    async fn get_pose(&self, _video_id: &str) -> Result<PoseTrackPayload, ApiError> {
        let _guard = self.enter("get_pose", None).await?;
        self.store.lock().unwrap().pose.clone().ok_or_else(|| Self::not_found("Pose data"))
    }

    async fn get_objects(&self, _video_id: &str) -> Result<ObjectTrackPayload, ApiError> {
        let _guard = self.enter("get_objects", None).await?;
        self.store
            .lock()
            .unwrap()
            .objects
            .clone()
            .ok_or_else(|| Self::not_found("Objects data"))
    }

    async fn get_actions(&self, _video_id: &str) -> Result<Vec<ActionPayload>, ApiError> {
        let _guard = self.enter("get_actions", None).await?;
        self.store
            .lock()
            .unwrap()
            .actions
            .clone()
            .ok_or_else(|| Self::not_found("Actions data"))
    }

    async fn get_frame(&self, _video_id: &str, frame: FrameIndex) -> Result<FramePayload, ApiError> {
        let key = wire::frame_key(frame);
        let _guard = self.enter("get_frame", Some(key.clone())).await?;
        let store = self.store.lock().unwrap();
        let number = frame + 1;
        Ok(FramePayload {
            frame: number,
            pose: store.pose.as_ref().and_then(|p| p.get(&key)).cloned(),
            objects: store.objects.as_ref().and_then(|o| o.get(&key)).cloned(),
            actions: store
                .actions
                .iter()
                .flatten()
                .filter(|a| a.start_frame <= number && number <= a.end_frame)
                .cloned()
                .collect(),
        })
    }

    async fn save_annotations(
        &self,
        _video_id: &str,
        annotations: &AnnotationsPayload,
    ) -> Result<SaveAnnotationsResponse, ApiError> {
        let _guard = self.enter("save_annotations", None).await?;
        let mut store = self.store.lock().unwrap();
        let saved = annotations.tracks();
        if let Some(pose) = annotations.pose.as_ref().filter(|p| !p.is_empty()) {
            store.pose = Some(pose.clone());
        }
        if let Some(objects) = annotations.objects.as_ref().filter(|o| !o.is_empty()) {
            store.objects = Some(objects.clone());
        }
        if let Some(actions) = annotations.actions.as_ref().filter(|a| !a.is_empty()) {
            store.actions = Some(actions.clone());
        }
        Ok(SaveAnnotationsResponse {
            message: "Annotations saved successfully".to_string(),
            saved: saved.into_iter().map(str::to_string).collect(),
        })
    }

    async fn put_pose(&self, _video_id: &str, frame: FrameIndex, pose: &PosePayload) -> Result<(), ApiError> {
        let key = wire::frame_key(frame);
        let _guard = self.enter("put_pose", Some(key.clone())).await?;
        let mut store = self.store.lock().unwrap();
        store.pose.get_or_insert_with(Default::default).insert(key, pose.clone());
        Ok(())
    }

    async fn put_objects(
        &self,
        _video_id: &str,
        frame: FrameIndex,
        objects: &[ObjectPayload],
    ) -> Result<(), ApiError> {
        let key = wire::frame_key(frame);
        let _guard = self.enter("put_objects", Some(key.clone())).await?;
        let mut store = self.store.lock().unwrap();
        store
            .objects
            .get_or_insert_with(Default::default)
            .insert(key, objects.to_vec());
        Ok(())
    }

    async fn add_action(&self, _video_id: &str, action: &ActionPayload) -> Result<(), ApiError> {
        let _guard = self.enter("add_action", Some(action.label.clone())).await?;
        let mut store = self.store.lock().unwrap();
        let actions = store.actions.get_or_insert_with(Vec::new);
        actions.push(action.clone());
        actions.sort_by_key(|a| a.start_frame);
        Ok(())
    }

    async fn delete_action(&self, _video_id: &str, index: usize) -> Result<(), ApiError> {
        let _guard = self.enter("delete_action", Some(index.to_string())).await?;
        let mut store = self.store.lock().unwrap();
        match store.actions.as_mut() {
            Some(actions) if index < actions.len() => {
                actions.remove(index);
                Ok(())
            }
            _ => Err(Self::not_found("Action index")),
        }
    }

    async fn export(&self, video_id: &str, format: ExportFormat) -> Result<ExportPayload, ApiError> {
        let _guard = self.enter("export", Some(format.to_string())).await?;
        let store = self.store.lock().unwrap();
        let body = serde_json::json!({
            "video_id": video_id,
            "pose": store.pose,
            "objects": store.objects,
            "actions": store.actions,
        });
        Ok(ExportPayload {
            format,
            content_type: Some("application/json".to_string()),
            bytes: serde_json::to_vec(&body)?,
        })
    }

    async fn export_summary(&self, video_id: &str) -> Result<ExportSummary, ApiError> {
        let _guard = self.enter("export_summary", None).await?;
        let store = self.store.lock().unwrap();
        let mut types: Vec<String> = store
            .actions
            .iter()
            .flatten()
            .map(|a| a.label.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(ExportSummary {
            video_id: video_id.to_string(),
            available_formats: vec![ExportFormat::Json, ExportFormat::Csv, ExportFormat::Yaml],
            available_data: AvailableData {
                pose: store.pose.as_ref().map(|p| PoseAvailability {
                    frame_count: p.len(),
                    keypoint_count: p.values().next().map_or(0, |f| f.keypoints.len()),
                }),
                objects: store.objects.as_ref().map(|o| ObjectAvailability {
                    frame_count: o.len(),
                    total_detections: o.values().map(Vec::len).sum(),
                }),
                actions: store.actions.as_ref().map(|a| ActionAvailability {
                    action_count: a.len(),
                    action_types: types,
                }),
            },
        })
    }

    fn video_url(&self, video_id: &str) -> String {
        format!("mock://video/{}", video_id)
    }
}
