//! Edit session: one video's document, the editor state around it and its
//! persistence to the backend.
//!
//! Network work is split from state changes so the editor stays usable while
//! a request is out. A load is `begin_load` → [`fetch_document`] →
//! `apply_load`; a save is `begin_save` → [`run_save`] → `complete_save`.
//! Results that come back after the session moved on to another video are
//! dropped.

use std::collections::BTreeSet;
use std::mem;

use thiserror::Error;
use web_time::Instant;

use crate::api::{
    AnnotationBackend, ApiError, ExportFormat, ExportPayload, SaveAnnotationsResponse, VideoInfo,
};
use crate::constants::{DEFAULT_CONFIDENCE, DEFAULT_FPS};
use crate::coords::{Point, Scaler, SourcePoint};
use crate::model::{
    ActionSegment, AnnotationDocument, BoundingBox, DetectedObject, DocumentError, Tool,
    placeholder_document,
};
use crate::render::{DragState, DrawSurface, FrameSlice, OverlayRenderer};
use crate::timing::{FrameClock, FrameIndex};
use crate::wire::{
    self, ActionPayload, AnnotationsPayload, FramePayload, ObjectPayload, PosePayload, WireSpaces,
};

/// Label of an object added without one.
pub const NEW_OBJECT_LABEL: &str = "new_object";

/// Corners of an object added without a box, in reference pixels.
pub const NEW_OBJECT_CORNERS: [f32; 4] = [100.0, 100.0, 200.0, 200.0];

/// Errors raised by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A save is already running
    #[error("A save is already in progress")]
    SaveInProgress,

    /// There are no unsaved edits
    #[error("No unsaved changes to save")]
    NothingToSave,

    /// No video is loaded
    #[error("No video is open")]
    Closed,

    /// An edit was rejected
    #[error(transparent)]
    Document(#[from] DocumentError),
}

// ============================================================================
// Pending edits
// ============================================================================

/// A change to the action list, replayed on the backend in order.
#[derive(Debug, Clone, PartialEq)]
enum ActionOp {
    Add(ActionPayload),
    Delete(usize),
}

/// Edits made since the last successful save.
///
/// Pose and object writes replace a whole frame, so only the frame is
/// remembered and its content is read when the save starts.
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingEdits {
    pose: BTreeSet<FrameIndex>,
    objects: BTreeSet<FrameIndex>,
    actions: Vec<ActionOp>,
}

impl PendingEdits {
    fn is_empty(&self) -> bool {
        self.pose.is_empty() && self.objects.is_empty() && self.actions.is_empty()
    }

    fn len(&self) -> usize {
        self.pose.len() + self.objects.len() + self.actions.len()
    }

    /// Put back requests that did not go through, ahead of newer edits.
    fn restore(&mut self, unfinished: &[SaveRequest]) {
        let mut actions = Vec::new();
        for request in unfinished {
            match request {
                SaveRequest::Pose { frame, .. } => {
                    self.pose.insert(*frame);
                }
                SaveRequest::Objects { frame, .. } => {
                    self.objects.insert(*frame);
                }
                SaveRequest::AddAction(payload) => actions.push(ActionOp::Add(payload.clone())),
                SaveRequest::DeleteAction(index) => actions.push(ActionOp::Delete(*index)),
            }
        }
        actions.append(&mut self.actions);
        self.actions = actions;
    }
}

/// The backend's action list as it will be once every pending edit is saved.
///
/// Deletes address the backend list by position, which differs from the
/// document's whenever the backend holds items the document skipped or the
/// document is not backed by the backend at all.
#[derive(Debug, Clone, Default, PartialEq)]
struct RemoteActions(Vec<ActionPayload>);

impl RemoteActions {
    fn position_of(&self, segment: &ActionSegment) -> Option<usize> {
        self.0
            .iter()
            .position(|p| p.to_segment().ok().as_ref() == Some(segment))
    }

    /// Insert the way the backend does: append, then a stable sort by start.
    fn add(&mut self, payload: ActionPayload) {
        self.0.push(payload);
        self.0.sort_by_key(|a| a.start_frame);
    }

    fn remove(&mut self, index: usize) {
        self.0.remove(index);
    }
}

// ============================================================================
// Save
// ============================================================================

/// One backend write.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveRequest {
    Pose { frame: FrameIndex, payload: PosePayload },
    Objects { frame: FrameIndex, payload: Vec<ObjectPayload> },
    AddAction(ActionPayload),
    DeleteAction(usize),
}

/// Snapshot of everything a save will send.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a started save must be completed with `complete_save`"]
pub struct SaveTicket {
    video_id: String,
    generation: u64,
    save_id: u64,
    /// Edit count when the snapshot was taken.
    revision: u64,
    requests: Vec<SaveRequest>,
}

impl SaveTicket {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn requests(&self) -> &[SaveRequest] {
        &self.requests
    }
}

/// Outcome of [`run_save`].
#[derive(Debug)]
pub struct SaveReport {
    /// Requests that succeeded, counted from the start of the ticket.
    pub completed: usize,
    /// Failure that stopped the save.
    pub error: Option<ApiError>,
}

/// Send a save ticket's requests one after another, stopping at the first
/// failure.
///
/// Whole-frame writes go first; action edits follow in the order they were
/// made, since deletes address the list by position.
pub async fn run_save(backend: &dyn AnnotationBackend, ticket: &SaveTicket) -> SaveReport {
    let video_id = ticket.video_id.as_str();
    for (completed, request) in ticket.requests.iter().enumerate() {
        let result = match request {
            SaveRequest::Pose { frame, payload } => backend.put_pose(video_id, *frame, payload).await,
            SaveRequest::Objects { frame, payload } => backend.put_objects(video_id, *frame, payload).await,
            SaveRequest::AddAction(payload) => backend.add_action(video_id, payload).await,
            SaveRequest::DeleteAction(index) => backend.delete_action(video_id, *index).await,
        };
        if let Err(e) = result {
            return SaveReport {
                completed,
                error: Some(e),
            };
        }
    }
    SaveReport {
        completed: ticket.requests.len(),
        error: None,
    }
}

// ============================================================================
// Load
// ============================================================================

/// Identifies one load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    video_id: String,
    generation: u64,
}

impl LoadTicket {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }
}

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentSource {
    /// Nothing loaded yet
    #[default]
    Empty,
    Backend,
    /// The backend had no annotations; a demo document stands in.
    Placeholder,
}

/// A document fetched for a [`LoadTicket`].
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub document: AnnotationDocument,
    pub source: DocumentSource,
    pub info: Option<VideoInfo>,
    /// The backend's action list as fetched, including items the document
    /// could not use.
    pub remote_actions: Vec<ActionPayload>,
}

/// Result of applying a fetched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(DocumentSource),
    /// The session moved on before the response arrived.
    Discarded,
}

/// Fetch all three tracks of a video concurrently.
///
/// A track that fails to load counts as empty. When every track is empty the
/// placeholder document is used instead.
pub async fn fetch_document(
    backend: &dyn AnnotationBackend,
    ticket: &LoadTicket,
    spaces: WireSpaces,
) -> FetchedDocument {
    let video_id = ticket.video_id.as_str();
    let (pose, objects, actions, info) = tokio::join!(
        backend.get_pose(video_id),
        backend.get_objects(video_id),
        backend.get_actions(video_id),
        backend.info(video_id),
    );

    let pose = pose.unwrap_or_else(|e| {
        log::warn!("No pose data for {}: {}", video_id, e);
        Default::default()
    });
    let objects = objects.unwrap_or_else(|e| {
        log::warn!("No object data for {}: {}", video_id, e);
        Default::default()
    });
    let actions = actions.unwrap_or_else(|e| {
        log::warn!("No action data for {}: {}", video_id, e);
        Vec::new()
    });
    let info = info
        .inspect_err(|e| log::debug!("No info for {}: {}", video_id, e))
        .ok();

    let document = wire::document_from_wire(&pose, &objects, &actions, spaces);
    if document.is_empty() {
        log::warn!("No annotations for {}, using placeholder data", video_id);
        return FetchedDocument {
            document: placeholder_document(),
            source: DocumentSource::Placeholder,
            info,
            remote_actions: actions,
        };
    }

    log::info!(
        "Loaded {}: {} pose frames, {} object frames, {} actions",
        video_id,
        document.pose().len(),
        document.objects().len(),
        document.actions().len()
    );
    FetchedDocument {
        document,
        source: DocumentSource::Backend,
        info,
        remote_actions: actions,
    }
}

// ============================================================================
// Export
// ============================================================================

/// An export together with whether the session had unsaved edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Exported {
    pub payload: ExportPayload,
    /// The export reflects the last save, not these edits.
    pub unsaved_edits: bool,
}

// ============================================================================
// Session
// ============================================================================

/// Editor state for one video.
#[derive(Debug)]
pub struct EditSession {
    document: AnnotationDocument,
    source: DocumentSource,
    video_id: Option<String>,
    clock: FrameClock,
    tool: Tool,
    current_frame: FrameIndex,
    dirty: bool,
    /// Counts edits; tells a finished save whether edits arrived meanwhile.
    revision: u64,
    /// The save currently out, if any. Outlives loads and closes so two
    /// saves never overlap.
    saving: Option<u64>,
    save_seq: u64,
    pending: PendingEdits,
    remote_actions: RemoteActions,
    /// Bumped on every load and close; responses for older values are stale.
    generation: u64,
    spaces: WireSpaces,
    renderer: OverlayRenderer,
    drag: Option<DragState>,
    last_saved: Option<Instant>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

impl EditSession {
    pub fn new(fps: f64) -> Self {
        Self {
            document: AnnotationDocument::new(),
            source: DocumentSource::Empty,
            video_id: None,
            clock: FrameClock::new(fps, 0),
            tool: Tool::default(),
            current_frame: 0,
            dirty: false,
            revision: 0,
            saving: None,
            save_seq: 0,
            pending: PendingEdits::default(),
            remote_actions: RemoteActions::default(),
            generation: 0,
            spaces: WireSpaces::default(),
            renderer: OverlayRenderer::default(),
            drag: None,
            last_saved: None,
        }
    }

    /// Use a renderer with non-default hit radius or confidence bands.
    pub fn with_renderer(mut self, renderer: OverlayRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Declare the coordinate spaces of backend tracks instead of detecting
    /// them.
    pub fn with_spaces(mut self, spaces: WireSpaces) -> Self {
        self.spaces = spaces;
        self
    }

    pub fn document(&self) -> &AnnotationDocument {
        &self.document
    }

    pub fn source(&self) -> DocumentSource {
        self.source
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.current_frame
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_some()
    }

    /// Whether a save may start now.
    pub fn can_save(&self) -> bool {
        self.dirty && !self.is_saving() && self.video_id.is_some()
    }

    /// Number of frame writes and action edits waiting to be saved.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Time since the last successful save.
    pub fn since_last_save(&self) -> Option<std::time::Duration> {
        self.last_saved.map(|t| t.elapsed())
    }

    // ========================================================================
    // Tool and navigation
    // ========================================================================

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            log::debug!("Tool: {}", tool.name());
            self.drag = None;
            self.tool = tool;
        }
    }

    /// Set the clip length once the video's duration is known.
    pub fn set_duration(&mut self, duration_secs: f64) {
        self.clock = FrameClock::from_duration(self.clock.fps(), duration_secs);
        self.current_frame = self.clock.clamp(self.current_frame);
    }

    /// Jump to a frame, clamped to the clip.
    pub fn seek(&mut self, frame: FrameIndex) -> FrameIndex {
        self.current_frame = self.clock.clamp(frame);
        self.current_frame
    }

    /// Jump to the frame shown at a playback time.
    pub fn seek_time(&mut self, time_secs: f64) -> FrameIndex {
        self.current_frame = self.clock.frame_of(time_secs);
        self.current_frame
    }

    /// Move by `delta` frames, clamped to the clip.
    pub fn step(&mut self, delta: i64) -> FrameIndex {
        self.current_frame = self.clock.step(self.current_frame, delta);
        self.current_frame
    }

    pub fn next_frame(&mut self) -> FrameIndex {
        self.step(1)
    }

    pub fn prev_frame(&mut self) -> FrameIndex {
        self.step(-1)
    }

    /// Playback time of the current frame.
    pub fn current_time(&self) -> f64 {
        self.clock.time_of(self.current_frame)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// What the overlay shows at the current frame.
    pub fn slice(&self) -> FrameSlice<'_> {
        FrameSlice::of(&self.document, self.current_frame)
            .with_dragging(self.drag.as_ref().map(DragState::keypoint))
    }

    /// Draw the current frame for the active tool.
    pub fn render(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        self.renderer.render(surface, &self.slice(), self.tool, scaler);
    }

    // ========================================================================
    // Edits
    // ========================================================================

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Move (or create) a keypoint on the current frame.
    pub fn set_pose_keypoint(&mut self, name: &str, position: SourcePoint) -> Result<(), SessionError> {
        let frame = self.current_frame;
        self.document.set_pose_keypoint(frame, name, position)?;
        self.pending.pose.insert(frame);
        self.mark_dirty();
        Ok(())
    }

    /// Replace the current frame's object list.
    pub fn set_objects(&mut self, objects: Vec<DetectedObject>) {
        let frame = self.current_frame;
        self.document.set_objects(frame, objects);
        self.pending.objects.insert(frame);
        self.mark_dirty();
    }

    /// Add an object to the current frame; `None` adds the default box.
    pub fn add_object(&mut self, object: Option<DetectedObject>) -> usize {
        let object = object.unwrap_or_else(|| {
            let [x1, y1, x2, y2] = NEW_OBJECT_CORNERS;
            DetectedObject::new(
                NEW_OBJECT_LABEL,
                BoundingBox::from_corners(x1, y1, x2, y2),
                DEFAULT_CONFIDENCE,
            )
        });
        let frame = self.current_frame;
        let index = self.document.add_object(frame, object);
        self.pending.objects.insert(frame);
        self.mark_dirty();
        index
    }

    /// Replace one object of the current frame.
    pub fn replace_object(&mut self, index: usize, object: DetectedObject) -> Result<DetectedObject, SessionError> {
        let frame = self.current_frame;
        let old = self.document.replace_object(frame, index, object)?;
        self.pending.objects.insert(frame);
        self.mark_dirty();
        Ok(old)
    }

    /// Remove one object of the current frame.
    pub fn remove_object(&mut self, index: usize) -> Result<DetectedObject, SessionError> {
        let frame = self.current_frame;
        let removed = self.document.remove_object(frame, index)?;
        self.pending.objects.insert(frame);
        self.mark_dirty();
        Ok(removed)
    }

    /// Insert an action segment, returning its position.
    pub fn add_action(&mut self, segment: ActionSegment) -> Result<usize, SessionError> {
        let payload = ActionPayload::from(&segment);
        let index = self.document.add_action(segment)?;
        self.remote_actions.add(payload.clone());
        self.pending.actions.push(ActionOp::Add(payload));
        self.mark_dirty();
        Ok(index)
    }

    /// Delete an action segment by its position in the document.
    ///
    /// The backend is told to delete the matching item of its own list. A
    /// segment the backend never had, such as a placeholder one, is removed
    /// locally only.
    pub fn delete_action(&mut self, index: usize) -> Result<ActionSegment, SessionError> {
        let removed = self.document.delete_action(index)?;
        match self.remote_actions.position_of(&removed) {
            Some(remote) => {
                self.remote_actions.remove(remote);
                self.pending.actions.push(ActionOp::Delete(remote));
            }
            None => log::debug!("Action '{}' is not on the backend, removed locally", removed.label),
        }
        self.mark_dirty();
        Ok(removed)
    }

    // ========================================================================
    // Pointer
    // ========================================================================

    /// Press at a screen position. Starts a keypoint drag in pose mode when
    /// a keypoint is in range.
    pub fn pointer_down(&mut self, screen: Point, scaler: &Scaler) -> bool {
        if self.tool != Tool::Pose {
            return false;
        }
        let Some(pose) = self.document.get_pose(self.current_frame) else {
            return false;
        };
        self.drag = self.renderer.begin_drag(pose, screen, scaler);
        self.drag.is_some()
    }

    /// Move the pointer; an active drag moves its keypoint.
    pub fn pointer_move(&mut self, screen: Point, scaler: &Scaler) -> Result<Option<SourcePoint>, SessionError> {
        let Some(drag) = self.drag.as_mut() else {
            return Ok(None);
        };
        let position = drag.drag_to(screen, scaler);
        let name = drag.keypoint().to_string();
        self.set_pose_keypoint(&name, position)?;
        Ok(Some(position))
    }

    /// Release the pointer, ending any drag.
    pub fn pointer_up(&mut self) -> Option<(String, SourcePoint)> {
        self.drag.take().map(|drag| self.renderer.end_drag(drag))
    }

    pub fn dragging(&self) -> Option<&str> {
        self.drag.as_ref().map(DragState::keypoint)
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Start loading `video_id`. Any load or save still running for an
    /// earlier video becomes stale.
    pub fn begin_load(&mut self, video_id: &str) -> LoadTicket {
        self.generation += 1;
        log::info!("Loading {}", video_id);
        LoadTicket {
            video_id: video_id.to_string(),
            generation: self.generation,
        }
    }

    /// Install a fetched document, unless the ticket is stale.
    pub fn apply_load(&mut self, ticket: LoadTicket, fetched: FetchedDocument) -> LoadOutcome {
        if ticket.generation != self.generation {
            log::debug!("Discarding stale load of {}", ticket.video_id);
            return LoadOutcome::Discarded;
        }

        let known_frames = fetched.info.as_ref().map_or(0, |i| i.frame_count);
        let total = known_frames.max(fetched.document.frame_span());
        self.clock = FrameClock::new(self.clock.fps(), total);
        self.document = fetched.document;
        self.source = fetched.source;
        self.video_id = Some(ticket.video_id);
        self.current_frame = 0;
        self.dirty = false;
        self.pending = PendingEdits::default();
        self.remote_actions = RemoteActions(fetched.remote_actions);
        self.drag = None;
        LoadOutcome::Applied(fetched.source)
    }

    /// Load a video, waiting for the backend.
    pub async fn load(&mut self, backend: &dyn AnnotationBackend, video_id: &str) -> LoadOutcome {
        let ticket = self.begin_load(video_id);
        let fetched = fetch_document(backend, &ticket, self.spaces).await;
        self.apply_load(ticket, fetched)
    }

    /// Drop the current video. Results still in flight will be discarded.
    pub fn close(&mut self) {
        self.generation += 1;
        if self.dirty {
            log::warn!("Closing {:?} with unsaved edits", self.video_id);
        }
        *self = Self {
            generation: self.generation,
            saving: self.saving,
            save_seq: self.save_seq,
            spaces: self.spaces,
            renderer: self.renderer,
            ..Self::new(self.clock.fps())
        };
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Start a save, snapshotting every pending edit.
    ///
    /// Rejected while another save runs, including one started before the
    /// current video was loaded, or when there is nothing to save. Editing
    /// may continue while the ticket is out. A ticket can be empty when the
    /// only edits were local-only deletes.
    pub fn begin_save(&mut self) -> Result<SaveTicket, SessionError> {
        if self.is_saving() {
            return Err(SessionError::SaveInProgress);
        }
        let Some(video_id) = self.video_id.clone() else {
            return Err(SessionError::Closed);
        };
        if !self.dirty {
            return Err(SessionError::NothingToSave);
        }

        let pending = mem::take(&mut self.pending);
        let mut requests = Vec::with_capacity(pending.len());
        for frame in pending.pose {
            if let Some(pose) = self.document.get_pose(frame) {
                requests.push(SaveRequest::Pose {
                    frame,
                    payload: PosePayload::from(pose),
                });
            }
        }
        for frame in pending.objects {
            if let Some(objects) = self.document.objects().exact(frame) {
                requests.push(SaveRequest::Objects {
                    frame,
                    payload: objects.iter().map(ObjectPayload::from).collect(),
                });
            }
        }
        requests.extend(pending.actions.into_iter().map(|op| match op {
            ActionOp::Add(payload) => SaveRequest::AddAction(payload),
            ActionOp::Delete(index) => SaveRequest::DeleteAction(index),
        }));

        self.save_seq += 1;
        self.saving = Some(self.save_seq);
        log::info!("Saving {} ({} requests)", video_id, requests.len());
        Ok(SaveTicket {
            video_id,
            generation: self.generation,
            save_id: self.save_seq,
            revision: self.revision,
            requests,
        })
    }

    /// Finish a save started with [`begin_save`](Self::begin_save).
    ///
    /// On failure the unsent edits are kept and the session stays dirty; the
    /// error is returned for display. Nothing is retried automatically.
    pub fn complete_save(&mut self, ticket: SaveTicket, report: SaveReport) -> Result<usize, ApiError> {
        if self.saving == Some(ticket.save_id) {
            self.saving = None;
        }
        if ticket.generation != self.generation {
            log::debug!("Save of {} finished after the session moved on", ticket.video_id);
            return match report.error {
                Some(e) => Err(e),
                None => Ok(report.completed),
            };
        }

        match report.error {
            None => {
                self.dirty = self.revision != ticket.revision;
                self.last_saved = Some(Instant::now());
                log::info!("Saved {} ({} requests)", ticket.video_id, report.completed);
                Ok(report.completed)
            }
            Some(e) => {
                let unfinished = ticket.requests.get(report.completed..).unwrap_or_default();
                self.pending.restore(unfinished);
                self.dirty = true;
                log::warn!(
                    "Save of {} failed after {} of {} requests: {}",
                    ticket.video_id,
                    report.completed,
                    ticket.requests.len(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Save all pending edits, waiting for the backend.
    pub async fn save(&mut self, backend: &dyn AnnotationBackend) -> crate::Result<usize> {
        let ticket = self.begin_save()?;
        let report = run_save(backend, &ticket).await;
        Ok(self.complete_save(ticket, report)?)
    }

    /// Write the whole document in one request, replacing the backend's
    /// tracks.
    ///
    /// The backend skips empty tracks, so pending edits to a track the
    /// document no longer has anything in stay pending.
    pub async fn save_all(&mut self, backend: &dyn AnnotationBackend) -> crate::Result<SaveAnnotationsResponse> {
        if self.is_saving() {
            return Err(SessionError::SaveInProgress.into());
        }
        let video_id = self.video_id.clone().ok_or(SessionError::Closed)?;
        let payload = AnnotationsPayload::from(&self.document);
        log::info!("Saving all of {} ({:?})", video_id, payload.tracks());
        let response = backend.save_annotations(&video_id, &payload).await?;

        if payload.pose.is_some() {
            self.pending.pose.clear();
        }
        if payload.objects.is_some() {
            self.pending.objects.clear();
        }
        if let Some(actions) = payload.actions {
            self.pending.actions.clear();
            self.remote_actions = RemoteActions(actions);
        }
        self.dirty = !self.pending.is_empty();
        self.last_saved = Some(Instant::now());
        Ok(response)
    }

    /// What the backend stores for the current frame.
    pub async fn fetch_frame(&self, backend: &dyn AnnotationBackend) -> crate::Result<FramePayload> {
        let video_id = self.video_id.as_deref().ok_or(SessionError::Closed)?;
        Ok(backend.get_frame(video_id, self.current_frame).await?)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Fetch an export of the saved annotations.
    ///
    /// Unsaved edits do not block the export but are not part of it; the
    /// result says so.
    pub async fn export(&self, backend: &dyn AnnotationBackend, format: ExportFormat) -> crate::Result<Exported> {
        let video_id = self.video_id.as_deref().ok_or(SessionError::Closed)?;
        let unsaved_edits = self.dirty;
        if unsaved_edits {
            log::warn!(
                "Exporting {} with {} unsaved edits; the export reflects the last save",
                video_id,
                self.pending.len()
            );
        }
        let payload = backend.export(video_id, format).await?;
        log::info!("Exported {} as {} ({} bytes)", video_id, format, payload.bytes.len());
        Ok(Exported {
            payload,
            unsaved_edits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockBackend;
    use crate::coords::{Size, SourceSpace};
    use crate::model::PLACEHOLDER_FRAMES;
    use crate::render::DisplayList;
    use crate::wire::{ObjectTrackPayload, PoseTrackPayload};
    use std::sync::Mutex;
    use std::time::Duration;

    fn pose_payload(x: f32) -> PosePayload {
        PosePayload {
            keypoints: [
                ("nose".to_string(), vec![x, 100.0, 0.0]),
                ("left_shoulder".to_string(), vec![x - 50.0, 200.0, 0.0]),
                ("left_elbow".to_string(), vec![x - 80.0, 300.0, 0.0]),
            ]
            .into_iter()
            .collect(),
            confidence: 0.9,
        }
    }

    fn object(label: &str, x: f32) -> ObjectPayload {
        ObjectPayload {
            label: label.to_string(),
            bbox: [x, 100.0, x + 200.0, 300.0],
            confidence: 0.8,
        }
    }

    fn action(label: &str, start: u32, end: u32) -> ActionPayload {
        ActionPayload {
            label: label.to_string(),
            start_frame: start,
            end_frame: end,
            confidence: 0.9,
        }
    }

    /// Pose and objects on frames 0 and 1, one action covering 100 frames.
    fn two_frame_backend() -> MockBackend {
        let pose: PoseTrackPayload = [
            (wire::frame_key(0), pose_payload(500.0)),
            (wire::frame_key(1), pose_payload(510.0)),
        ]
        .into_iter()
        .collect();
        let objects: ObjectTrackPayload = [
            (wire::frame_key(0), vec![object("cup", 300.0)]),
            (wire::frame_key(1), vec![object("cup", 310.0), object("box", 900.0)]),
        ]
        .into_iter()
        .collect();
        MockBackend::new()
            .with_pose(pose)
            .with_objects(objects)
            .with_actions(vec![action("walk", 1, 100)])
    }

    async fn loaded(backend: &MockBackend) -> EditSession {
        let session = loaded_as(backend, "v1").await;
        assert_eq!(session.source(), DocumentSource::Backend);
        session
    }

    async fn loaded_as(backend: &MockBackend, video_id: &str) -> EditSession {
        let mut session = EditSession::default();
        let outcome = session.load(backend, video_id).await;
        assert!(matches!(outcome, LoadOutcome::Applied(_)));
        session
    }

    #[tokio::test]
    async fn test_load_converts_backend_frames() {
        let backend = two_frame_backend();
        let session = loaded(&backend).await;
        let doc = session.document();
        assert_eq!(doc.pose().len(), 2);
        assert!(doc.get_pose(0).is_some());
        assert_eq!(doc.actions()[0].start, 0);
        assert_eq!(doc.actions()[0].end, 99);
        assert_eq!(session.clock().total_frames(), 100);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_scrub_past_sparse_pose() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        assert_eq!(session.seek(50), 50);

        let canvas = Size::new(960.0, 540.0);
        let scaler = Scaler::for_canvas(canvas);

        let mut list = DisplayList::new(canvas);
        session.set_tool(Tool::Pose);
        session.render(&mut list, &scaler);
        assert!(list.is_empty());

        let mut list = DisplayList::new(canvas);
        session.set_tool(Tool::Objects);
        session.render(&mut list, &scaler);
        let labels: Vec<_> = list.texts().collect();
        assert_eq!(labels, vec!["cup 80%", "box 80%"]);
        assert_eq!(session.slice().objects, session.document().get_objects(1u32));
    }

    #[tokio::test]
    async fn test_missing_data_falls_back_to_placeholder() {
        let backend = MockBackend::new();
        let mut session = EditSession::default();
        let outcome = session.load(&backend, "empty").await;
        assert_eq!(outcome, LoadOutcome::Applied(DocumentSource::Placeholder));
        assert_eq!(session.document().frame_span(), PLACEHOLDER_FRAMES);
        assert_eq!(session.video_id(), Some("empty"));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_tracks() {
        let backend = two_frame_backend();
        backend.fail_next("get_objects", 500);
        let session = loaded(&backend).await;
        assert!(session.document().objects().is_empty());
        assert_eq!(session.document().pose().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let backend = two_frame_backend();
        let mut session = EditSession::default();

        let first = session.begin_load("a");
        let second = session.begin_load("b");
        let fetched_first = fetch_document(&backend, &first, WireSpaces::default()).await;
        let fetched_second = fetch_document(&backend, &second, WireSpaces::default()).await;

        assert_eq!(session.apply_load(first, fetched_first), LoadOutcome::Discarded);
        assert_eq!(session.video_id(), None);
        assert_eq!(
            session.apply_load(second, fetched_second),
            LoadOutcome::Applied(DocumentSource::Backend)
        );
        assert_eq!(session.video_id(), Some("b"));
    }

    #[tokio::test]
    async fn test_load_after_close_is_discarded() {
        let backend = two_frame_backend();
        let mut session = EditSession::default();
        let ticket = session.begin_load("a");
        session.close();
        let fetched = fetch_document(&backend, &ticket, WireSpaces::default()).await;
        assert_eq!(session.apply_load(ticket, fetched), LoadOutcome::Discarded);
        assert!(session.document().is_empty());
    }

    #[test]
    fn test_navigation_clamps() {
        let mut session = EditSession::default();
        session.set_duration(2.0);
        assert_eq!(session.clock().total_frames(), 60);
        assert_eq!(session.seek(500), 59);
        assert_eq!(session.next_frame(), 59);
        assert_eq!(session.step(-100), 0);
        assert_eq!(session.prev_frame(), 0);
        assert_eq!(session.seek_time(1.0), 30);
        assert_eq!(session.seek_time(99.0), 59);
    }

    #[test]
    fn test_edits_mark_dirty() {
        let mut session = EditSession::default();
        assert!(!session.is_dirty());
        session
            .set_pose_keypoint("nose", SourcePoint::Pixels { x: 1.0, y: 2.0 })
            .unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn test_rejected_edit_leaves_session_clean() {
        let mut session = EditSession::default();
        let err = session.add_action(ActionSegment {
            label: "bad".to_string(),
            start: 60,
            end: 50,
            confidence: 0.5,
        });
        assert_eq!(
            err,
            Err(SessionError::Document(DocumentError::InvalidRange { start: 60, end: 50 }))
        );
        assert!(matches!(
            session.delete_action(3),
            Err(SessionError::Document(DocumentError::OutOfRange { .. }))
        ));
        assert!(!session.is_dirty());
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_add_default_object() {
        let mut session = EditSession::default();
        let index = session.add_object(None);
        let added = &session.document().get_objects(0u32)[index];
        assert_eq!(added.label, NEW_OBJECT_LABEL);
        assert_eq!(added.bbox, BoundingBox::new(100.0, 100.0, 100.0, 100.0));
        assert!(session.is_dirty());
    }

    #[tokio::test]
    async fn test_save_sends_edits_and_clears_dirty() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;

        session.seek(1);
        session
            .set_pose_keypoint("nose", SourcePoint::Pixels { x: 42.0, y: 43.0 })
            .unwrap();
        session.seek(5);
        session.remove_object(0).unwrap();
        session
            .add_action(ActionSegment::new("reach", 10, 20, 0.9).unwrap())
            .unwrap();

        let sent = session.save(&backend).await.unwrap();
        assert_eq!(sent, 3);
        assert!(!session.is_dirty());
        assert!(!session.is_saving());
        assert!(session.since_last_save().is_some());

        let nose = &backend.stored_pose(1).unwrap().keypoints["nose"];
        assert_eq!(&nose[..2], &[42.0, 43.0]);
        // Frame 5 only showed frame 1's objects; the edit lands on frame 5.
        assert_eq!(backend.stored_objects(5).unwrap().len(), 1);
        assert_eq!(backend.stored_objects(1).unwrap().len(), 2);
        let stored = backend.stored_actions();
        assert_eq!(stored.len(), 2);
        assert_eq!((stored[0].start_frame, stored[1].start_frame), (1, 11));
        assert_eq!(
            backend.requests()[4..],
            ["put_pose:frame_002", "put_objects:frame_006", "add_action:reach"]
        );
    }

    #[tokio::test]
    async fn test_save_rejected_when_clean_or_closed() {
        let mut session = EditSession::default();
        session.add_object(None);
        assert_eq!(session.begin_save(), Err(SessionError::Closed));

        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        assert_eq!(session.begin_save(), Err(SessionError::NothingToSave));
    }

    #[tokio::test]
    async fn test_second_save_while_saving_is_rejected() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        session.set_pose_keypoint("nose", SourcePoint::Pixels { x: 1.0, y: 1.0 }).unwrap();
        backend.set_delay(Duration::from_millis(20));

        let ticket = session.begin_save().unwrap();
        assert!(session.is_saving());
        assert_eq!(session.begin_save(), Err(SessionError::SaveInProgress));

        // Edits keep working while the save is out.
        session.seek(1);
        session.set_pose_keypoint("nose", SourcePoint::Pixels { x: 2.0, y: 2.0 }).unwrap();

        let report = run_save(&backend, &ticket).await;
        session.complete_save(ticket, report).unwrap();
        assert!(!session.is_saving());
        // The edit made during the save is still pending.
        assert!(session.is_dirty());
        assert_eq!(session.pending_count(), 1);
        assert_eq!(backend.calls("put_pose"), 1);
    }

    /// One save attempt against a session shared between tasks.
    async fn try_save(session: &Mutex<EditSession>, backend: &MockBackend) -> Result<usize, String> {
        let ticket = session.lock().unwrap().begin_save().map_err(|e| e.to_string())?;
        let report = run_save(backend, &ticket).await;
        session
            .lock()
            .unwrap()
            .complete_save(ticket, report)
            .map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_concurrent_save_requests_never_interleave() {
        let backend = two_frame_backend();
        let session = Mutex::new(loaded(&backend).await);
        {
            let mut s = session.lock().unwrap();
            s.set_pose_keypoint("nose", SourcePoint::Pixels { x: 1.0, y: 1.0 }).unwrap();
            s.seek(1);
            s.set_pose_keypoint("nose", SourcePoint::Pixels { x: 2.0, y: 2.0 }).unwrap();
        }
        backend.set_delay(Duration::from_millis(10));
        let before = backend.requests().len();

        let (first, second) = tokio::join!(
            try_save(&session, &backend),
            try_save(&session, &backend)
        );

        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        assert_eq!(backend.max_in_flight(), 1);
        assert_eq!(backend.requests().len() - before, 2);
        assert!(!session.lock().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_edits_in_order() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        session
            .add_action(ActionSegment::new("reach", 10, 20, 0.9).unwrap())
            .unwrap();
        session.delete_action(0).unwrap();

        backend.fail_next("delete_action", 503);
        let err = session.save(&backend).await.unwrap_err();
        assert!(matches!(err, crate::Error::Api(ref e) if e.is_network()));
        assert!(session.is_dirty());
        assert!(!session.is_saving());
        assert_eq!(backend.stored_actions().len(), 2);

        // Retrying by hand sends only what did not go through.
        session
            .add_action(ActionSegment::new("lift", 30, 40, 0.9).unwrap())
            .unwrap();
        session.save(&backend).await.unwrap();
        let labels: Vec<_> = backend.stored_actions().into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["reach", "lift"]);
        assert_eq!(backend.calls("add_action"), 2);
        let local: Vec<_> = session.document().actions().iter().map(|a| a.label.clone()).collect();
        assert_eq!(local, labels);
    }

    #[tokio::test]
    async fn test_save_finishing_after_close_is_ignored() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        session.add_object(None);
        let ticket = session.begin_save().unwrap();
        session.close();
        assert!(session.is_saving());
        let report = run_save(&backend, &ticket).await;
        assert_eq!(session.complete_save(ticket, report).unwrap(), 1);
        assert!(!session.is_saving());
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_save_guard_survives_reload_and_close() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        session.add_object(None);
        let first = session.begin_save().unwrap();

        session.load(&backend, "v1").await;
        assert!(session.is_saving());
        session.add_object(None);
        assert_eq!(session.begin_save(), Err(SessionError::SaveInProgress));
        assert!(!session.can_save());

        session.close();
        session.load(&backend, "v1").await;
        session.seek(1);
        session.add_object(None);
        assert_eq!(session.begin_save(), Err(SessionError::SaveInProgress));

        backend.set_delay(Duration::from_millis(10));
        let report = run_save(&backend, &first).await;
        assert_eq!(session.complete_save(first, report).unwrap(), 1);
        assert!(!session.is_saving());
        assert!(session.is_dirty());

        let second = session.begin_save().unwrap();
        let report = run_save(&backend, &second).await;
        assert_eq!(session.complete_save(second, report).unwrap(), 1);
        assert_eq!(backend.max_in_flight(), 1);
        assert_eq!(backend.calls("put_objects"), 2);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_delete_targets_backend_position() {
        // The first backend item starts at frame 0 and never reaches the
        // document, so document and backend positions are off by one.
        let backend = two_frame_backend().with_actions(vec![action("legacy", 0, 4), action("walk", 1, 100)]);
        let mut session = loaded(&backend).await;
        assert_eq!(session.document().actions().len(), 1);

        let removed = session.delete_action(0).unwrap();
        assert_eq!(removed.label, "walk");
        assert_eq!(session.save(&backend).await.unwrap(), 1);

        assert_eq!(backend.requests().last().map(String::as_str), Some("delete_action:1"));
        let labels: Vec<_> = backend.stored_actions().into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["legacy"]);
        assert!(session.document().actions().is_empty());
    }

    #[tokio::test]
    async fn test_delete_follows_backend_order_of_added_actions() {
        let backend = two_frame_backend().with_actions(vec![action("legacy", 0, 4), action("walk", 1, 100)]);
        let mut session = loaded(&backend).await;
        session
            .add_action(ActionSegment::new("reach", 9, 20, 0.9).unwrap())
            .unwrap();
        session
            .add_action(ActionSegment::new("grab", 0, 5, 0.9).unwrap())
            .unwrap();
        // Document: walk, grab, reach. Backend: legacy, walk, grab, reach.
        session.delete_action(2).unwrap();
        session.delete_action(0).unwrap();
        session.save(&backend).await.unwrap();

        assert_eq!(
            backend.requests()[backend.requests().len() - 2..],
            ["delete_action:3", "delete_action:1"]
        );
        let labels: Vec<_> = backend.stored_actions().into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["legacy", "grab"]);
        let local: Vec<_> = session.document().actions().iter().map(|a| a.label.clone()).collect();
        assert_eq!(local, labels[1..]);
    }

    #[tokio::test]
    async fn test_placeholder_deletes_stay_local() {
        let backend = MockBackend::new();
        let mut session = EditSession::default();
        session.load(&backend, "empty").await;
        assert_eq!(session.source(), DocumentSource::Placeholder);

        let added = session
            .add_action(ActionSegment::new("wave", 70, 80, 0.9).unwrap())
            .unwrap();
        session.delete_action(added).unwrap();
        session.delete_action(0).unwrap();
        assert!(session.is_dirty());

        assert_eq!(session.save(&backend).await.unwrap(), 2);
        assert_eq!(backend.calls("delete_action"), 1);
        assert!(backend.stored_actions().is_empty());
        assert!(!session.is_dirty());

        session.delete_action(0).unwrap();
        assert_eq!(session.save(&backend).await.unwrap(), 0);
        assert_eq!(backend.calls("delete_action"), 1);
        assert_eq!(session.document().actions().len(), 2);
    }

    #[tokio::test]
    async fn test_save_all_replaces_backend_tracks() {
        let backend = MockBackend::new();
        let mut session = EditSession::default();
        session.load(&backend, "empty").await;
        session.delete_action(0).unwrap();

        let response = session.save_all(&backend).await.unwrap();
        assert_eq!(response.saved, vec!["pose", "objects", "actions"]);
        assert!(!session.is_dirty());
        assert_eq!(backend.stored_actions().len(), 3);
        assert_eq!(backend.calls("save_annotations"), 1);

        // The backend now holds the document, so deletes reach it.
        session.delete_action(0).unwrap();
        session.save(&backend).await.unwrap();
        assert_eq!(backend.requests().last().map(String::as_str), Some("delete_action:0"));
        assert_eq!(backend.stored_actions().len(), 2);

        let reloaded = loaded_as(&backend, "empty").await;
        assert_eq!(reloaded.document().pose().len(), PLACEHOLDER_FRAMES as usize);
    }

    #[tokio::test]
    async fn test_save_all_keeps_deletes_of_emptied_actions() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        session.delete_action(0).unwrap();
        session.seek(1);
        session.set_pose_keypoint("nose", SourcePoint::Pixels { x: 5.0, y: 5.0 }).unwrap();

        let response = session.save_all(&backend).await.unwrap();
        assert_eq!(response.saved, vec!["pose", "objects"]);
        assert!(session.is_dirty());
        assert_eq!(session.pending_count(), 1);
        assert_eq!(backend.stored_actions().len(), 1);

        session.save(&backend).await.unwrap();
        assert!(backend.stored_actions().is_empty());
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_fetch_frame_uses_backend_numbering() {
        let backend = two_frame_backend().with_actions(vec![action("walk", 1, 100), action("wave", 3, 9)]);
        let mut session = loaded(&backend).await;
        session.seek(1);
        let frame = session.fetch_frame(&backend).await.unwrap();
        assert_eq!(frame.frame, 2);
        assert_eq!(frame.pose, Some(pose_payload(510.0)));
        assert_eq!(frame.objects.map(|o| o.len()), Some(2));
        assert_eq!(frame.actions, vec![action("walk", 1, 100)]);

        session.seek(5);
        let frame = session.fetch_frame(&backend).await.unwrap();
        assert!(frame.pose.is_none());
        assert_eq!(frame.actions.len(), 2);
        assert_eq!(backend.requests().last().map(String::as_str), Some("get_frame:frame_006"));

        session.close();
        assert!(session.fetch_frame(&backend).await.is_err());
    }

    #[tokio::test]
    async fn test_export_warns_but_does_not_block() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        let clean = session.export(&backend, ExportFormat::Json).await.unwrap();
        assert!(!clean.unsaved_edits);

        session.add_object(None);
        let dirty = session.export(&backend, ExportFormat::Csv).await.unwrap();
        assert!(dirty.unsaved_edits);
        assert_eq!(dirty.payload.format, ExportFormat::Csv);
        assert!(session.is_dirty());
        assert_eq!(backend.calls("put_objects"), 0);
    }

    #[tokio::test]
    async fn test_drag_moves_keypoint_and_marks_dirty() {
        let backend = two_frame_backend();
        let mut session = loaded(&backend).await;
        let canvas = Size::new(960.0, 540.0);
        let scaler = Scaler::for_canvas(canvas);

        // nose sits at (500, 100) reference pixels = (250, 50) on screen.
        session.set_tool(Tool::Objects);
        assert!(!session.pointer_down(Point::new(250.0, 50.0), &scaler));
        session.set_tool(Tool::Pose);
        assert!(!session.pointer_down(Point::new(0.0, 0.0), &scaler));
        assert!(session.pointer_down(Point::new(250.0, 50.0), &scaler));
        assert_eq!(session.dragging(), Some("nose"));

        let moved = session.pointer_move(Point::new(300.0, 60.0), &scaler).unwrap().unwrap();
        assert_eq!(moved.space(), SourceSpace::Pixels);
        assert_eq!(moved, SourcePoint::Pixels { x: 600.0, y: 120.0 });
        assert!(session.is_dirty());

        let (name, end) = session.pointer_up().unwrap();
        assert_eq!(name, "nose");
        assert_eq!(end, moved);
        assert_eq!(session.dragging(), None);
        assert_eq!(
            session.document().get_pose(0).unwrap().get("nose").unwrap().position,
            moved
        );
        assert_eq!(session.pointer_move(Point::new(1.0, 1.0), &scaler), Ok(None));
    }
}
