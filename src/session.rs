//! The producer side of the pipeline: owns the live edit state, applies
//! user edits, remaps mask geometry when the transform changes, records
//! history, and conflates render requests toward the decode worker.
//!
//! Everything here runs in one context; workers only ever see serialized
//! snapshots and the atomic counters in the store.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::adjustments::Adjustments;
use crate::config::Config;
use crate::events::{RenderDocument, RenderRequest, RenderTarget, SaveRequest, ViewportRoi};
use crate::geometry::{self, Geometry};
use crate::history::{EditHistory, HistoryEntry};
use crate::masks::{self, Mask};
use crate::store::RenderTargetStore;
use crate::viewport::{self, ViewportGate, ViewportTransform};

/// Sender halves owned by the session; the receiving halves go to the
/// worker tasks. The request slot is shared with the viewport task, which
/// issues its own debounced requests.
pub struct SessionChannels {
    pub requests: Arc<watch::Sender<Option<RenderRequest>>>,
    pub document: watch::Sender<RenderDocument>,
    pub viewport: watch::Sender<Option<ViewportRoi>>,
    pub saves: watch::Sender<Option<SaveRequest>>,
}

/// Persisted project document: the adjustments fields at the top level plus
/// the mask list, parsed leniently so older documents still open.
#[derive(Debug, Default, Deserialize)]
struct PersistedDocument {
    #[serde(flatten)]
    adjustments: Adjustments,
    #[serde(default)]
    masks: Vec<Mask>,
}

pub struct EditSession {
    project_id: String,
    base_width: u32,
    base_height: u32,
    adjustments: Adjustments,
    masks: Vec<Mask>,
    history: EditHistory,
    /// Set while an undo/redo entry is being applied so the apply itself
    /// never records a new entry.
    restoring: bool,
    stroke_order: u64,
    crop_mode: bool,
    comparing: bool,
    current_viewport: Option<ViewportRoi>,
    config: Arc<Config>,
    store: Arc<RenderTargetStore>,
    gate: Arc<ViewportGate>,
    channels: SessionChannels,
}

impl EditSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: impl Into<String>,
        base_width: u32,
        base_height: u32,
        saved_document: Option<&str>,
        config: Arc<Config>,
        store: Arc<RenderTargetStore>,
        gate: Arc<ViewportGate>,
        channels: SessionChannels,
    ) -> Self {
        let loaded = saved_document
            .map(|json| match serde_json::from_str::<PersistedDocument>(json) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(%err, "persisted document unreadable, starting fresh");
                    PersistedDocument::default()
                }
            })
            .unwrap_or_default();

        let mut masks = loaded.masks;
        masks::regenerate_blank_ids(&mut masks);
        let stroke_order = masks::max_stroke_order(&masks);

        let mut session = Self {
            project_id: project_id.into(),
            base_width,
            base_height,
            adjustments: loaded.adjustments,
            masks,
            history: EditHistory::new(),
            restoring: false,
            stroke_order,
            crop_mode: false,
            comparing: false,
            current_viewport: None,
            config,
            store,
            gate,
            channels,
        };
        session.history.seed(session.snapshot());
        session
    }

    pub fn adjustments(&self) -> &Adjustments {
        &self.adjustments
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Next brush stroke z-order. Seeded above the highest persisted order
    /// so reopened projects keep stacking correctly.
    pub fn next_stroke_order(&mut self) -> u64 {
        self.stroke_order += 1;
        self.stroke_order
    }

    /// Publishes the current document and kicks off an initial render.
    /// Call once after the worker tasks are wired up.
    pub fn refresh(&mut self) {
        self.publish_document();
        self.enqueue_edited();
    }

    /// Applies one discrete edit to the adjustments. If the edit changed
    /// crop/rotation/flip/orientation, every mask is remapped to keep
    /// covering the same image content before anything renders.
    pub fn update_adjustments(&mut self, edit: impl FnOnce(&mut Adjustments)) {
        let old_geometry = Geometry::of(&self.adjustments);
        edit(&mut self.adjustments);
        let new_geometry = Geometry::of(&self.adjustments);
        if old_geometry != new_geometry {
            debug!(?new_geometry, "geometry changed, remapping masks");
            geometry::remap_masks(
                &mut self.masks,
                &old_geometry,
                &new_geometry,
                self.base_width,
                self.base_height,
            );
        }
        self.commit();
    }

    pub fn set_masks(&mut self, masks: Vec<Mask>) {
        self.masks = masks;
        self.commit();
    }

    /// Opens an interaction bracket (slider drag, brush stroke, crop handle
    /// drag): intermediate states render but are not individually recorded.
    pub fn begin_interaction(&mut self) {
        self.history.begin_interaction();
    }

    pub fn end_interaction(&mut self) {
        let entry = self.snapshot();
        self.history.end_interaction(entry);
    }

    pub fn undo(&mut self) {
        if let Some(entry) = self.history.undo().cloned() {
            self.apply_entry(entry);
        }
    }

    pub fn redo(&mut self) {
        if let Some(entry) = self.history.redo().cloned() {
            self.apply_entry(entry);
        }
    }

    /// While held, the original (unedited) image is rendered for
    /// side-by-side comparison; releasing re-renders the edited image.
    pub fn set_comparing(&mut self, active: bool) {
        if self.comparing == active {
            return;
        }
        self.comparing = active;
        self.gate.comparing.store(active, Ordering::Release);
        if active {
            let doc = document_for(&Adjustments::default(), &[]);
            self.enqueue(RenderTarget::Original, &doc, None);
        } else {
            self.enqueue_edited();
        }
    }

    /// Crop mode renders the uncropped working image so the user can see
    /// what they are cropping away.
    pub fn set_crop_mode(&mut self, active: bool) {
        if self.crop_mode == active {
            return;
        }
        self.crop_mode = active;
        self.gate.crop_mode.store(active, Ordering::Release);
        if active {
            let mut uncropped = self.adjustments.clone();
            uncropped.crop = None;
            let doc = document_for(&uncropped, &self.masks);
            self.enqueue(RenderTarget::UncroppedEdited, &doc, None);
        } else {
            self.enqueue_edited();
        }
    }

    pub fn set_mask_drag(&mut self, active: bool) {
        self.gate.mask_drag.store(active, Ordering::Release);
    }

    /// Feeds the current pan/zoom gesture state. The computed visible
    /// region is conflated toward the viewport task, which debounces it.
    pub fn update_viewport(&mut self, transform: &ViewportTransform) {
        if self.gate.suppressed() {
            return;
        }
        let roi = viewport::visible_roi(transform, &self.config.viewport).map(|roi| ViewportRoi {
            roi,
            scale: transform.scale,
        });
        self.current_viewport = roi;
        self.channels.viewport.send_if_modified(|current| {
            if *current == roi {
                false
            } else {
                *current = roi;
                true
            }
        });
    }

    fn snapshot(&self) -> HistoryEntry {
        HistoryEntry {
            adjustments: self.adjustments.clone(),
            masks: self.masks.clone(),
        }
    }

    fn apply_entry(&mut self, entry: HistoryEntry) {
        self.restoring = true;
        self.adjustments = entry.adjustments;
        self.masks = entry.masks;
        self.commit();
        self.restoring = false;
    }

    fn commit(&mut self) {
        if !self.restoring {
            let entry = self.snapshot();
            self.history.push(entry);
        }
        self.publish_document();
        self.enqueue_edited();
    }

    fn publish_document(&self) {
        let doc = document_for(&self.adjustments, &self.masks);
        self.channels.saves.send_replace(Some(SaveRequest {
            project_id: self.project_id.clone(),
            json: doc.to_json(None),
        }));
        self.channels.document.send_replace(doc);
    }

    fn enqueue_edited(&mut self) {
        if self.crop_mode {
            let mut uncropped = self.adjustments.clone();
            uncropped.crop = None;
            let doc = document_for(&uncropped, &self.masks);
            self.enqueue(RenderTarget::UncroppedEdited, &doc, None);
            return;
        }
        let doc = document_for(&self.adjustments, &self.masks);
        match self.current_viewport {
            // Zoomed in: only the visible region re-renders; the stale full
            // frame is flagged for the eventual zoom-out.
            Some(vp) if !self.gate.suppressed() => {
                let max_dimension = viewport::zoom_max_dimension(vp.scale, &self.config.viewport);
                self.gate.mark_full_frame_dirty();
                self.enqueue(RenderTarget::Edited, &doc, Some((vp.roi, max_dimension)));
            }
            _ => self.enqueue(RenderTarget::Edited, &doc, None),
        }
    }

    fn enqueue(
        &self,
        target: RenderTarget,
        doc: &RenderDocument,
        preview: Option<(crate::adjustments::Crop, u32)>,
    ) {
        let version = self.store.next_version();
        let edit_json = doc.to_json(preview.as_ref().map(|(roi, dim)| (roi, *dim)));
        let request = RenderRequest {
            version,
            edit_json,
            target,
            rotation_degrees: doc.rotation_degrees,
            roi: preview.map(|(roi, _)| roi),
        };
        debug!(version, ?target, viewport = request.is_viewport(), "enqueue render");
        self.channels.requests.send_replace(Some(request));
    }
}

/// Builds the engine document for a given state: all adjustment fields at
/// the top level plus the mask list.
fn document_for(adjustments: &Adjustments, masks: &[Mask]) -> RenderDocument {
    let mut fields = match serde_json::to_value(adjustments) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Ok(mask_values) = serde_json::to_value(masks) {
        fields.insert("masks".into(), mask_values);
    }
    RenderDocument {
        fields,
        rotation_degrees: adjustments.rotation,
    }
}
