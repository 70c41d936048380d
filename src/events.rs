//! Message types flowing between the edit session and its worker tasks.

use serde_json::{Map, Value, json};

use crate::adjustments::Crop;
use crate::engine::Tier;
use crate::store::RenderSlot;

/// Which logical image a request renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Original,
    Edited,
    UncroppedEdited,
}

/// One coalescable unit of decode work. Ephemeral: created per edit or
/// viewport tick, consumed once by the scheduler, superseded freely.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub version: u64,
    pub edit_json: String,
    pub target: RenderTarget,
    pub rotation_degrees: f32,
    pub roi: Option<Crop>,
}

impl RenderRequest {
    /// Display slot the result lands in. A region-of-interest render of the
    /// edited image has its own slot so it never races the full frame.
    pub fn slot(&self) -> RenderSlot {
        match (self.target, self.roi.is_some()) {
            (RenderTarget::Edited, true) => RenderSlot::EditedViewport,
            (RenderTarget::Edited, false) => RenderSlot::Edited,
            (RenderTarget::Original, _) => RenderSlot::Original,
            (RenderTarget::UncroppedEdited, _) => RenderSlot::UncroppedEdited,
        }
    }

    pub fn is_viewport(&self) -> bool {
        self.roi.is_some()
    }
}

/// Snapshot of the serialized edit state, published by the session so the
/// viewport task can stamp out requests without touching session state.
#[derive(Debug, Clone, Default)]
pub struct RenderDocument {
    pub fields: Map<String, Value>,
    pub rotation_degrees: f32,
}

impl RenderDocument {
    /// Serializes the document, optionally with the zoomed-preview block the
    /// engine expects for region-of-interest renders.
    pub fn to_json(&self, preview: Option<(&Crop, u32)>) -> String {
        let mut fields = self.fields.clone();
        if let Some((roi, max_dimension)) = preview {
            fields.insert(
                "preview".into(),
                json!({
                    "useZoom": true,
                    "roi": roi,
                    "maxDimension": max_dimension,
                }),
            );
        }
        Value::Object(fields).to_string()
    }
}

/// Visible region while zoomed in, paired with the scale that produced it.
/// The debounce in the viewport task keys on equality of this pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRoi {
    pub roi: Crop,
    pub scale: f32,
}

/// Emitted by the scheduler after a frame is accepted into the store.
#[derive(Debug, Clone, Copy)]
pub struct FrameReady {
    pub slot: RenderSlot,
    pub stamp: i64,
    pub tier: Tier,
}

/// User-visible render state; carried on a watch channel. The error is set
/// only by an authoritative decode failure and cleared by the next accepted
/// edited frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStatus {
    pub error: Option<String>,
}

/// Debounced adjustments save, conflated on a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub project_id: String,
    pub json: String,
}

/// Work for the storage task. Kept off the decode worker's queue entirely.
#[derive(Debug)]
pub enum StorageJob {
    /// Re-encode an accepted full-quality frame into a bounded thumbnail
    /// and persist it.
    Thumbnail {
        project_id: String,
        frame: Vec<u8>,
    },
}
