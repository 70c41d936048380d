//! Mask model and its wire shape. Submasks serialize as
//! `{id, type, mode, visible, parameters: {...}}` to match the decode
//! engine's document format; raster masks travel as base64 PNG data URLs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adjustments::Adjustments;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_pressure")]
    pub pressure: f32,
}

fn default_pressure() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushTool {
    Brush,
    Eraser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushLine {
    pub tool: BrushTool,
    pub brush_size: f32,
    pub feather: f32,
    /// Stroke z-order; assigned from a session-wide monotonic counter.
    pub order: u64,
    pub points: Vec<MaskPoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    #[default]
    Additive,
    Subtractive,
}

/// Continuous-tone alpha mask, kept with the pixel dimensions of the image
/// it was generated against.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMask {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "camelCase")]
pub enum SubMaskKind {
    #[serde(rename_all = "camelCase")]
    Brush { lines: Vec<BrushLine> },
    #[serde(rename_all = "camelCase")]
    Linear {
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
        range: f32,
    },
    #[serde(rename_all = "camelCase")]
    Radial {
        center_x: f32,
        center_y: f32,
        radius_x: f32,
        radius_y: f32,
        rotation: f32,
        feather: f32,
    },
    #[serde(rename_all = "camelCase")]
    AiSubject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask_data_base64: Option<String>,
        #[serde(default)]
        mask_width: u32,
        #[serde(default)]
        mask_height: u32,
        #[serde(default)]
        softness: f32,
    },
    #[serde(rename_all = "camelCase")]
    AiEnvironment {
        #[serde(default)]
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask_data_base64: Option<String>,
        #[serde(default)]
        mask_width: u32,
        #[serde(default)]
        mask_height: u32,
        #[serde(default)]
        softness: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubMask {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub mode: MaskMode,
    #[serde(flatten)]
    pub kind: SubMaskKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mask {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub adjustments: Adjustments,
    #[serde(default)]
    pub sub_masks: Vec<SubMask>,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f32 {
    100.0
}

impl Mask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            visible: true,
            invert: false,
            opacity: 100.0,
            adjustments: Adjustments::default(),
            sub_masks: Vec::new(),
        }
    }
}

impl SubMask {
    pub fn new(kind: SubMaskKind) -> Self {
        Self {
            id: new_id(),
            visible: true,
            mode: MaskMode::Additive,
            kind,
        }
    }

    /// Decoded raster, if this submask carries one.
    pub fn raster(&self) -> Option<RasterMask> {
        let (data, w, h) = match &self.kind {
            SubMaskKind::AiSubject {
                mask_data_base64,
                mask_width,
                mask_height,
                ..
            }
            | SubMaskKind::AiEnvironment {
                mask_data_base64,
                mask_width,
                mask_height,
                ..
            } => (mask_data_base64.as_deref()?, *mask_width, *mask_height),
            _ => return None,
        };
        let encoded = data.strip_prefix(DATA_URL_PREFIX).unwrap_or(data);
        let png = BASE64.decode(encoded).ok()?;
        Some(RasterMask {
            png,
            width: w,
            height: h,
        })
    }

    /// Replaces (or clears) the raster on an AI submask; no-op for the
    /// geometric variants.
    pub fn set_raster(&mut self, raster: Option<RasterMask>) {
        if let SubMaskKind::AiSubject {
            mask_data_base64,
            mask_width,
            mask_height,
            ..
        }
        | SubMaskKind::AiEnvironment {
            mask_data_base64,
            mask_width,
            mask_height,
            ..
        } = &mut self.kind
        {
            match raster {
                Some(r) => {
                    *mask_data_base64 = Some(format!("{DATA_URL_PREFIX}{}", BASE64.encode(&r.png)));
                    *mask_width = r.width;
                    *mask_height = r.height;
                }
                None => {
                    *mask_data_base64 = None;
                    *mask_width = 0;
                    *mask_height = 0;
                }
            }
        }
    }
}

/// Fixes up masks loaded from a persisted document: blank ids (from older or
/// hand-edited documents) are regenerated.
pub fn regenerate_blank_ids(masks: &mut [Mask]) {
    for mask in masks {
        if mask.id.is_empty() {
            mask.id = new_id();
        }
        for sub in &mut mask.sub_masks {
            if sub.id.is_empty() {
                sub.id = new_id();
            }
        }
    }
}

/// Highest brush stroke order across all masks; used to reseed the session
/// stroke counter at project open.
pub fn max_stroke_order(masks: &[Mask]) -> u64 {
    masks
        .iter()
        .flat_map(|m| &m.sub_masks)
        .filter_map(|s| match &s.kind {
            SubMaskKind::Brush { lines } => lines.iter().map(|l| l.order).max(),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}
