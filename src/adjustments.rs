use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Width/height below this are treated as "no crop".
pub const CROP_EPSILON: f32 = 1e-4;

/// Normalized crop rectangle over the oriented working frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Crop {
    pub const FULL: Crop = Crop {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= CROP_EPSILON || self.height <= CROP_EPSILON
    }

    /// Clips into the unit square and collapses degenerate extents to the
    /// full frame. Idempotent.
    pub fn normalized(&self) -> Crop {
        if self.is_degenerate() {
            return Crop::FULL;
        }
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        let width = self.width.min(1.0 - x);
        let height = self.height.min(1.0 - y);
        let out = Crop {
            x,
            y,
            width,
            height,
        };
        if out.is_degenerate() { Crop::FULL } else { out }
    }
}

/// Scalar tone/color parameters plus the geometry fields, in the field names
/// the decode engine understands. The crate serializes these verbatim; the
/// actual adjustment math lives in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Adjustments {
    pub exposure: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,
    pub saturation: f32,
    pub temperature: f32,
    pub tint: f32,
    pub vibrance: f32,
    pub clarity: f32,
    pub dehaze: f32,
    pub structure: f32,
    pub sharpness: f32,
    pub luma_noise_reduction: f32,
    pub color_noise_reduction: f32,
    pub chromatic_aberration: f32,
    pub vignette_amount: f32,
    pub vignette_midpoint: f32,
    pub vignette_roundness: f32,
    pub vignette_feather: f32,
    pub grain_amount: f32,
    pub tone_mapper: String,

    // Opaque data blocks: carried through to the engine untouched.
    pub curves: Value,
    pub hsl: Value,
    pub color_grading: Value,

    // Geometry.
    pub rotation: f32,
    pub orientation_steps: i32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f32>,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            highlights: 0.0,
            shadows: 0.0,
            whites: 0.0,
            blacks: 0.0,
            saturation: 0.0,
            temperature: 0.0,
            tint: 0.0,
            vibrance: 0.0,
            clarity: 0.0,
            dehaze: 0.0,
            structure: 0.0,
            sharpness: 0.0,
            luma_noise_reduction: 0.0,
            color_noise_reduction: 0.0,
            chromatic_aberration: 0.0,
            vignette_amount: 0.0,
            vignette_midpoint: 0.5,
            vignette_roundness: 0.0,
            vignette_feather: 0.5,
            grain_amount: 0.0,
            tone_mapper: String::from("basic"),
            curves: Value::Null,
            hsl: Value::Null,
            color_grading: Value::Null,
            rotation: 0.0,
            orientation_steps: 0,
            flip_horizontal: false,
            flip_vertical: false,
            crop: None,
            aspect_ratio: None,
        }
    }
}

impl Adjustments {
    /// Effective crop: normalized, with "none" meaning the full frame.
    pub fn effective_crop(&self) -> Crop {
        self.crop.map(|c| c.normalized()).unwrap_or(Crop::FULL)
    }
}
