//! Viewport math for the zoomed region-of-interest render path, plus the
//! shared gate that suppresses it during crop mode, compare, and mask drags.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::adjustments::Crop;
use crate::config::ViewportOptions;

/// A computed region covering at least this fraction of the frame in either
/// axis is treated as "not really zoomed in".
const COVERAGE_LIMIT: f32 = 0.999;
/// Below this extent the region is numerically degenerate; fall back to the
/// full frame rather than render a sliver.
const MIN_EXTENT: f32 = 0.0005;

/// Where the user's pan/zoom gesture currently has the image, in container
/// pixels. `offset_*` translate the scaled content relative to centered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub container_width: f32,
    pub container_height: f32,
    pub content_width: f32,
    pub content_height: f32,
}

/// Visible region of the working image in normalized coordinates, or `None`
/// when the zoom level does not warrant a dedicated region render.
pub fn visible_roi(t: &ViewportTransform, options: &ViewportOptions) -> Option<Crop> {
    if t.scale <= options.zoom_threshold {
        return None;
    }
    if t.container_width <= 0.0
        || t.container_height <= 0.0
        || t.content_width <= 0.0
        || t.content_height <= 0.0
    {
        return None;
    }

    // Content is displayed fit-inside the container, then scaled by the
    // gesture about the container center.
    let fit = (t.container_width / t.content_width).min(t.container_height / t.content_height);
    let shown_width = t.content_width * fit * t.scale;
    let shown_height = t.content_height * fit * t.scale;

    let visible_w = (t.container_width / shown_width).min(1.0);
    let visible_h = (t.container_height / shown_height).min(1.0);
    if visible_w >= COVERAGE_LIMIT || visible_h >= COVERAGE_LIMIT {
        return None;
    }
    if visible_w <= MIN_EXTENT || visible_h <= MIN_EXTENT {
        return None;
    }

    let center_x = 0.5 - t.offset_x / shown_width;
    let center_y = 0.5 - t.offset_y / shown_height;
    let x = (center_x - visible_w * 0.5).clamp(0.0, 1.0 - visible_w);
    let y = (center_y - visible_h * 0.5).clamp(0.0, 1.0 - visible_h);
    Some(Crop::new(x, y, visible_w, visible_h))
}

/// Output resolution for a region render: linear in scale between the
/// configured bounds, floored to the configured step.
pub fn zoom_max_dimension(scale: f32, options: &ViewportOptions) -> u32 {
    let span = options.zoom_max_scale - options.zoom_threshold;
    let t = if span > 0.0 {
        ((scale - options.zoom_threshold) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let raw = options.min_dimension as f32
        + t * (options.max_dimension - options.min_dimension) as f32;
    let stepped = (raw.round() as u32 / options.dimension_step) * options.dimension_step;
    stepped.clamp(options.min_dimension, options.max_dimension)
}

/// Cross-task flags that pause the viewport render path. All mutation comes
/// from the session; the viewport task only reads (and consumes the dirty
/// flag on zoom-out).
#[derive(Debug, Default)]
pub struct ViewportGate {
    pub crop_mode: AtomicBool,
    pub comparing: AtomicBool,
    pub mask_drag: AtomicBool,
    /// Set when an edit was rendered only at the viewport region, leaving
    /// the full-frame preview stale.
    pub full_frame_dirty: AtomicBool,
}

impl ViewportGate {
    pub fn suppressed(&self) -> bool {
        self.crop_mode.load(Ordering::Acquire)
            || self.comparing.load(Ordering::Acquire)
            || self.mask_drag.load(Ordering::Acquire)
    }

    pub fn mark_full_frame_dirty(&self) {
        self.full_frame_dirty.store(true, Ordering::Release);
    }

    /// Reads and clears the dirty flag in one step.
    pub fn take_full_frame_dirty(&self) -> bool {
        self.full_frame_dirty.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ViewportOptions {
        ViewportOptions::default()
    }

    fn transform(scale: f32) -> ViewportTransform {
        ViewportTransform {
            scale,
            offset_x: 0.0,
            offset_y: 0.0,
            container_width: 1000.0,
            container_height: 800.0,
            content_width: 4000.0,
            content_height: 3000.0,
        }
    }

    #[test]
    fn no_roi_at_or_below_threshold() {
        assert!(visible_roi(&transform(1.0), &options()).is_none());
        assert!(visible_roi(&transform(1.1), &options()).is_none());
    }

    #[test]
    fn centered_zoom_yields_centered_roi() {
        let roi = visible_roi(&transform(4.0), &options()).unwrap();
        assert!((roi.x + roi.width * 0.5 - 0.5).abs() < 1e-5);
        assert!((roi.y + roi.height * 0.5 - 0.5).abs() < 1e-5);
        assert!(roi.width < 1.0 && roi.height < 1.0);
    }

    #[test]
    fn near_full_coverage_falls_back_to_full_frame() {
        // Barely over the threshold: the frame still fills the view in one
        // axis, so a region render buys nothing.
        let mut t = transform(1.11);
        t.container_height = 750.0; // content exactly fits: 4000x3000 -> 1000x750
        assert!(visible_roi(&t, &options()).is_none());
    }

    #[test]
    fn pan_shifts_and_clamps_the_roi() {
        let mut t = transform(4.0);
        t.offset_x = -1e9; // fling far right
        let roi = visible_roi(&t, &options()).unwrap();
        assert!((roi.x + roi.width - 1.0).abs() < 1e-5);
    }

    #[test]
    fn resolution_ramp_endpoints_and_step() {
        let o = options();
        assert_eq!(zoom_max_dimension(1.1, &o), 1280);
        assert_eq!(zoom_max_dimension(0.5, &o), 1280);
        assert_eq!(zoom_max_dimension(5.0, &o), 2304);
        assert_eq!(zoom_max_dimension(50.0, &o), 2304);
        // midpoint of the ramp: 1792 is already a multiple of 128
        assert_eq!(zoom_max_dimension(3.05, &o), 1792);
        // everything lands on the step grid
        for i in 0..40 {
            let scale = 1.1 + i as f32 * 0.1;
            assert_eq!(zoom_max_dimension(scale, &o) % 128, 0);
        }
    }

    #[test]
    fn gate_suppression_and_dirty_flag() {
        let gate = ViewportGate::default();
        assert!(!gate.suppressed());
        gate.mask_drag.store(true, Ordering::Release);
        assert!(gate.suppressed());
        gate.mask_drag.store(false, Ordering::Release);

        gate.mark_full_frame_dirty();
        assert!(gate.take_full_frame_dirty());
        assert!(!gate.take_full_frame_dirty());
    }
}
