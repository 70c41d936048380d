//! Remaps mask geometry between two crop/rotation/flip/orientation spaces so
//! strokes and gradients keep covering the same physical image content.
//!
//! Points travel through normalized coordinates; rasters go through the same
//! transform sequence at pixel granularity. The common ground for both is the
//! working image with zero orientation steps applied ("canonical" below).

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use tracing::debug;

use crate::adjustments::{Adjustments, Crop};
use crate::masks::{Mask, MaskPoint, RasterMask, SubMaskKind};

/// Output coordinates are clamped here rather than to [0,1]: a stroke that
/// straddled the old crop edge survives instead of collapsing onto it.
pub const POINT_CLAMP_MIN: f32 = -1.0;
pub const POINT_CLAMP_MAX: f32 = 2.0;

const DIVIDE_EPSILON: f32 = 1e-4;

/// The geometry fields of an [`Adjustments`], normalized for comparison:
/// crop clipped (absent/degenerate means full frame), orientation reduced
/// mod 4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub crop: Crop,
    pub rotation: f32,
    pub orientation_steps: i32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Geometry {
    pub fn of(adjustments: &Adjustments) -> Self {
        Self {
            crop: adjustments.effective_crop(),
            rotation: adjustments.rotation,
            orientation_steps: adjustments.orientation_steps.rem_euclid(4),
            flip_horizontal: adjustments.flip_horizontal,
            flip_vertical: adjustments.flip_vertical,
        }
    }

    /// Pixel dimensions of the oriented frame, given the canonical working
    /// dimensions. Odd orientation steps swap the axes.
    fn oriented_dims(&self, base_width: u32, base_height: u32) -> (f32, f32) {
        if self.orientation_steps % 2 == 1 {
            (base_height as f32, base_width as f32)
        } else {
            (base_width as f32, base_height as f32)
        }
    }
}

fn orient_forward(x: f32, y: f32, steps: i32) -> (f32, f32) {
    match steps.rem_euclid(4) {
        1 => (1.0 - y, x),
        2 => (1.0 - x, 1.0 - y),
        3 => (y, 1.0 - x),
        _ => (x, y),
    }
}

fn orient_inverse(x: f32, y: f32, steps: i32) -> (f32, f32) {
    orient_forward(x, y, 4 - steps.rem_euclid(4))
}

/// Rotates a normalized point about the frame center, correcting for the
/// frame's pixel aspect so the rotation is circular in image space.
fn rotate_about_center(x: f32, y: f32, degrees: f32, width: f32, height: f32) -> (f32, f32) {
    if degrees == 0.0 {
        return (x, y);
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = (width * 0.5, height * 0.5);
    let dx = x * width - cx;
    let dy = y * height - cy;
    (
        (cx + dx * cos - dy * sin) / width,
        (cy + dx * sin + dy * cos) / height,
    )
}

/// Remaps one normalized point from `old` geometry space to `new` geometry
/// space. `base_width`/`base_height` are the pixel dimensions of the
/// canonical working image.
pub fn remap_point(
    x: f32,
    y: f32,
    old: &Geometry,
    new: &Geometry,
    base_width: u32,
    base_height: u32,
) -> (f32, f32) {
    if old == new {
        return (x, y);
    }

    // Lift from crop-relative to the old oriented frame.
    let mut px = old.crop.x + x * old.crop.width;
    let mut py = old.crop.y + y * old.crop.height;

    let (old_w, old_h) = old.oriented_dims(base_width, base_height);
    (px, py) = rotate_about_center(px, py, -old.rotation, old_w, old_h);
    if old.flip_horizontal {
        px = 1.0 - px;
    }
    if old.flip_vertical {
        py = 1.0 - py;
    }
    (px, py) = orient_inverse(px, py, old.orientation_steps);

    // Canonical space; now forward into the new frame.
    (px, py) = orient_forward(px, py, new.orientation_steps);
    if new.flip_horizontal {
        px = 1.0 - px;
    }
    if new.flip_vertical {
        py = 1.0 - py;
    }
    let (new_w, new_h) = new.oriented_dims(base_width, base_height);
    (px, py) = rotate_about_center(px, py, new.rotation, new_w, new_h);

    if new.crop.width > DIVIDE_EPSILON && new.crop.height > DIVIDE_EPSILON {
        px = (px - new.crop.x) / new.crop.width;
        py = (py - new.crop.y) / new.crop.height;
    }

    (
        px.clamp(POINT_CLAMP_MIN, POINT_CLAMP_MAX),
        py.clamp(POINT_CLAMP_MIN, POINT_CLAMP_MAX),
    )
}

/// Remaps every submask of every mask in place. Raster remap failure leaves
/// the affected raster unset; points are always kept (clamped). No-op when
/// the two geometries are equal.
pub fn remap_masks(
    masks: &mut [Mask],
    old: &Geometry,
    new: &Geometry,
    base_width: u32,
    base_height: u32,
) {
    if old == new {
        return;
    }
    let map = |x: f32, y: f32| remap_point(x, y, old, new, base_width, base_height);
    for mask in masks {
        for sub in &mut mask.sub_masks {
            match &mut sub.kind {
                SubMaskKind::Brush { lines } => {
                    for line in lines {
                        for MaskPoint { x, y, .. } in &mut line.points {
                            (*x, *y) = map(*x, *y);
                        }
                    }
                }
                SubMaskKind::Linear {
                    start_x,
                    start_y,
                    end_x,
                    end_y,
                    ..
                } => {
                    (*start_x, *start_y) = map(*start_x, *start_y);
                    (*end_x, *end_y) = map(*end_x, *end_y);
                }
                SubMaskKind::Radial {
                    center_x, center_y, ..
                } => {
                    (*center_x, *center_y) = map(*center_x, *center_y);
                }
                SubMaskKind::AiSubject { .. } | SubMaskKind::AiEnvironment { .. } => {
                    let remapped = sub
                        .raster()
                        .and_then(|r| remap_raster(&r, old, new, base_width, base_height));
                    if remapped.is_none() && sub.raster().is_some() {
                        debug!(submask = %sub.id, "raster remap failed, clearing raster");
                    }
                    sub.set_raster(remapped);
                }
            }
        }
    }
}

/// Pixel-space counterpart of [`remap_point`]: composite the stored raster
/// into the old oriented frame, walk back to canonical orientation, then
/// forward into the new frame and crop. `None` on a degenerate old crop or
/// an undecodable raster.
pub fn remap_raster(
    raster: &RasterMask,
    old: &Geometry,
    new: &Geometry,
    base_width: u32,
    base_height: u32,
) -> Option<RasterMask> {
    let decoded = image::load_from_memory_with_format(&raster.png, ImageFormat::Png)
        .ok()?
        .to_luma8();

    let (old_w, old_h) = old.oriented_dims(base_width, base_height);
    let (crop_x, crop_y, crop_w, crop_h) = crop_pixels(&old.crop, old_w, old_h);
    if crop_w < 1 || crop_h < 1 {
        return None;
    }

    let mut canvas = GrayImage::new(old_w as u32, old_h as u32);
    let resized = imageops::resize(&decoded, crop_w, crop_h, FilterType::Triangle);
    imageops::overlay(&mut canvas, &resized, crop_x as i64, crop_y as i64);

    canvas = rotate_gray(&canvas, -old.rotation);
    if old.flip_horizontal {
        canvas = imageops::flip_horizontal(&canvas);
    }
    if old.flip_vertical {
        canvas = imageops::flip_vertical(&canvas);
    }
    canvas = orient_image(canvas, 4 - old.orientation_steps.rem_euclid(4));

    canvas = orient_image(canvas, new.orientation_steps);
    if new.flip_horizontal {
        canvas = imageops::flip_horizontal(&canvas);
    }
    if new.flip_vertical {
        canvas = imageops::flip_vertical(&canvas);
    }
    canvas = rotate_gray(&canvas, new.rotation);

    let (new_w, new_h) = new.oriented_dims(base_width, base_height);
    let (nx, ny, nw, nh) = crop_pixels(&new.crop, new_w, new_h);
    if nw < 1 || nh < 1 {
        return None;
    }
    let cropped = imageops::crop_imm(&canvas, nx, ny, nw, nh).to_image();

    let mut png = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .ok()?;
    Some(RasterMask {
        png,
        width: nw,
        height: nh,
    })
}

fn crop_pixels(crop: &Crop, frame_w: f32, frame_h: f32) -> (u32, u32, u32, u32) {
    let x = (crop.x * frame_w).round().clamp(0.0, frame_w) as u32;
    let y = (crop.y * frame_h).round().clamp(0.0, frame_h) as u32;
    let w = (crop.width * frame_w).round() as u32;
    let h = (crop.height * frame_h).round() as u32;
    let w = w.min(frame_w as u32 - x.min(frame_w as u32));
    let h = h.min(frame_h as u32 - y.min(frame_h as u32));
    (x, y, w, h)
}

fn orient_image(img: GrayImage, steps: i32) -> GrayImage {
    match steps.rem_euclid(4) {
        1 => imageops::rotate90(&img),
        2 => imageops::rotate180(&img),
        3 => imageops::rotate270(&img),
        _ => img,
    }
}

/// Same-size fine rotation about the image center, sampling the source with
/// inverse-mapped bilinear interpolation. Out-of-frame samples read as zero.
fn rotate_gray(img: &GrayImage, degrees: f32) -> GrayImage {
    if degrees.abs() < 1e-3 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = w as f32 * 0.5;
    let cy = h as f32 * 0.5;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let sx = cx + dx * cos + dy * sin - 0.5;
            let sy = cy - dx * sin + dy * cos - 0.5;
            out.put_pixel(x, y, Luma([sample_bilinear(img, sx, sy)]));
        }
    }
    out
}

fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (w, h) = img.dimensions();
    if x < -1.0 || y < -1.0 || x > w as f32 || y > h as f32 {
        return 0;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let at = |ix: f32, iy: f32| -> f32 {
        if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
            0.0
        } else {
            img.get_pixel(ix as u32, iy as u32).0[0] as f32
        }
    };
    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1.0, y0) * fx;
    let bottom = at(x0, y0 + 1.0) * (1.0 - fx) + at(x0 + 1.0, y0 + 1.0) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}
