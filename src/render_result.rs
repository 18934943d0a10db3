//! The addressable destination image that a full-frame or interval pass renders into, and the
//! logic to patch a smaller interval result into a larger full-frame one.

use std::sync::Arc;

use glam::Affine3A;
use parking_lot::Mutex;

use crate::geometry::CanvasRect;

/// A plain packed-ARGB image buffer. Pixel storage only; no codec or color-space logic lives
/// here (out of scope per `spec.md` Non-goals).
#[derive(Clone, Debug)]
pub struct ArgbImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u32>,
}

impl ArgbImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn set(&mut self, x: u32, y: u32, v: u32) {
        self.pixels[(y * self.width + x) as usize] = v;
    }
}

/// A rendered image at a given [`crate::screen_scale::ScreenScale`], plus the viewer transform
/// it was produced from.
///
/// Either the published full-frame result (covering the whole canvas) or a smaller interval
/// result, later patched into the full-frame one by [`Self::patch`].
///
/// The image is behind `Arc<Mutex<_>>` rather than owned outright, because a
/// [`crate::projector::VolatileProjector`] needs a handle to the same buffer across possibly
/// several `map()` calls (retries of the same pass) before the renderer reads it back out.
pub struct RenderResult {
    image: Arc<Mutex<ArgbImage>>,
    pub scale_factor: f64,
    pub viewer_transform: Affine3A,
    updated: bool,
}

impl RenderResult {
    pub fn new(width: u32, height: u32, scale_factor: f64, viewer_transform: Affine3A) -> Self {
        Self {
            image: Arc::new(Mutex::new(ArgbImage::new(width, height))),
            scale_factor,
            viewer_transform,
            updated: false,
        }
    }

    /// A shared handle to this result's image, to hand to a
    /// [`crate::projector::ProjectorFactory`] as its render destination.
    pub fn image_handle(&self) -> Arc<Mutex<ArgbImage>> {
        Arc::clone(&self.image)
    }

    /// A new `RenderResult` sharing this one's backing image buffer.
    ///
    /// Used to keep a display-facing copy and a renderer-held copy of the same in-flight result
    /// in sync: patching either one mutates the same pixels, and each copy tracks `updated`
    /// independently (the renderer and the display have different reasons to ask "did this
    /// change since I last looked").
    pub fn shallow_clone(&self) -> Self {
        Self {
            image: Arc::clone(&self.image),
            scale_factor: self.scale_factor,
            viewer_transform: self.viewer_transform,
            updated: self.updated,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.lock().width
    }

    pub fn height(&self) -> u32 {
        self.image.lock().height
    }

    /// The canvas-space rectangle this result covers (the whole canvas, for a committed
    /// full-frame result).
    pub fn canvas_rect(&self) -> CanvasRect {
        let img = self.image.lock();
        CanvasRect::new(
            0,
            0,
            (img.width as f64 / self.scale_factor).round() as i32,
            (img.height as f64 / self.scale_factor).round() as i32,
        )
    }

    /// Copies `src` into `self` at paste offset `(tx, ty)` (in `self`'s screen-image
    /// coordinates), clipped to `target_interval` (in canvas coordinates, converted to
    /// `self`'s scale) and to `self`'s own bounds.
    ///
    /// `target_interval` must be contained in [`Self::canvas_rect`] — see `spec.md` §8's
    /// patch invariant.
    pub fn patch(&mut self, src: &RenderResult, target_interval: CanvasRect, tx: i32, ty: i32) {
        debug_assert!(self.canvas_rect().contains_rect(&target_interval));

        let clip = target_interval.scaled(self.scale_factor);
        let mut dst = self.image.lock();
        let dst_bounds = CanvasRect::full_canvas(dst.width, dst.height);
        let clip = clip.clamp_to(&dst_bounds);

        let src = src.image.lock();
        for y in 0..src.height {
            let dst_y = ty + y as i32;
            if dst_y < clip.y0 || dst_y >= clip.y1 {
                continue;
            }
            for x in 0..src.width {
                let dst_x = tx + x as i32;
                if dst_x < clip.x0 || dst_x >= clip.x1 {
                    continue;
                }
                let v = src.get(x, y);
                dst.set(dst_x as u32, dst_y as u32, v);
            }
        }
        drop(dst);
        self.updated = true;
    }

    pub fn set_updated(&mut self) {
        self.updated = true;
    }

    /// Consumes the "updated" marker, returning whether the display should blit this result.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }

    /// A snapshot copy of the pixels, for tests and for display backends that want an owned
    /// buffer to hand off to a presentation layer.
    pub fn to_argb_image(&self) -> ArgbImage {
        self.image.lock().clone()
    }
}
