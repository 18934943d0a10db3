//! The display / render-target collaborator contract (spec.md §6).
//!
//! Owns the canvas size and a small pool of reusable [`RenderResult`]s; the renderer borrows
//! one, publishes it, and asks for a fresh reusable one on the next new frame.

use glam::Affine3A;

use crate::render_result::RenderResult;

pub trait RenderTarget: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Allocates a brand new [`RenderResult`] at the given screen-image size and scale.
    fn create_render_result(&self, width: u32, height: u32, scale_factor: f64, viewer_transform: Affine3A) -> RenderResult;

    /// Returns a previously-published [`RenderResult`] for reuse, if the pool has one, resized
    /// in place to `(width, height)` by the caller.
    fn reusable_render_result(&self) -> Option<RenderResult>;

    /// Publishes `result` as the one the display should blit from.
    fn set_render_result(&self, result: RenderResult);
}
