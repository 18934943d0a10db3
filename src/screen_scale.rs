//! The screen-scale ladder: the table of candidate rendering resolutions and the logic that
//! picks one under a time budget, plus the pending-dirty-interval bookkeeping for interval mode.

use glam::Affine3A;

use crate::geometry::CanvasRect;

/// One candidate rendering resolution.
///
/// Index 0 is conventionally the finest scale (`scale == 1.0`, if present); higher indices are
/// coarser. Immutable once built by [`ScreenScales::check_resize`].
#[derive(Clone, Debug)]
pub struct ScreenScale {
    /// Screen-image pixels per canvas pixel, in `(0, 1]`.
    pub scale: f64,
    pub width: u32,
    pub height: u32,
    /// Canvas-to-screen-image affine transform (a diagonal scale).
    pub scale_transform: Affine3A,
}

impl ScreenScale {
    fn new(scale: f64, canvas_width: u32, canvas_height: u32) -> Self {
        let width = (canvas_width as f64 * scale).round().max(1.0) as u32;
        let height = (canvas_height as f64 * scale).round().max(1.0) as u32;
        Self {
            scale,
            width,
            height,
            scale_transform: Affine3A::from_scale(glam::Vec3::new(scale as f32, scale as f32, 1.0)),
        }
    }

    /// Estimated wall time to render at this scale, given a per-pixel nanosecond estimate.
    pub fn estimated_render_nanos(&self, nanos_per_pixel: f64) -> f64 {
        self.width as f64 * self.height as f64 * nanos_per_pixel
    }
}

/// The consolidated, pulled work unit for one interval (dirty-rect) pass.
///
/// Carries everything [`crate::renderer::MultiResolutionRenderer`] needs to build an interval
/// projector and, afterwards, to patch the result back into the current full-frame
/// [`crate::render_result::RenderResult`].
#[derive(Clone, Debug)]
pub struct IntervalRenderData {
    /// The dirty region in canvas coordinates, consolidated from all pending requests.
    pub target_interval: CanvasRect,
    pub scale_index: usize,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    /// Paste offset, in the base full-frame [`ScreenScale`]'s coordinate space.
    pub tx: i32,
    pub ty: i32,
}

/// Ordered ladder of [`ScreenScale`]s plus the pending-dirty-interval set.
pub struct ScreenScales {
    factors: Vec<f64>,
    target_render_nanos: f64,
    canvas_size: Option<(u32, u32)>,
    scales: Vec<ScreenScale>,
    pending: Vec<CanvasRect>,
}

impl ScreenScales {
    /// `factors` should be strictly decreasing values in `(0, 1]`, though this is not enforced.
    pub fn new(factors: Vec<f64>, target_render_nanos: f64) -> Self {
        assert!(!factors.is_empty(), "screen scale ladder must not be empty");
        Self {
            factors,
            target_render_nanos,
            canvas_size: None,
            scales: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn scales(&self) -> &[ScreenScale] {
        &self.scales
    }

    pub fn coarsest_index(&self) -> usize {
        self.scales.len() - 1
    }

    /// Rebuilds the scale table and clears pending intervals if the canvas size changed.
    /// Returns whether a rebuild happened.
    pub fn check_resize(&mut self, width: u32, height: u32) -> bool {
        if self.canvas_size == Some((width, height)) {
            return false;
        }
        self.canvas_size = Some((width, height));
        self.scales = self
            .factors
            .iter()
            .map(|&f| ScreenScale::new(f, width, height))
            .collect();
        self.pending.clear();
        true
    }

    /// Smallest index whose estimated render time fits `target_render_nanos`, else the
    /// coarsest index.
    pub fn suggest_screen_scale(&self, nanos_per_pixel: f64) -> usize {
        self.scales
            .iter()
            .position(|s| s.estimated_render_nanos(nanos_per_pixel) <= self.target_render_nanos)
            .unwrap_or_else(|| self.coarsest_index())
    }

    /// Like [`Self::suggest_screen_scale`], but never finer than `current_screen_scale_index`:
    /// an interval pass never renders at a sharper resolution than the current full frame.
    pub fn suggest_interval_screen_scale(
        &self,
        nanos_per_pixel: f64,
        current_screen_scale_index: usize,
    ) -> usize {
        self.suggest_screen_scale(nanos_per_pixel)
            .max(current_screen_scale_index)
    }

    /// Unions `interval` (in canvas coordinates) into the pending dirty set.
    pub fn request_interval(&mut self, interval: CanvasRect) {
        self.pending.push(interval);
    }

    pub fn clear_requested_intervals(&mut self) {
        self.pending.clear();
    }

    pub fn has_pending_intervals(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drains the pending set, computing its bounding rectangle and converting it into the
    /// chosen interval scale's coordinate space. Returns `None` if nothing is pending.
    pub fn pull_interval_render_data(
        &mut self,
        requested_interval_scale_index: usize,
        base_screen_scale_index: usize,
    ) -> Option<IntervalRenderData> {
        let mut pending = std::mem::take(&mut self.pending);
        let bounding = pending
            .drain(..)
            .reduce(|a, b| a.union(&b))?;

        let interval_scale = &self.scales[requested_interval_scale_index];
        let base_scale = &self.scales[base_screen_scale_index];

        let in_interval_space = bounding.scaled(interval_scale.scale);
        let in_base_space = bounding.scaled(base_scale.scale);

        Some(IntervalRenderData {
            target_interval: bounding,
            scale_index: requested_interval_scale_index,
            offset_x: in_interval_space.x0.max(0) as u32,
            offset_y: in_interval_space.y0.max(0) as u32,
            width: in_interval_space.width().max(0) as u32,
            height: in_interval_space.height().max(0) as u32,
            scale: interval_scale.scale,
            tx: in_base_space.x0,
            ty: in_base_space.y0,
        })
    }

    /// Puts a cancelled interval's region back into the pending set.
    pub fn re_request(&mut self, data: &IntervalRenderData) {
        self.request_interval(data.target_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scales() -> ScreenScales {
        let mut s = ScreenScales::new(vec![1.0, 0.5, 0.25], 30_000_000.0);
        s.check_resize(1024, 1024);
        s
    }

    #[test]
    fn check_resize_is_idempotent_for_same_size() {
        let mut s = scales();
        s.request_interval(CanvasRect::new(0, 0, 10, 10));
        assert!(!s.check_resize(1024, 1024));
        assert!(s.has_pending_intervals());
    }

    #[test]
    fn resize_clears_pending_intervals() {
        let mut s = scales();
        s.request_interval(CanvasRect::new(0, 0, 10, 10));
        assert!(s.check_resize(800, 600));
        assert!(!s.has_pending_intervals());
    }

    #[test]
    fn suggest_screen_scale_picks_smallest_fitting_index() {
        let s = scales();
        // 1024*1024 * 100ns = ~104ms > 30ms budget, should not pick index 0.
        let idx = s.suggest_screen_scale(100.0);
        assert!(idx > 0);
        // Tiny per-pixel cost should fit the finest scale.
        assert_eq!(s.suggest_screen_scale(0.001), 0);
    }

    #[test]
    fn suggest_screen_scale_falls_back_to_coarsest() {
        let s = scales();
        assert_eq!(s.suggest_screen_scale(1.0e12), s.coarsest_index());
    }

    #[test]
    fn interval_scale_never_finer_than_base() {
        let s = scales();
        let idx = s.suggest_interval_screen_scale(0.001, 1);
        assert!(idx >= 1);
    }

    #[test]
    fn pull_interval_render_data_unions_pending_rects() {
        let mut s = scales();
        s.request_interval(CanvasRect::new(0, 0, 10, 10));
        s.request_interval(CanvasRect::new(50, 50, 60, 60));
        let data = s.pull_interval_render_data(0, 0).unwrap();
        assert_eq!(data.target_interval, CanvasRect::new(0, 0, 60, 60));
        assert!(!s.has_pending_intervals());
    }

    #[test]
    fn re_request_restores_pending_interval() {
        let mut s = scales();
        s.request_interval(CanvasRect::new(0, 0, 10, 10));
        let data = s.pull_interval_render_data(0, 0).unwrap();
        assert!(!s.has_pending_intervals());
        s.re_request(&data);
        assert!(s.has_pending_intervals());
    }
}
