//! Shared fixtures for the end-to-end scenario tests: a fixed viewer snapshot, a counting
//! cache-control collaborator, a scripted volatile projector, and a single-slot display.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Affine3A;
use parking_lot::Mutex;

use re_progressive_render::{
    ArgbImage, CacheControl, IoBudget, ProjectorFactory, RenderResult, RenderStorage, RenderTarget, SourceIndex,
    VolatileProjector,
};

pub struct FixedSnapshot {
    pub transform: Affine3A,
    pub num_sources: usize,
}

impl re_progressive_render::ViewerSnapshot for FixedSnapshot {
    fn viewer_transform(&self) -> Affine3A {
        self.transform
    }

    fn visible_and_present_sources(&self) -> Vec<SourceIndex> {
        (0..self.num_sources).map(SourceIndex).collect()
    }

    fn best_mip_map_level(&self, _transform: Affine3A, _source: SourceIndex) -> u32 {
        0
    }
}

#[derive(Default)]
pub struct CountingCacheControl {
    prepare_calls: AtomicUsize,
}

impl CacheControl for CountingCacheControl {
    fn prepare_next_frame(&self) {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_io_budget(&self, _budget: IoBudget) {}
}

impl CountingCacheControl {
    pub fn calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }
}

/// A [`VolatileProjector`] whose validity, cancellation, and reported timing are all dictated by
/// the test, rather than by real sampling.
pub struct ScriptedProjector {
    destination: Arc<Mutex<ArgbImage>>,
    valid: AtomicBool,
    render_nanos: AtomicU64,
    cancel_requested: AtomicBool,
    fill: u32,
}

impl ScriptedProjector {
    pub fn new(destination: Arc<Mutex<ArgbImage>>, valid: bool, render_nanos: u64, fill: u32) -> Self {
        Self {
            destination,
            valid: AtomicBool::new(valid),
            render_nanos: AtomicU64::new(render_nanos),
            cancel_requested: AtomicBool::new(false),
            fill,
        }
    }
}

impl VolatileProjector for ScriptedProjector {
    fn map(&self, clear_destination: bool) -> bool {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return false;
        }
        let mut dst = self.destination.lock();
        if clear_destination {
            dst.pixels_mut().iter_mut().for_each(|p| *p = 0);
        }
        dst.pixels_mut().iter_mut().for_each(|p| *p = self.fill);
        true
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn last_frame_render_nanos(&self) -> u64 {
        self.render_nanos.load(Ordering::SeqCst)
    }
}

/// Builds a [`ScriptedProjector`] for every frame, with validity/timing fixed at construction
/// and optionally flipping to valid after a number of passes (simulating a cache that eventually
/// catches up).
pub struct ScriptedFactory {
    valid_after_pass: AtomicUsize,
    passes_seen: AtomicUsize,
    render_nanos: u64,
    request_new_frame_if_incomplete: bool,
    fill: u32,
    interval_fill: u32,
    max_area_seen: AtomicU64,
}

impl ScriptedFactory {
    /// `valid_after_pass == 0` means every pass is valid immediately. Every pass fills its
    /// destination with `fill`; an interval pass (a destination smaller than the full canvas)
    /// fills with `interval_fill` instead, so tests can tell a patched region from the rest of
    /// the canvas.
    pub fn new(valid_after_pass: usize, render_nanos: u64, request_new_frame_if_incomplete: bool, fill: u32) -> Self {
        Self::with_interval_fill(valid_after_pass, render_nanos, request_new_frame_if_incomplete, fill, fill)
    }

    pub fn with_interval_fill(
        valid_after_pass: usize,
        render_nanos: u64,
        request_new_frame_if_incomplete: bool,
        fill: u32,
        interval_fill: u32,
    ) -> Self {
        Self {
            valid_after_pass: AtomicUsize::new(valid_after_pass),
            passes_seen: AtomicUsize::new(0),
            render_nanos,
            request_new_frame_if_incomplete,
            fill,
            interval_fill,
            max_area_seen: AtomicU64::new(0),
        }
    }

    pub fn passes_seen(&self) -> usize {
        self.passes_seen.load(Ordering::SeqCst)
    }
}

impl ProjectorFactory for ScriptedFactory {
    fn create_projector(
        &self,
        _snapshot: &dyn re_progressive_render::ViewerSnapshot,
        destination: Arc<Mutex<ArgbImage>>,
        _screen_transform: Affine3A,
        _storage: Arc<Mutex<RenderStorage>>,
    ) -> Arc<dyn VolatileProjector> {
        let seen = self.passes_seen.fetch_add(1, Ordering::SeqCst);
        let threshold = self.valid_after_pass.load(Ordering::SeqCst);
        let valid = threshold == 0 || seen + 1 >= threshold;
        let area = {
            let dst = destination.lock();
            dst.width as u64 * dst.height as u64
        };
        // The first pass is always a full-frame one, so the largest destination area ever seen
        // is the full canvas; anything smaller than that high-water mark is an interval pass.
        let prev_max = self.max_area_seen.fetch_max(area, Ordering::SeqCst);
        let fill = if area >= prev_max { self.fill } else { self.interval_fill };
        Arc::new(ScriptedProjector::new(destination, valid, self.render_nanos, fill))
    }

    fn request_new_frame_if_incomplete(&self) -> bool {
        self.request_new_frame_if_incomplete
    }
}

/// A [`RenderTarget`] backed by a single reusable slot, matching the "singly-owned" display pool
/// this crate assumes.
pub struct SingleSlotDisplay {
    size: Mutex<(u32, u32)>,
    published: Mutex<Option<RenderResult>>,
}

impl SingleSlotDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Mutex::new((width, height)),
            published: Mutex::new(None),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
    }

    pub fn published_scale_factor(&self) -> Option<f64> {
        self.published.lock().as_ref().map(|r| r.scale_factor)
    }

    /// A snapshot of the published result's pixels, for tests that need to inspect whether
    /// (and where) the canvas actually changed.
    pub fn published_pixels(&self) -> Option<ArgbImage> {
        self.published.lock().as_ref().map(|r| r.to_argb_image())
    }
}

impl RenderTarget for SingleSlotDisplay {
    fn width(&self) -> u32 {
        self.size.lock().0
    }

    fn height(&self) -> u32 {
        self.size.lock().1
    }

    fn create_render_result(&self, width: u32, height: u32, scale_factor: f64, viewer_transform: Affine3A) -> RenderResult {
        RenderResult::new(width, height, scale_factor, viewer_transform)
    }

    fn reusable_render_result(&self) -> Option<RenderResult> {
        self.published.lock().take()
    }

    fn set_render_result(&self, result: RenderResult) {
        *self.published.lock() = Some(result);
    }
}
