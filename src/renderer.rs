//! The state machine at the heart of this crate: schedules full-frame and interval passes,
//! selects screen scales, manages cancellation, and publishes results. See `spec.md` §4.6.

use std::sync::Arc;
use std::time::Duration;

use glam::{Affine3A, Vec3};
use parking_lot::{Condvar, Mutex};

use crate::cache_control::IoBudget;
use crate::config::{RendererConfig, RendererConfigError, ESTIMATOR_WINDOW, INITIAL_NANOS_PER_PIXEL_PER_SOURCE};
use crate::display::RenderTarget;
use crate::geometry::CanvasRect;
use crate::moving_average::MovingAverage;
use crate::projector::VolatileProjector;
use crate::render_result::RenderResult;
use crate::render_storage::RenderStorage;
use crate::screen_scale::{IntervalRenderData, ScreenScales};
use crate::snapshot::ViewerSnapshot;

/// The destination and bookkeeping for an in-flight full-frame pass, kept across `paint` calls
/// so a same-scale retry (invalid data, 1 ms back-off) reuses the same buffer and projector.
struct ActiveFullFrame {
    result: RenderResult,
    request_new_frame_if_incomplete: bool,
}

/// Same idea for interval passes.
struct ActiveInterval {
    data: IntervalRenderData,
    result: RenderResult,
}

/// Everything behind the renderer's one coarse mutex (`spec.md` §3, §5).
struct Inner {
    screen_scales: ScreenScales,
    estimator: MovingAverage<ESTIMATOR_WINDOW>,

    current_screen_scale_index: usize,
    /// `None` encodes spec.md's `-1` sentinel: fully converged, nothing left to do.
    requested_screen_scale_index: Option<usize>,

    current_interval_scale_index: usize,
    requested_interval_scale_index: usize,

    rendering_may_be_cancelled: bool,
    interval_mode: bool,

    new_frame_request: bool,
    new_interval_request: bool,
    /// Set by `iterate_repaint`/`iterate_repaint_interval` to wake a blocked `wait_for_request`
    /// for an internal continuation step, without it being mistaken for a fresh external
    /// request: `new_frame`/`new_interval` in Phase 1 must stay false for these steps so
    /// `renderingMayBeCancelled` and the coarse-scale-only-at-first-commit rule (spec.md §5)
    /// come out right.
    pending_continuation: bool,

    current_viewer_state: Option<Arc<dyn ViewerSnapshot>>,
    current_num_visible_sources: usize,

    projector: Option<Arc<dyn VolatileProjector>>,
    active_full_frame: Option<ActiveFullFrame>,
    active_interval: Option<ActiveInterval>,

    /// The most recently committed full-frame result, kept around (unlike `active_full_frame`,
    /// which is cleared the moment it's handed to the display) so interval passes have a real
    /// destination to patch into between full-frame commits.
    current_render_result: Option<RenderResult>,

    killed: bool,
}

/// The coarse-to-fine progressive renderer. See the module and crate docs for the full
/// algorithm; this type is the `paint`/`requestRepaint` state machine of `spec.md` §4.6.
pub struct MultiResolutionRenderer {
    config: RendererConfig,
    display: Arc<dyn RenderTarget>,
    storage: Arc<Mutex<RenderStorage>>,
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl MultiResolutionRenderer {
    pub fn new(display: Arc<dyn RenderTarget>, config: RendererConfig) -> Result<Self, RendererConfigError> {
        config.validate()?;

        let screen_scales = ScreenScales::new(config.screen_scale_factors.clone(), config.target_render_nanos);
        let coarsest = config.screen_scale_factors.len() - 1;

        Ok(Self {
            inner: Mutex::new(Inner {
                screen_scales,
                estimator: MovingAverage::new(INITIAL_NANOS_PER_PIXEL_PER_SOURCE),
                current_screen_scale_index: coarsest,
                requested_screen_scale_index: Some(coarsest),
                current_interval_scale_index: coarsest,
                requested_interval_scale_index: coarsest,
                rendering_may_be_cancelled: false,
                interval_mode: false,
                new_frame_request: false,
                new_interval_request: false,
                pending_continuation: false,
                current_viewer_state: None,
                current_num_visible_sources: 0,
                projector: None,
                active_full_frame: None,
                active_interval: None,
                current_render_result: None,
                killed: false,
            }),
            wake: Condvar::new(),
            storage: Arc::new(Mutex::new(RenderStorage::new())),
            display,
            config,
        })
    }

    /// `true` once `requestedScreenScaleIndex == -1`: the canvas is fully resolved and there is
    /// no pending work.
    pub fn is_converged(&self) -> bool {
        let inner = self.inner.lock();
        inner.requested_screen_scale_index.is_none()
            && !inner.interval_mode
            && !inner.new_frame_request
            && !inner.new_interval_request
    }

    pub fn current_screen_scale_index(&self) -> usize {
        self.inner.lock().current_screen_scale_index
    }

    /// Blocks the caller (typically the painter thread) until a repaint is requested or
    /// `timeout` elapses. Purely a convenience wrapper around the internal wake signal;
    /// `paint` itself does not require callers to use this.
    pub fn wait_for_request(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        if inner.new_frame_request || inner.new_interval_request || inner.pending_continuation || inner.killed {
            return;
        }
        self.wake.wait_for(&mut inner, timeout);
    }

    /// Full-frame repaint request (`spec.md` §4.6).
    pub fn request_repaint(&self) {
        let mut inner = self.inner.lock();
        inner.new_frame_request = true;
        if inner.rendering_may_be_cancelled {
            if let Some(projector) = &inner.projector {
                projector.cancel();
            }
        }
        drop(inner);
        self.wake.notify_all();
        log::debug!("full-frame repaint requested");
    }

    /// Dirty-interval repaint request (`spec.md` §4.6). A pending full-frame request always
    /// obsoletes intervals, so if we are not cancellable and not already servicing intervals
    /// (i.e. we'd otherwise lose a committing coarse pass), this upgrades to a full-frame
    /// request instead of queuing the interval.
    pub fn request_repaint_interval(&self, interval: CanvasRect) {
        let mut inner = self.inner.lock();
        if inner.rendering_may_be_cancelled || inner.interval_mode {
            if let Some(projector) = &inner.projector {
                projector.cancel();
            }
            inner.screen_scales.request_interval(interval);
            inner.new_interval_request = true;
        } else {
            inner.new_frame_request = true;
        }
        drop(inner);
        self.wake.notify_all();
        log::debug!("interval repaint requested: {interval:?}");
    }

    /// Releases the projector and published results so they can be dropped. Safe to call more
    /// than once.
    pub fn kill(&self) {
        let mut inner = self.inner.lock();
        if let Some(projector) = inner.projector.take() {
            projector.cancel();
        }
        inner.active_full_frame = None;
        inner.active_interval = None;
        inner.current_render_result = None;
        inner.killed = true;
        drop(inner);
        self.wake.notify_all();
    }

    /// The core algorithm: `spec.md` §4.6 "paint(snapshot)".
    pub fn paint(&self, snapshot: Arc<dyn ViewerSnapshot>) -> bool {
        let canvas_width = self.display.width();
        let canvas_height = self.display.height();
        if canvas_width == 0 || canvas_height == 0 {
            return false;
        }

        // ---------------------------------------------------------------- Phase 1 (locked) ---
        let mut inner = self.inner.lock();
        if inner.killed {
            return false;
        }

        let resized = inner.screen_scales.check_resize(canvas_width, canvas_height);
        let new_frame = inner.new_frame_request || resized;
        if new_frame {
            inner.interval_mode = false;
            inner.screen_scales.clear_requested_intervals();
            inner.active_interval = None;
        }

        let mut new_interval = inner.new_interval_request && !new_frame;
        if new_interval {
            inner.interval_mode = true;
            let ns_per_px = inner.estimator.average() * inner.current_num_visible_sources as f64;
            inner.requested_interval_scale_index = inner
                .screen_scales
                .suggest_interval_screen_scale(ns_per_px, inner.current_screen_scale_index);
        }

        let prepare_next_frame = new_frame || new_interval;
        let mut paint_interval = inner.interval_mode;

        let mut create_projector = false;
        let mut pulled: Option<IntervalRenderData> = None;
        if paint_interval {
            create_projector =
                new_interval || inner.requested_interval_scale_index != inner.current_interval_scale_index;
            if create_projector {
                pulled = inner
                    .screen_scales
                    .pull_interval_render_data(inner.requested_interval_scale_index, inner.current_screen_scale_index);
                if pulled.is_none() {
                    // Nothing actually pending: fall back out of interval mode instead of
                    // rendering a degenerate empty interval.
                    inner.interval_mode = false;
                    paint_interval = false;
                    new_interval = false;
                }
            }
        }

        inner.new_frame_request = false;
        inner.new_interval_request = false;
        inner.pending_continuation = false;
        drop(inner);

        // -------------------------------------------------------- Phase 2 (unlocked) ---
        if prepare_next_frame {
            self.config.cache_control.prepare_next_frame();
            self.config.cache_control.set_io_budget(IoBudget::DEFAULT);
        }

        let mut fresh_full_frame = None;
        if new_frame {
            let sources = snapshot.visible_and_present_sources();
            let num_sources = sources.len();
            let inner = self.inner.lock();
            let ns_per_px = inner.estimator.average() * num_sources as f64;
            let requested_index = inner.screen_scales.suggest_screen_scale(ns_per_px);
            drop(inner);
            fresh_full_frame = Some((requested_index, num_sources));
        }

        // ---------------------------------------------------------------- Phase 3 (locked) ---
        let mut inner = self.inner.lock();

        if let Some((requested_index, num_sources)) = fresh_full_frame {
            inner.current_viewer_state = Some(Arc::clone(&snapshot));
            inner.current_num_visible_sources = num_sources;
            inner.requested_screen_scale_index = Some(requested_index);
        }

        let (projector, rendering_may_be_cancelled, current_request_new_frame_if_incomplete);

        if paint_interval {
            let interval_scale_index = inner.requested_interval_scale_index;
            if create_projector {
                let data = pulled.expect("create_projector implies a pulled interval");
                let result = RenderResult::new(data.width, data.height, data.scale, snapshot.viewer_transform());

                let offset_translate =
                    Affine3A::from_translation(Vec3::new(-(data.offset_x as f32), -(data.offset_y as f32), 0.0));
                let screen_transform = offset_translate
                    * inner.screen_scales.scales()[interval_scale_index].scale_transform
                    * snapshot.viewer_transform();

                let p = self.config.projector_factory.create_projector(
                    snapshot.as_ref(),
                    result.image_handle(),
                    screen_transform,
                    Arc::clone(&self.storage),
                );
                current_request_new_frame_if_incomplete = self.config.projector_factory.request_new_frame_if_incomplete();
                inner.active_interval = Some(ActiveInterval { data, result });
                inner.projector = Some(Arc::clone(&p));
                projector = p;
            } else {
                let active = inner
                    .active_interval
                    .as_ref()
                    .expect("retrying an interval pass requires a prior ActiveInterval");
                current_request_new_frame_if_incomplete = self.config.projector_factory.request_new_frame_if_incomplete();
                let _ = active;
                projector = inner
                    .projector
                    .clone()
                    .expect("retrying an interval pass requires a prior projector");
            }
            rendering_may_be_cancelled = !new_interval;
        } else {
            let requested_index = inner
                .requested_screen_scale_index
                .expect("full-frame branch always has a requested index");
            let create_full_frame_projector = new_frame || requested_index != inner.current_screen_scale_index;

            if create_full_frame_projector {
                let (width, height, scale) = {
                    let s = &inner.screen_scales.scales()[requested_index];
                    (s.width, s.height, s.scale)
                };
                let mut result = self
                    .display
                    .reusable_render_result()
                    .unwrap_or_else(|| self.display.create_render_result(width, height, scale, snapshot.viewer_transform()));
                result.viewer_transform = snapshot.viewer_transform();

                let num_sources = inner.current_num_visible_sources;
                self.storage.lock().check_renew_data(width, height, num_sources);

                let screen_transform =
                    inner.screen_scales.scales()[requested_index].scale_transform * snapshot.viewer_transform();

                let p = self.config.projector_factory.create_projector(
                    snapshot.as_ref(),
                    result.image_handle(),
                    screen_transform,
                    Arc::clone(&self.storage),
                );
                current_request_new_frame_if_incomplete = self.config.projector_factory.request_new_frame_if_incomplete();
                inner.active_full_frame = Some(ActiveFullFrame {
                    result,
                    request_new_frame_if_incomplete: current_request_new_frame_if_incomplete,
                });
                inner.projector = Some(Arc::clone(&p));
                projector = p;
            } else {
                let active = inner
                    .active_full_frame
                    .as_ref()
                    .expect("retrying a full-frame pass requires a prior ActiveFullFrame");
                current_request_new_frame_if_incomplete = active.request_new_frame_if_incomplete;
                projector = inner
                    .projector
                    .clone()
                    .expect("retrying a full-frame pass requires a prior projector");
            }
            rendering_may_be_cancelled = !new_frame;
        }

        inner.rendering_may_be_cancelled = rendering_may_be_cancelled;
        drop(inner);

        // ---------------------------------------------------------------- Phase 4 (unlocked) ---
        let success = projector.map(create_projector);
        let render_nanos = projector.last_frame_render_nanos();

        // ---------------------------------------------------------------- Phase 5 (locked) ---
        let mut inner = self.inner.lock();

        if !success {
            log::debug!("pass cancelled");
            if paint_interval {
                if let Some(active) = inner.active_interval.take() {
                    inner.screen_scales.re_request(&active.data);
                }
            }
            return false;
        }

        if paint_interval {
            if create_projector {
                inner.current_interval_scale_index = inner.requested_interval_scale_index;
            }

            let (target_interval, tx, ty) = {
                let active = inner
                    .active_interval
                    .as_ref()
                    .expect("a successful interval pass always has an ActiveInterval");
                (active.data.target_interval, active.data.tx, active.data.ty)
            };

            // Patch into the published result, not `active_full_frame` — that field is cleared
            // the instant a full frame commits (see the commit branch below), so on a quiescent
            // canvas receiving a dirty-rect request it would already be `None`.
            if inner.current_render_result.is_some() {
                let interval_result = inner.active_interval.as_ref().unwrap().result.shallow_clone();
                if let Some(current) = inner.current_render_result.as_mut() {
                    current.patch(&interval_result, target_interval, tx, ty);
                }
                let republish = inner.current_render_result.as_ref().unwrap().shallow_clone();
                self.display.set_render_result(republish);
            }

            let valid = projector.is_valid();
            if inner.current_interval_scale_index > inner.current_screen_scale_index {
                self.iterate_repaint_interval(&mut inner, inner.current_interval_scale_index - 1);
            } else if valid {
                log::debug!("interval pass converged with the base scale, returning to full-frame mode");
                inner.interval_mode = false;
                if inner.requested_screen_scale_index == Some(inner.current_screen_scale_index) {
                    inner.current_screen_scale_index += 1;
                }
                drop(inner);
                self.request_repaint();
                return true;
            } else {
                std::thread::sleep(Duration::from_millis(1));
                let scale_index = inner.requested_interval_scale_index;
                self.iterate_repaint_interval(&mut inner, scale_index);
            }
        } else {
            if create_projector {
                inner.current_screen_scale_index = inner
                    .requested_screen_scale_index
                    .expect("full-frame commit always has a requested index");
                if let Some(full) = inner.active_full_frame.as_mut() {
                    full.result.set_updated();
                }
                if inner.current_num_visible_sources > 0 {
                    if let Some(full) = &inner.active_full_frame {
                        let num_pixels = full.result.width() as f64 * full.result.height() as f64;
                        if num_pixels > 0.0 {
                            let per_pixel_per_source =
                                render_nanos as f64 / (num_pixels * inner.current_num_visible_sources as f64);
                            inner.estimator.add(per_pixel_per_source);
                        }
                    }
                }
                if let Some(full) = inner.active_full_frame.take() {
                    inner.current_render_result = Some(full.result);
                    let republish = inner.current_render_result.as_ref().unwrap().shallow_clone();
                    self.display.set_render_result(republish);
                }
            } else if let Some(full) = inner.active_full_frame.as_mut() {
                full.result.set_updated();
            }

            let valid = projector.is_valid();
            if !valid && current_request_new_frame_if_incomplete {
                drop(inner);
                self.request_repaint();
                return true;
            } else if inner.current_screen_scale_index > 0 {
                let scale_index = inner.current_screen_scale_index - 1;
                self.iterate_repaint(&mut inner, scale_index);
            } else if valid {
                log::debug!("full-frame render converged");
                inner.requested_screen_scale_index = None;
            } else {
                std::thread::sleep(Duration::from_millis(1));
                let scale_index = inner.current_screen_scale_index;
                self.iterate_repaint(&mut inner, scale_index);
            }
        }

        true
    }

    /// Schedules another full-frame pass at `scale_index` without going through the public
    /// `requestRepaint` obsoletion rules — this is an internal continuation of work already in
    /// flight, not a new external request.
    fn iterate_repaint(&self, inner: &mut Inner, scale_index: usize) {
        inner.requested_screen_scale_index = Some(scale_index);
        inner.pending_continuation = true;
        self.wake.notify_all();
    }

    /// Same idea for interval passes.
    fn iterate_repaint_interval(&self, inner: &mut Inner, scale_index: usize) {
        inner.requested_interval_scale_index = scale_index;
        inner.pending_continuation = true;
        self.wake.notify_all();
    }
}
