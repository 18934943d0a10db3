//! Construction-time configuration for [`crate::renderer::MultiResolutionRenderer`]
//! (spec.md §6).

use std::sync::Arc;

use crate::cache_control::CacheControl;
use crate::projector::ProjectorFactory;

/// An external thread pool a `ProjectorFactory` may dispatch its sub-tasks onto, in place of
/// spinning up its own (spec.md §6, `renderingExecutorService`). The core renderer never calls
/// this itself — it is pure pass-through configuration, handed to whatever `ProjectorFactory`
/// the caller supplied.
pub trait RenderExecutor: Send + Sync {
    /// Runs `job` to completion, on this executor's own thread(s).
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}

/// Construction-time validation failure. The public `paint`/`requestRepaint` boundary stays
/// infallible per spec.md §7 — only construction can fail.
#[derive(thiserror::Error, Debug)]
pub enum RendererConfigError {
    #[error("screen_scale_factors must not be empty")]
    EmptyScaleLadder,

    #[error("screen_scale_factors must all be in (0, 1], got {0}")]
    ScaleOutOfRange(f64),

    #[error("target_render_nanos must be positive, got {0}")]
    NonPositiveTargetNanos(f64),
}

/// Construction parameters accepted by [`crate::renderer::MultiResolutionRenderer::new`]
/// (spec.md §6).
pub struct RendererConfig {
    /// Rendering scale ladder, finest first.
    pub screen_scale_factors: Vec<f64>,
    /// Per-frame latency goal; drives scale selection.
    pub target_render_nanos: f64,
    /// How many sub-tasks a projector splits into. Passed through to the `ProjectorFactory`;
    /// the core renderer does not itself manage a thread pool.
    pub num_rendering_threads: usize,
    /// Optional external thread pool a `ProjectorFactory` may dispatch its sub-tasks onto;
    /// `None` means the projector spins up its own.
    pub rendering_executor: Option<Arc<dyn RenderExecutor>>,
    /// Prefer volatile (cache-async) per-source projectors.
    pub use_volatile_if_available: bool,
    /// Builds the composite projector for each frame.
    pub projector_factory: Arc<dyn ProjectorFactory>,
    /// IO/budget collaborator.
    pub cache_control: Arc<dyn CacheControl>,
}

impl RendererConfig {
    pub(crate) fn validate(&self) -> Result<(), RendererConfigError> {
        if self.screen_scale_factors.is_empty() {
            return Err(RendererConfigError::EmptyScaleLadder);
        }
        for &f in &self.screen_scale_factors {
            if !(0.0..=1.0).contains(&f) || f <= 0.0 {
                return Err(RendererConfigError::ScaleOutOfRange(f));
            }
        }
        if self.target_render_nanos <= 0.0 {
            return Err(RendererConfigError::NonPositiveTargetNanos(self.target_render_nanos));
        }
        Ok(())
    }
}

/// Seed value for the per-pixel, per-source render time estimate, chosen so the first frame
/// picks a mid-coarse scale (spec.md §4.6, "Budget feedback loop").
pub const INITIAL_NANOS_PER_PIXEL_PER_SOURCE: f64 = 500.0;

/// Window size for [`crate::moving_average::MovingAverage`] used by the renderer's estimator
/// (spec.md §4.1, §9).
pub const ESTIMATOR_WINDOW: usize = 3;
