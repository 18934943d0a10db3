//! Coarse-to-fine progressive rendering for large multi-resolution image volumes.
//!
//! A [`renderer::MultiResolutionRenderer`] schedules repeated, cancellable rendering passes
//! driven by a [`projector::ProjectorFactory`], feeding back a moving average of observed
//! render time to pick ever-finer [`screen_scale::ScreenScale`]s until the canvas converges.
//! A client repaints by calling [`renderer::MultiResolutionRenderer::paint`] from a painter
//! thread or event loop and calls `request_repaint`/`request_repaint_interval` whenever the
//! viewer state or a screen region becomes dirty.
//!
//! Out of scope: pixel rasterization, image decoding/IO, color conversion, GUI widgets, and
//! persistence — this crate only schedules *when* and *at what resolution* to render, handing
//! the actual sampling off to a caller-supplied [`projector::ProjectorFactory`].

pub mod cache_control;
pub mod config;
pub mod display;
pub mod geometry;
pub mod moving_average;
pub mod projector;
pub mod render_result;
pub mod render_storage;
pub mod renderer;
pub mod screen_scale;
pub mod snapshot;

pub use cache_control::{CacheControl, IoBudget};
pub use config::{RenderExecutor, RendererConfig, RendererConfigError};
pub use display::RenderTarget;
pub use geometry::CanvasRect;
pub use projector::{
    AccumulateProjector, AccumulateProjectorFactory, Clock, CompositeProjector, CompositeProjectorFactory,
    ProjectorFactory, SingleSourceProjector, SingleSourceProjectorFactory, SourceProjector, SourceProjectorFactory,
    SystemClock, VolatileProjector,
};
pub use render_result::{ArgbImage, RenderResult};
pub use render_storage::RenderStorage;
pub use renderer::MultiResolutionRenderer;
pub use screen_scale::{IntervalRenderData, ScreenScale, ScreenScales};
pub use snapshot::{SourceIndex, ViewerSnapshot};
