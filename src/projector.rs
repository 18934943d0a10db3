//! [`VolatileProjector`] is the external contract for "render one pass" (spec.md §4.5):
//! blocking, cancellable, reports validity and elapsed time. [`ProjectorFactory`] builds one
//! for a given viewer snapshot, destination, and transform (spec.md §4.4).
//!
//! `map` and `cancel` both take `&self`: the contract requires `cancel()` to be callable
//! concurrently with an in-flight `map()` (spec.md §4.5, §5), which in safe Rust means the
//! implementor holds its mutable scratch state behind interior mutability rather than behind
//! an exclusive borrow the caller would have to fight over. [`CompositeProjector`] below shows
//! the pattern. A fan-out `CompositeProjector` driven by an [`AccumulateProjector`] is provided
//! since spec.md §9 notes that "two or three concrete implementations suffice," but it is not
//! required: callers may supply their own [`ProjectorFactory`] entirely.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use glam::Affine3A;
use parking_lot::Mutex;

use crate::render_result::ArgbImage;
use crate::render_storage::RenderStorage;
use crate::snapshot::{SourceIndex, ViewerSnapshot};

/// Wall-clock source, abstracted so tests can inject deterministic elapsed times (see
/// `SPEC_FULL.md` §4).
pub trait Clock: Send + Sync {
    fn now(&self) -> std::time::Instant;
}

/// [`std::time::Instant`]-backed default clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

/// One rendering pass: blocking, cancellable, reports validity and elapsed time.
///
/// `map` returning `false` means the pass was cancelled, not that it failed; any other
/// termination is a success, with [`Self::is_valid`] reporting whether all sampled data was
/// authoritative.
pub trait VolatileProjector: Send + Sync {
    /// Produces one pass into the destination given at construction. If `clear_destination`,
    /// the destination is cleared before sampling (a fresh frame, as opposed to a retry of the
    /// same incomplete pass).
    ///
    /// Returns `false` iff [`Self::cancel`] was observed before completion.
    fn map(&self, clear_destination: bool) -> bool;

    /// Idempotent request to abort the current or next [`Self::map`] call at its next safe
    /// point. Safe to call concurrently with `map`.
    fn cancel(&self);

    /// After `map` returned `true`: whether every sampled source block was authoritative
    /// data, as opposed to a lower-resolution placeholder substituted by the cache.
    fn is_valid(&self) -> bool;

    /// Wall time spent in the last `map` call.
    fn last_frame_render_nanos(&self) -> u64;
}

/// Builds a [`VolatileProjector`] for one viewer snapshot, destination image, and composite
/// screen transform.
///
/// `storage` is shared: the renderer only ever drives one projector at a time, so there is no
/// real contention, but `Arc<Mutex<_>>` keeps the seam safe without `unsafe`.
pub trait ProjectorFactory: Send + Sync {
    fn create_projector(
        &self,
        snapshot: &dyn ViewerSnapshot,
        destination: Arc<Mutex<ArgbImage>>,
        screen_transform: Affine3A,
        storage: Arc<Mutex<RenderStorage>>,
    ) -> Arc<dyn VolatileProjector>;

    /// Policy flag: should the renderer trigger a brand new frame (with
    /// `CacheControl::prepare_next_frame`) if the current one ends with invalid data?
    /// Required by some cache strategies (spec.md §4.4).
    fn request_new_frame_if_incomplete(&self) -> bool;
}

/// Per-source sampling contract used by [`CompositeProjector`]. A [`SourceProjectorFactory`]
/// resolves the mipmap level once, at construction time (from `ViewerSnapshot::best_mip_map_level`),
/// since the viewer snapshot is immutable for the lifetime of the frame; `sample` itself only
/// needs the already-concatenated screen transform.
pub trait SourceProjector: Send {
    fn sample(
        &mut self,
        screen_transform: Affine3A,
        argb_out: &mut [u32],
        mask_out: &mut [u8],
        width: u32,
        height: u32,
    ) -> bool;

    /// Checked by [`CompositeProjector`] between sources; lets `cancel()` take effect without
    /// waiting for every remaining source to finish sampling.
    fn is_cancelled(&self) -> bool;
}

/// Builds one [`SourceProjector`] per visible source, already bound to its resolved mipmap
/// level.
pub trait SourceProjectorFactory: Send + Sync {
    fn create_source_projector(&self, source: SourceIndex, mip_level: u32) -> Box<dyn SourceProjector>;
}

/// Composition rule combining per-source renders into the final ARGB image (spec.md's
/// "accumulate projector").
pub trait AccumulateProjector: Send {
    fn accumulate(&mut self, sources: &RenderStorage, num_sources: usize, destination: &mut ArgbImage);
}

/// A [`VolatileProjector`] that fans out to one [`SourceProjector`] per visible source and
/// folds the results through an [`AccumulateProjector`].
pub struct CompositeProjector {
    destination: Arc<Mutex<ArgbImage>>,
    storage: Arc<Mutex<RenderStorage>>,
    screen_transform: Affine3A,
    /// Visible sources paired with their already-resolved mipmap level.
    sources: Vec<(SourceIndex, u32)>,
    source_factory: Arc<dyn SourceProjectorFactory>,
    accumulate: Mutex<Box<dyn AccumulateProjector>>,
    clock: Arc<dyn Clock>,
    cancelled: AtomicBool,
    valid: AtomicBool,
    last_nanos: AtomicU64,
}

impl CompositeProjector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        destination: Arc<Mutex<ArgbImage>>,
        storage: Arc<Mutex<RenderStorage>>,
        screen_transform: Affine3A,
        sources: Vec<(SourceIndex, u32)>,
        source_factory: Arc<dyn SourceProjectorFactory>,
        accumulate: Box<dyn AccumulateProjector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            destination,
            storage,
            screen_transform,
            sources,
            source_factory,
            accumulate: Mutex::new(accumulate),
            clock,
            cancelled: AtomicBool::new(false),
            valid: AtomicBool::new(false),
            last_nanos: AtomicU64::new(0),
        }
    }
}

impl VolatileProjector for CompositeProjector {
    fn map(&self, clear_destination: bool) -> bool {
        let start = self.clock.now();
        self.cancelled.store(false, Ordering::SeqCst);

        if clear_destination {
            self.destination.lock().pixels_mut().iter_mut().for_each(|p| *p = 0);
        }

        let mut storage = self.storage.lock();

        let mut all_valid = true;
        for (idx, &(source, mip_level)) in self.sources.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            let mut projector = self.source_factory.create_source_projector(source, mip_level);
            let buf = &mut storage.buffers_mut()[idx];
            let ok = projector.sample(
                self.screen_transform,
                &mut buf.argb,
                &mut buf.mask,
                buf.width,
                buf.height,
            );
            all_valid &= ok;
            if projector.is_cancelled() || self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
        }

        self.accumulate
            .lock()
            .accumulate(&storage, self.sources.len(), &mut self.destination.lock());

        self.valid.store(all_valid, Ordering::SeqCst);
        self.last_nanos
            .store(start.elapsed().as_nanos() as u64, Ordering::SeqCst);
        true
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn last_frame_render_nanos(&self) -> u64 {
        self.last_nanos.load(Ordering::SeqCst)
    }
}

/// A [`VolatileProjector`] wrapping a single [`SourceProjector`], sampling straight into the
/// destination with no accumulation step. Useful when a viewer only ever shows one source at a
/// time and a fan-out `CompositeProjector` would be pure overhead.
pub struct SingleSourceProjector {
    destination: Arc<Mutex<ArgbImage>>,
    source: Mutex<Box<dyn SourceProjector>>,
    screen_transform: Affine3A,
    clock: Arc<dyn Clock>,
    cancelled: AtomicBool,
    valid: AtomicBool,
    last_nanos: AtomicU64,
}

impl SingleSourceProjector {
    pub fn new(
        destination: Arc<Mutex<ArgbImage>>,
        source: Box<dyn SourceProjector>,
        screen_transform: Affine3A,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            destination,
            source: Mutex::new(source),
            screen_transform,
            clock,
            cancelled: AtomicBool::new(false),
            valid: AtomicBool::new(false),
            last_nanos: AtomicU64::new(0),
        }
    }
}

impl VolatileProjector for SingleSourceProjector {
    fn map(&self, clear_destination: bool) -> bool {
        let start = self.clock.now();
        self.cancelled.store(false, Ordering::SeqCst);

        let mut dst = self.destination.lock();
        if clear_destination {
            dst.pixels_mut().iter_mut().for_each(|p| *p = 0);
        }
        let (width, height) = (dst.width, dst.height);
        let mut mask = vec![0u8; (width as usize) * (height as usize)];

        let mut source = self.source.lock();
        let ok = source.sample(self.screen_transform, dst.pixels_mut(), &mut mask, width, height);
        drop(dst);

        if source.is_cancelled() || self.cancelled.load(Ordering::SeqCst) {
            return false;
        }

        self.valid.store(ok, Ordering::SeqCst);
        self.last_nanos
            .store(start.elapsed().as_nanos() as u64, Ordering::SeqCst);
        true
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn last_frame_render_nanos(&self) -> u64 {
        self.last_nanos.load(Ordering::SeqCst)
    }
}

/// Builds a [`SingleSourceProjector`] bound to whichever source is first in
/// `ViewerSnapshot::visible_and_present_sources`.
pub struct SingleSourceProjectorFactory {
    source_factory: Arc<dyn SourceProjectorFactory>,
    clock: Arc<dyn Clock>,
    request_new_frame_if_incomplete: bool,
}

impl SingleSourceProjectorFactory {
    pub fn new(
        source_factory: Arc<dyn SourceProjectorFactory>,
        clock: Arc<dyn Clock>,
        request_new_frame_if_incomplete: bool,
    ) -> Self {
        Self {
            source_factory,
            clock,
            request_new_frame_if_incomplete,
        }
    }
}

impl ProjectorFactory for SingleSourceProjectorFactory {
    fn create_projector(
        &self,
        snapshot: &dyn ViewerSnapshot,
        destination: Arc<Mutex<ArgbImage>>,
        screen_transform: Affine3A,
        _storage: Arc<Mutex<RenderStorage>>,
    ) -> Arc<dyn VolatileProjector> {
        let source = snapshot
            .visible_and_present_sources()
            .into_iter()
            .next()
            .unwrap_or(SourceIndex(0));
        let mip_level = snapshot.best_mip_map_level(screen_transform, source);
        let source_projector = self.source_factory.create_source_projector(source, mip_level);
        Arc::new(SingleSourceProjector::new(
            destination,
            source_projector,
            screen_transform,
            Arc::clone(&self.clock),
        ))
    }

    fn request_new_frame_if_incomplete(&self) -> bool {
        self.request_new_frame_if_incomplete
    }
}

/// Builds a fresh [`AccumulateProjector`] for each pass (spec.md §6's "accumulate projector
/// factory" collaborator).
pub trait AccumulateProjectorFactory: Send + Sync {
    fn create_accumulate_projector(&self) -> Box<dyn AccumulateProjector>;
}

/// The `ProjectorFactory` that actually constructs a [`CompositeProjector`] per `paint()` call,
/// resolving each visible source's mipmap level from the snapshot and handing off to a fresh
/// accumulate projector from `accumulate_factory`.
pub struct CompositeProjectorFactory {
    source_factory: Arc<dyn SourceProjectorFactory>,
    accumulate_factory: Arc<dyn AccumulateProjectorFactory>,
    clock: Arc<dyn Clock>,
    request_new_frame_if_incomplete: bool,
}

impl CompositeProjectorFactory {
    pub fn new(
        source_factory: Arc<dyn SourceProjectorFactory>,
        accumulate_factory: Arc<dyn AccumulateProjectorFactory>,
        clock: Arc<dyn Clock>,
        request_new_frame_if_incomplete: bool,
    ) -> Self {
        Self {
            source_factory,
            accumulate_factory,
            clock,
            request_new_frame_if_incomplete,
        }
    }
}

impl ProjectorFactory for CompositeProjectorFactory {
    fn create_projector(
        &self,
        snapshot: &dyn ViewerSnapshot,
        destination: Arc<Mutex<ArgbImage>>,
        screen_transform: Affine3A,
        storage: Arc<Mutex<RenderStorage>>,
    ) -> Arc<dyn VolatileProjector> {
        let sources: Vec<(SourceIndex, u32)> = snapshot
            .visible_and_present_sources()
            .into_iter()
            .map(|source| (source, snapshot.best_mip_map_level(screen_transform, source)))
            .collect();

        Arc::new(CompositeProjector::new(
            destination,
            storage,
            screen_transform,
            sources,
            Arc::clone(&self.source_factory),
            self.accumulate_factory.create_accumulate_projector(),
            Arc::clone(&self.clock),
        ))
    }

    fn request_new_frame_if_incomplete(&self) -> bool {
        self.request_new_frame_if_incomplete
    }
}
