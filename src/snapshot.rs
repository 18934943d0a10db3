//! The viewer-state snapshot contract: an external, immutable provider of "what is currently
//! visible and how." The renderer never mutates or interprets viewer state beyond what this
//! trait exposes.

use glam::Affine3A;

/// Opaque handle identifying one source (one image/volume) within a viewer snapshot.
///
/// Kept intentionally unstructured — the renderer only ever uses it as a key passed back into
/// [`ViewerSnapshot`] methods, never interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceIndex(pub usize);

/// An immutable copy of the viewer's transform, visible-source list, timepoint, interpolation
/// mode, and groups, captured once at the start of a frame.
///
/// The renderer treats the whole enclosing application state (transform, visible sources,
/// timepoint, groups) as this one external, already-immutable snapshot; see `spec.md` §1.
pub trait ViewerSnapshot: Send + Sync {
    /// The current canvas-to-world viewer transform.
    fn viewer_transform(&self) -> Affine3A;

    /// Sources that are both toggled visible and currently present in the dataset.
    fn visible_and_present_sources(&self) -> Vec<SourceIndex>;

    /// The mipmap level the snapshot recommends sampling at, given the concatenated
    /// screen transform and the source in question. Not a renderer concern beyond passing it
    /// through to the per-source projector.
    fn best_mip_map_level(&self, transform: Affine3A, source: SourceIndex) -> u32;
}
