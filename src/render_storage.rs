//! Pooled per-source scratch buffers, sized to the finest (largest) scale currently in use.
//!
//! Projectors write into these buffers and the accumulate step folds them into the final
//! [`crate::render_result::RenderResult`]. Reused across passes to avoid per-frame allocation
//! churn, the way a resource pool in a rendering backend amortizes allocation cost.

/// One source's scratch ARGB image and validity mask, both sized to the pool's current
/// capacity (which may be larger than what any single pass actually uses).
#[derive(Clone, Debug, Default)]
pub struct SourceBuffer {
    pub argb: Vec<u32>,
    pub mask: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl SourceBuffer {
    fn resize(&mut self, width: u32, height: u32) {
        let len = (width as usize) * (height as usize);
        self.argb.clear();
        self.argb.resize(len, 0);
        self.mask.clear();
        self.mask.resize(len, 0);
        self.width = width;
        self.height = height;
    }
}

/// A pool of [`SourceBuffer`]s, one per visible source.
#[derive(Default)]
pub struct RenderStorage {
    buffers: Vec<SourceBuffer>,
    max_width: u32,
    max_height: u32,
}

impl RenderStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows the pool to cover `(max_width, max_height)` and `num_sources` buffers, if it
    /// doesn't already. Returns whether anything was (re)allocated.
    pub fn check_renew_data(&mut self, max_width: u32, max_height: u32, num_sources: usize) -> bool {
        let needs_resize = max_width > self.max_width || max_height > self.max_height;
        let needs_more_buffers = num_sources > self.buffers.len();

        if !needs_resize && !needs_more_buffers {
            return false;
        }

        self.max_width = self.max_width.max(max_width);
        self.max_height = self.max_height.max(max_height);

        self.buffers.resize_with(num_sources, SourceBuffer::default);
        if needs_resize {
            for buf in &mut self.buffers {
                buf.resize(self.max_width, self.max_height);
            }
        } else {
            for buf in self.buffers.iter_mut().filter(|b| b.width == 0) {
                buf.resize(self.max_width, self.max_height);
            }
        }
        true
    }

    pub fn buffers(&self) -> &[SourceBuffer] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [SourceBuffer] {
        &mut self.buffers
    }
}
