//! The block-cache / IO-budget collaborator contract.
//!
//! The renderer directs the cache's prefetch priorities and IO timing but never touches block
//! storage directly — that remains entirely external, per `spec.md` §1.

/// Per-frame IO timing budget handed to the cache before each new frame or interval batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IoBudget {
    /// Total IO time allotted for the frame.
    pub frame_budget: std::time::Duration,
    /// Time allotted per individual block fetch.
    pub per_block_budget: std::time::Duration,
}

impl IoBudget {
    /// The budget the renderer sets at projector creation: `{100 ms, 10 ms}` (`spec.md` §6).
    pub const DEFAULT: Self = Self {
        frame_budget: std::time::Duration::from_millis(100),
        per_block_budget: std::time::Duration::from_millis(10),
    };
}

/// External coordinator of block fetches and per-frame IO budgets.
pub trait CacheControl: Send + Sync {
    /// Directs the cache to age/prioritize its contents ahead of the upcoming frame or
    /// interval batch. Called exactly once per new frame or new interval batch, never per
    /// finer iteration within that batch (`spec.md` §5).
    fn prepare_next_frame(&self);

    /// Sets the IO timing budget used for the upcoming projector's block fetches.
    fn set_io_budget(&self, budget: IoBudget);
}
