//! Database configuration.

/// Configuration for creating a resource database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of entries in the page table. Each page holds
    /// [`Rid::PAGE_SIZE`](crate::Rid::PAGE_SIZE) storage slots.
    pub max_pages: usize,

    /// Whether `shutdown` drains the retirement queue.
    pub gc_on_shutdown: bool,

    /// Whether structural edits on a prototype cascade to its instances.
    pub propagate_prototypes: bool,

    /// Attempts made by internal commits (prototype propagation, detaching a
    /// destroyed child from its parent) before giving up on a contended RID.
    pub internal_commit_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pages: 4096, // 16M resources
            gc_on_shutdown: true,
            propagate_prototypes: true,
            internal_commit_retries: 8,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page table size.
    #[must_use]
    pub const fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    /// Sets whether shutdown drains the retirement queue.
    #[must_use]
    pub const fn gc_on_shutdown(mut self, value: bool) -> Self {
        self.gc_on_shutdown = value;
        self
    }

    /// Sets whether prototype edits cascade to instances.
    #[must_use]
    pub const fn propagate_prototypes(mut self, value: bool) -> Self {
        self.propagate_prototypes = value;
        self
    }

    /// Sets the retry budget for internal commits.
    #[must_use]
    pub const fn internal_commit_retries(mut self, retries: u32) -> Self {
        self.internal_commit_retries = retries;
        self
    }
}
