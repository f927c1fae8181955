//! Point-in-time snapshots of the admission controller and the handle pool.

use serde_derive::Serialize;

/// Statistics about an [`AdmissionController`](crate::admission::AdmissionController).
///
/// # Example
///
/// ```rust,ignore
/// let stats = gate.admission().stats();
/// println!("{}/{} permits out, {} waiting", stats.outstanding, stats.limit, stats.queued);
/// ```
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    /// Maximum number of permits that may be outstanding at once.
    pub limit: usize,

    /// Permits granted and not yet released, including grants handed to a
    /// waiter that has not been polled yet.
    pub outstanding: usize,

    /// Callers suspended in the waiter queue.
    pub queued: usize,

    /// Total number of permits handed out since construction.
    pub total_granted: u64,
}

/// Statistics about a [`ResourcePool`](crate::pool::ResourcePool).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Generation of the current (or last) handle, bumped on every creation.
    pub generation: u64,

    /// Number of creation attempts started, successful or not.
    pub creations: u64,

    /// Whether a live handle is cached.
    pub ready: bool,

    /// Whether a creation is in flight.
    pub creating: bool,

    /// Whether the pool has been shut down.
    pub closed: bool,
}
