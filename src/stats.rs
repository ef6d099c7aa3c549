//! Statistics, updated in lockstep with every state transition.
//!
//! All fields are monotonic except `objects_in_use` and `free_objects`.

/// A snapshot of an [`crate::ObjectPool`]'s bookkeeping counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatistics {
    pub object_size: usize,
    pub page_size: usize,
    pub pages_in_use: usize,
    pub objects_in_use: usize,
    pub free_objects: usize,
    /// High-water mark for `objects_in_use`; never decreases.
    pub most_objects: usize,
    pub allocations: u64,
    pub deallocations: u64,
}
