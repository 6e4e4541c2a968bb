//! Support structures for the graph engine.

/// Dense bit-set over `u32` words, used for visited tracking and the
/// excluded-candidates set.
pub mod bitset;
/// Murmur3 32-bit hash, used for deterministic level assignment.
pub mod murmur;
/// Bounded blocking object pool, used to recycle visited bit-sets.
pub mod pool;

pub use bitset::ArrayBitSet;
pub use pool::ObjectPool;
