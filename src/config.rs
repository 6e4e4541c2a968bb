//! Default tuning parameters for the HNSW index.
//!
//! These are the values used by the builder when a knob is not set
//! explicitly. `m` drives the derived parameters: `max_m = m`,
//! `max_m0 = 2 * m`, and `level_lambda = 1 / ln(m)`.

/// Default number of bidirectional links created per node per level.
///
/// Higher values improve recall on high-dimensional data at the cost of
/// memory and build time. Typical range: 2–100.
pub const DEFAULT_M: usize = 10;

/// Default width of the dynamic candidate list at query time.
///
/// The effective search width is `max(ef, k)` for a k-NN query.
pub const DEFAULT_EF: usize = 10;

/// Default width of the dynamic candidate list during construction.
///
/// The effective value is `max(ef_construction, m)`.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Whether soft deletion (and upsert-with-replace) is enabled by default.
pub const DEFAULT_REMOVE_ENABLED: bool = false;

/// How many inserted items between progress callbacks during bulk insert.
pub const DEFAULT_PROGRESS_UPDATE_INTERVAL: usize = 100_000;

/// Seed for the Murmur3 hash used in deterministic level assignment.
pub const LEVEL_HASH_SEED: u32 = 104_729;
