//! Documented constants for the questionnaire engine
//!
//! All tunable defaults live here; anything operational can be overridden
//! through `PRASHNA_*` environment variables (see `config`).

// =============================================================================
// CIRCUIT BREAKER DEFAULTS
// =============================================================================

/// Rolling window over which primary-store failures are counted (seconds).
///
/// Samples older than the window no longer influence the failure rate, so a
/// burst of failures ages out after this interval even without successes.
pub const DEFAULT_BREAKER_WINDOW_SECS: u64 = 30;

/// Failure-rate threshold that trips the breaker CLOSED -> OPEN.
///
/// Evaluated only once the window holds at least
/// [`DEFAULT_BREAKER_MIN_SAMPLES`] samples, so a single failed call on a
/// quiet instance does not open the breaker.
pub const DEFAULT_BREAKER_FAILURE_RATE: f64 = 0.5;

/// Minimum samples in the window before the failure rate is evaluated.
pub const DEFAULT_BREAKER_MIN_SAMPLES: usize = 4;

/// Cooldown before an OPEN breaker admits a single HALF_OPEN probe (seconds).
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 15;

// =============================================================================
// TIER TIMEOUTS
// =============================================================================

/// Upper bound on any single primary-store call (milliseconds).
///
/// A timed-out call counts as a breaker failure and triggers the next tier.
pub const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 2_000;

/// Upper bound on a cache-service round trip (milliseconds). Cache failures
/// are swallowed, so this only bounds added latency on the fallback path.
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 1_500;

/// Upper bound on an object-storage round trip (milliseconds).
pub const DEFAULT_BLOB_TIMEOUT_MS: u64 = 3_000;

// =============================================================================
// CACHE / SNAPSHOT
// =============================================================================

/// Per-entry TTL for the in-memory cache backend (seconds).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 900;

/// Interval between dataset snapshot rebuilds (seconds). A rebuild still in
/// flight when the next tick fires causes that tick to be skipped.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 1_800;

/// Cache type discriminator for per-action assembled questionnaires.
pub const CACHE_TYPE_QUESTIONNAIRE: &str = "questionnaire";

/// Cache type discriminator for snapshot groups keyed by action id.
pub const CACHE_TYPE_DATASET: &str = "dataset";

/// Cache type discriminator for snapshot rule groups keyed by flow.
pub const CACHE_TYPE_DATASET_RULES: &str = "dataset_rules";

// =============================================================================
// HTTP SURFACE
// =============================================================================

/// Max in-flight requests before new connections queue.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 200;

/// Rate limit defaults sized for interactive scheduling clients.
pub const DEFAULT_RATE_LIMIT_PER_SECOND: u64 = 500;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 1_000;

/// Fixed status code returned when every retrieval tier misses.
pub const UNAVAILABLE_CODE: &str = "QUESTIONNAIRE_TEMPORARILY_UNAVAILABLE";
