//! Centralized default constants for the tabula system.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Minimum characters per chunk (smaller chunks may be merged).
pub const CHUNK_MIN_SIZE: usize = 100;

/// Overlap characters between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP: usize = 100;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// JOBS
// =============================================================================

/// Default maximum number of concurrently executing jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default per-job deadline; exceeding it forces the job to Failed.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Default page size when listing jobs.
pub const JOB_LIST_LIMIT: i64 = 50;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Error message written to a job row on external cancellation.
pub const JOB_CANCELLED_MESSAGE: &str = "Job cancelled by user";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Upper bound on pooled connections. The worker pool and the submission
/// side share one pool, so this caps total concurrent statements.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Connections kept open while idle.
pub const POOL_MIN_CONNECTIONS: u32 = 1;

/// How long an acquire waits before giving up (seconds).
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connections older than this are closed (seconds).
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// STORAGE
// =============================================================================

/// Default data directory for generated artifacts (podcast audio, uploads).
pub const DATA_DIR: &str = "data";
