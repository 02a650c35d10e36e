//! Platform defaults. The spec calls these "platform constants"; tables
//! may override the tunable ones through `TableConfig`.

/// Versions are microsecond wallclock timestamps. Anything at or below
/// this bound predates the epoch this format was introduced with, and
/// records carrying such a version are rejected at the boundary.
pub const MIN_VALID_VERSION: u64 = 1_400_000_000_000_000;

/// Hard ceiling on live segments per partition; inserts are rejected
/// with `Overloaded` above this, regardless of table overrides.
pub const MAX_LSM_SEGMENTS: usize = 32;

/// Soft ceiling: at or above this many segments, compaction is urgent.
pub const URGENT_COMPACTION_SEGMENT_COUNT: usize = 16;

/// Default arena size (records) that triggers an opportunistic commit.
pub const DEFAULT_MAX_ARENA_RECORDS: usize = 131_072;

/// Default cumulative segment-byte threshold that triggers a split
/// proposal. Tables may override via `TableConfig::split_threshold_bytes`.
pub const DEFAULT_PARTITION_SPLIT_THRESHOLD_BYTES: u64 = 128 * 1024 * 1024;

/// Default replication factor used when allocating servers for a split.
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Bound on the skip-index cache (number of segment files cached).
pub const SKIP_INDEX_CACHE_SIZE: usize = 4096;

/// Bound on the file tracker's in-memory pending-delete ledger before
/// it is consulted for a sweep regardless of the background cadence.
pub const FILE_TRACKER_SWEEP_BATCH: usize = 1024;

pub const SEGMENT_FILE_EXTENSION: &str = "cst";
pub const SKIP_INDEX_FILE_EXTENSION: &str = "idx";
pub const SNAPSHOT_METADATA_FILENAME: &str = "partition_snapshot.json";
pub const FILE_TRACKER_LEDGER_FILENAME: &str = "pending_deletes.json";
pub const TABLE_CONFIG_FILENAME: &str = "table_config.json";
pub const METADATA_FILE_FILENAME: &str = "metadata_file.json";

/// Default HTTP timeout for outbound metadata RPCs.
pub const METADATA_RPC_TIMEOUT_MILLIS: u64 = 5_000;
