use crate::errors::ServerResult;

/// Stands in for the collaborator interface the owning `Partition`
/// exposes (`get_reader()`); the columnar file format and its scan
/// machinery are out of scope here; this core only needs the one
/// aggregate a reader scan can produce.
#[async_trait::async_trait]
pub trait PartitionKeyReader: Send + Sync {
  /// Returns `(min, median, max)` partition-key values observed across
  /// the partition's current data. `min == median` or `median == max`
  /// signals no usable split point.
  async fn find_median_value(&self) -> ServerResult<(Vec<u8>, Vec<u8>, Vec<u8>)>;
}
