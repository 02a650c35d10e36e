use std::path::PathBuf;

use log::LevelFilter;
use structopt::StructOpt;

const MIN_DIR_LEN: usize = 5;

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "strandb core")]
pub struct Opt {
  /// Base directory where partition segments, snapshots, and the
  /// metadata/config directory are persisted.
  #[structopt(long)]
  pub dir: PathBuf,

  #[structopt(long, default_value = "7820")]
  pub port: u16,

  #[structopt(long, default_value = "INFO")]
  pub log_level: LevelFilter,

  /// Default arena size that triggers an opportunistic commit; a table
  /// may override this via `TableConfig::max_arena_records`.
  #[structopt(long, default_value = "131072")]
  pub default_max_arena_records: usize,

  /// Default cumulative segment-byte threshold that triggers a split
  /// proposal; a table may override this via `TableConfig::split_threshold_bytes`.
  #[structopt(long, default_value = "134217728")]
  pub default_split_threshold_bytes: u64,

  /// Default replication factor used when allocating servers for a split.
  #[structopt(long, default_value = "3")]
  pub default_replication_factor: usize,

  /// How often the background loop compacts each loaded partition.
  #[structopt(long, default_value = "10")]
  pub compaction_loop_seconds: u64,
}

impl Opt {
  pub fn validate(&self) {
    let canonical = self.dir.canonicalize().expect("unable to canonicalize dir - make sure it exists");
    let dir_str = canonical.to_str().expect("dir was not a valid string");
    if dir_str.len() < MIN_DIR_LEN {
      panic!("suspiciously short length for dir; please choose a more specific path");
    }
  }
}
