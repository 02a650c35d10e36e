use std::fmt;
use std::fmt::{Display, Formatter};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::errors::{ServerError, ServerResult};

/// 128-bit record identifier.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
pub struct RecordId(pub u128);

impl Display for RecordId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{:032x}", self.0)
  }
}

/// Microsecond-wallclock monotonic version. `Version::parse` enforces
/// the `version > MIN_VALID_VERSION` boundary invariant.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl Version {
  pub fn parse(raw: u64) -> ServerResult<Version> {
    if raw <= crate::constants::MIN_VALID_VERSION {
      Err(ServerError::illegal_argument(format!(
        "version {} must exceed {}",
        raw,
        crate::constants::MIN_VALID_VERSION,
      )))
    } else {
      Ok(Version(raw))
    }
  }

  /// Sentinel meaning "no record with this id has ever been seen."
  pub const ABSENT: Version = Version(0);

  pub fn is_absent(&self) -> bool {
    self.0 == 0
  }
}

impl Display for Version {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// SHA1-derived partition identifier, randomly allocated at partition
/// creation or split time.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct PartitionId(pub [u8; 20]);

impl PartitionId {
  pub fn random() -> PartitionId {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    PartitionId(bytes)
  }
}

impl Display for PartitionId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    for byte in &self.0 {
      write!(f, "{:02x}", byte)?;
    }
    Ok(())
  }
}

/// A content checksum over a serialized metadata file, also SHA1-derived.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 20]);

impl Checksum {
  pub fn of(bytes: &[u8]) -> Checksum {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Checksum(out)
  }
}

impl Display for Checksum {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    for byte in &self.0 {
      write!(f, "{:02x}", byte)?;
    }
    Ok(())
  }
}

/// A transaction id for a metadata file: also SHA1-shaped, but allocated
/// fresh for every metadata operation rather than derived from content.
pub type TxnId = PartitionId;

#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl Display for ServerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PlacementId(pub String);

impl PlacementId {
  pub fn random() -> PlacementId {
    PlacementId(uuid::Uuid::new_v4().to_string())
  }
}

/// Half-open `[begin, end)` range of encoded partition-key bytes. `end =
/// None` means "unbounded" (the last partition in the table).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Keyrange {
  pub begin: Vec<u8>,
  pub end: Option<Vec<u8>>,
}

impl Keyrange {
  pub fn full() -> Keyrange {
    Keyrange { begin: Vec::new(), end: None }
  }

  pub fn contains(&self, key: &[u8]) -> bool {
    key >= self.begin.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceTable {
  pub namespace: String,
  pub table: String,
}

impl Display for NamespaceTable {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.namespace, self.table)
  }
}

/// Partition lifecycle state machine; transitions are driven exclusively
/// by `PartitionWriter::apply_metadata_change`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum LifecycleState {
  Load,
  Serve,
  Unload,
  UnloadAndDelete,
}

impl Default for LifecycleState {
  fn default() -> Self {
    LifecycleState::Load
  }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ServerStatus {
  Up,
  Down,
}
