// Persisted share records, the UID->sequence map, and unique filename
// generation for the share directory.

use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One (original-message, share-index) pair, as persisted to the share
/// directory by the receiver SMTP daemon.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShareRecord {
  pub uid: Option<String>,
  pub sequence_number: Option<u64>,
  pub mail_from: String,
  pub rcpt_tos: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub from: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub to: Option<String>,
  pub subject: String,
  pub body: String,
  #[serde(rename = "SECRET_SHARE_BLOCK")]
  pub secret_share_block: String,
  #[serde(rename = "SECRET_SHARE_TRUNCATED_BLOCK")]
  pub secret_share_truncated_block: String,
  #[serde(rename = "SECRET_SHARE_BUCKET_BLOCKS")]
  pub secret_share_bucket_blocks: BTreeMap<usize, Vec<String>>,
}

/// Dense, 0-based first-seen ordering of UIDs, rebuildable from any
/// permutation of persisted ShareRecords.
#[derive(Debug, Default)]
pub struct SequenceMap {
  map: HashMap<String, u64>,
}

impl SequenceMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, uid: &str) -> Option<u64> {
    self.map.get(uid).copied()
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  /// Assigns `uid` a sequence number if it hasn't been seen yet: 0 if the
  /// map is empty, otherwise one past the current maximum. Returns the
  /// (possibly pre-existing) sequence number for `uid`.
  pub fn update(&mut self, uid: &str) -> u64 {
    if let Some(&existing) = self.map.get(uid) {
      return existing;
    }
    let next = self.map.values().max().map_or(0, |m| m + 1);
    self.map.insert(uid.to_string(), next);
    next
  }

  /// Rebuilds the map by scanning `records` in order; a UID seen again with
  /// a different previously-assigned sequence number logs a warning but the
  /// first-seen assignment wins.
  pub fn reconstruct_from_records<'a>(records: impl IntoIterator<Item = &'a ShareRecord>) -> Self {
    let mut this = Self::new();
    for record in records {
      let Some(uid) = record.uid.as_deref() else {
        log::warn!("share record without a uid, skipping for sequence reconstruction");
        continue;
      };
      match (this.map.get(uid).copied(), record.sequence_number) {
        (Some(existing), Some(seen)) if existing != seen => {
          log::warn!("uid {uid} sequence mismatch: have {existing}, record says {seen}");
        }
        (None, _) => {
          this.update(uid);
        }
        _ => {}
      }
    }
    this
  }
}

/// Generates `{base_path}/{YYMMDD-HHMMSS}_{base64url-6B}.yaml`, creating
/// `base_path` if needed.
pub fn unique_filename(base_path: &Path) -> Result<PathBuf> {
  use base64::Engine as _;
  use rand::RngCore as _;

  std::fs::create_dir_all(base_path)?;
  let timestamp = chrono::Local::now().format("%y%m%d-%H%M%S");
  let mut suffix = [0u8; 6];
  rand::rngs::OsRng.fill_bytes(&mut suffix);
  let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(suffix);
  Ok(base_path.join(format!("{timestamp}_{token}.yaml")))
}

/// Persists `record` to a freshly generated unique filename under
/// `base_path`, returning the path written.
pub fn persist(base_path: &Path, record: &ShareRecord) -> Result<PathBuf> {
  let path = unique_filename(base_path)?;
  let file = std::fs::File::create(&path)?;
  serde_yaml::to_writer(file, record)
    .map_err(|e| crate::error::Error::InvalidEncoding(format!("failed to write yaml: {e}")))?;
  Ok(path)
}

/// Loads every `*.yaml` ShareRecord directly under `directory`.
pub fn load_all(directory: &Path) -> Result<Vec<ShareRecord>> {
  let mut records = Vec::new();
  let mut entries: Vec<_> = std::fs::read_dir(directory)?
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
    .collect();
  entries.sort();
  for path in entries {
    let file = std::fs::File::open(&path)?;
    match serde_yaml::from_reader::<_, ShareRecord>(file) {
      Ok(record) => records.push(record),
      Err(error) => log::warn!("skipping {path:?}: {error}"),
    }
  }
  Ok(records)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record_with_uid(uid: &str, sequence_number: Option<u64>) -> ShareRecord {
    ShareRecord {
      uid: Some(uid.to_string()),
      sequence_number,
      mail_from: "a@example.com".into(),
      rcpt_tos: vec!["b@example.com".into()],
      from: None,
      to: None,
      subject: String::new(),
      body: String::new(),
      secret_share_block: String::new(),
      secret_share_truncated_block: String::new(),
      secret_share_bucket_blocks: BTreeMap::new(),
    }
  }

  #[test]
  fn sequence_map_assigns_dense_first_seen_order() {
    let mut map = SequenceMap::new();
    assert_eq!(map.update("uid_0"), 0);
    assert_eq!(map.update("uid_1"), 1);
    assert_eq!(map.update("uid_2"), 2);
    assert_eq!(map.update("uid_0"), 0);
  }

  #[test]
  fn reconstruction_is_independent_of_order() {
    let mut records = vec![
      record_with_uid("uid_0", Some(0)),
      record_with_uid("uid_1", Some(1)),
      record_with_uid("uid_2", Some(2)),
      record_with_uid("uid_1", Some(1)),
    ];
    let a = SequenceMap::reconstruct_from_records(&records);
    records.reverse();
    let b = SequenceMap::reconstruct_from_records(&records);
    for uid in ["uid_0", "uid_1", "uid_2"] {
      assert_eq!(a.get(uid).is_some(), b.get(uid).is_some());
    }
    let mut seen: Vec<u64> = a.map.values().copied().collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
  }

  #[test]
  fn reconstruction_skips_records_without_uid() {
    let mut record = record_with_uid("uid_0", Some(0));
    record.uid = None;
    let map = SequenceMap::reconstruct_from_records(&[record]);
    assert!(map.is_empty());
  }
}
