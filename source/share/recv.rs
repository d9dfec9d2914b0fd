// Share Reassembler (receive side, C7): group share records by UID and
// reconstruct the shared fields.

use crate::error::Result;
use crate::record::{SequenceMap, ShareRecord};
use crate::{codec, framing, identifier};
use std::collections::BTreeMap;

/// Parses an inbound SMTP DATA envelope into a [`ShareRecord`]. If the body
/// does not contain a Body scheme, the subject/body are stored verbatim with
/// no UID handling (per spec: "if absent ... returns").
pub fn handle_envelope(
  mail_from: &str,
  rcpt_tos: &[String],
  subject: &str,
  body: &str,
  sequence_map: &mut SequenceMap,
) -> ShareRecord {
  let (has_scheme, _) = framing::contains_scheme(body, framing::BEGIN, framing::END);
  if !has_scheme {
    return ShareRecord {
      uid: None,
      sequence_number: None,
      mail_from: mail_from.to_string(),
      rcpt_tos: rcpt_tos.to_vec(),
      from: None,
      to: None,
      subject: subject.to_string(),
      body: body.to_string(),
      secret_share_block: String::new(),
      secret_share_truncated_block: String::new(),
      secret_share_bucket_blocks: BTreeMap::new(),
    };
  }

  let (uid, clean_subject) = match identifier::split_uid(subject) {
    Ok(parts) => parts,
    Err(error) => {
      log::warn!("body carries a share scheme but subject has no valid uid: {error}");
      return ShareRecord {
        uid: None,
        sequence_number: None,
        mail_from: mail_from.to_string(),
        rcpt_tos: rcpt_tos.to_vec(),
        from: None,
        to: None,
        subject: subject.to_string(),
        body: body.to_string(),
        secret_share_block: String::new(),
        secret_share_truncated_block: String::new(),
        secret_share_bucket_blocks: BTreeMap::new(),
      };
    }
  };

  let sequence_number = sequence_map.update(&uid);
  let extracted = framing::extract_blocks(body);
  let bucket_blocks: BTreeMap<usize, Vec<String>> = extracted
    .bucket_blocks
    .into_iter()
    .filter(|(size, _)| framing::BUCKET_SCHEME.contains(size))
    .collect();

  ShareRecord {
    uid: Some(uid),
    sequence_number: Some(sequence_number),
    mail_from: mail_from.to_string(),
    rcpt_tos: rcpt_tos.to_vec(),
    from: None,
    to: None,
    subject: clean_subject,
    body: extracted.body_remainder,
    secret_share_block: extracted.share_block,
    secret_share_truncated_block: extracted.truncated_block,
    secret_share_bucket_blocks: bucket_blocks,
  }
}

/// One fully reconstructed original message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedMail {
  pub uid: String,
  pub sequence_number: u64,
  pub subject: String,
  pub body: String,
  pub truncated_body: String,
  pub buckets: BTreeMap<usize, Vec<String>>,
}

/// Groups `records` by UID and reconstructs each group. Groups whose share
/// count differs from `n`, or that lack a UID, are skipped with a logged
/// error rather than best-effort reconstructed (see DESIGN.md's resolution
/// of the corresponding Open Question).
pub fn reconstruct_from_records(records: &[ShareRecord], n: usize) -> Result<Vec<ReconstructedMail>> {
  let mut groups: BTreeMap<String, Vec<&ShareRecord>> = BTreeMap::new();
  for record in records {
    match &record.uid {
      Some(uid) => groups.entry(uid.clone()).or_default().push(record),
      None => log::warn!("share record without a uid, skipping for reconstruction"),
    }
  }

  let mut mails = Vec::new();
  for (uid, group) in groups {
    if group.len() != n {
      log::error!(
        "uid {uid} has {} share record(s), expected {n}; skipping",
        group.len()
      );
      continue;
    }

    let sequence_number = group[0].sequence_number.unwrap_or(0);
    if group
      .iter()
      .any(|r| r.sequence_number.unwrap_or(0) != sequence_number)
    {
      log::warn!("uid {uid} has mismatched sequence numbers across shares; using the first");
    }

    let subjects: Vec<String> = group.iter().map(|r| r.subject.clone()).collect();
    let subject = codec::reconstruct_string(&subjects, false)?;

    let share_blocks: Vec<String> = group.iter().map(|r| r.secret_share_block.clone()).collect();
    let body = codec::reconstruct_string(&share_blocks, false)?;

    let truncated_blocks: Vec<String> = group
      .iter()
      .map(|r| r.secret_share_truncated_block.clone())
      .collect();
    let truncated_body = codec::reconstruct_string(&truncated_blocks, true)?;

    let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut all_sizes: std::collections::BTreeSet<usize> = std::collections::BTreeSet::new();
    for record in &group {
      all_sizes.extend(record.secret_share_bucket_blocks.keys().copied());
    }
    for size in all_sizes {
      if !framing::BUCKET_SCHEME.contains(&size) {
        log::warn!("uid {uid} bucket size {size} is not in the known bucket scheme; dropping");
        continue;
      }
      let columns: Vec<&Vec<String>> = group
        .iter()
        .map(|r| r.secret_share_bucket_blocks.get(&size))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();
      if columns.len() != n {
        log::warn!("uid {uid} bucket size {size} is missing from some shares; dropping");
        continue;
      }
      let word_count = columns[0].len();
      if columns.iter().any(|c| c.len() != word_count) {
        log::warn!("uid {uid} bucket size {size} has mismatched word counts across shares; dropping");
        continue;
      }
      let mut words = Vec::with_capacity(word_count);
      for word_index in 0..word_count {
        let tuple: Vec<String> = columns.iter().map(|c| c[word_index].clone()).collect();
        words.push(codec::reconstruct_string(&tuple, true)?);
      }
      buckets.insert(size, words);
    }

    mails.push(ReconstructedMail {
      uid,
      sequence_number,
      subject,
      body,
      truncated_body,
      buckets,
    });
  }

  Ok(mails)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::share::send;

  #[test]
  fn end_to_end_share_and_reconstruct() {
    let outbound = send::assemble("Subj", "Hello", 3).unwrap();
    let mut sequence_map = SequenceMap::new();
    let records: Vec<ShareRecord> = outbound
      .iter()
      .map(|m| handle_envelope("a@example.com", &["b@example.com".to_string()], &m.subject, &m.body, &mut sequence_map))
      .collect();

    for record in &records {
      assert!(record.uid.is_some());
    }

    let mails = reconstruct_from_records(&records, 3).unwrap();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].subject, "Subj");
    assert_eq!(mails[0].body, "Hello");
    assert_eq!(mails[0].truncated_body, "HELLO");
  }

  #[test]
  fn skips_uid_groups_with_wrong_share_count() {
    let outbound = send::assemble("Subj", "Hello", 3).unwrap();
    let mut sequence_map = SequenceMap::new();
    let records: Vec<ShareRecord> = outbound[..2]
      .iter()
      .map(|m| handle_envelope("a@example.com", &["b@example.com".to_string()], &m.subject, &m.body, &mut sequence_map))
      .collect();
    let mails = reconstruct_from_records(&records, 3).unwrap();
    assert!(mails.is_empty());
  }

  #[test]
  fn handle_envelope_without_scheme_passes_through() {
    let mut sequence_map = SequenceMap::new();
    let record = handle_envelope("a@example.com", &[], "hi", "just text, no blocks", &mut sequence_map);
    assert!(record.uid.is_none());
    assert_eq!(record.body, "just text, no blocks");
  }
}
