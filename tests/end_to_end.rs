// End-to-end coverage across the share directory, skipping the network
// layers (smtp/imap) and exercising send -> persist -> reload -> reconstruct
// -> index, the way a deployment's persisted share directory would be
// exercised by the index builder and receiver agent.

use pretty_assertions::assert_eq;
use privmail::record::{SequenceMap, ShareRecord};
use privmail::share::{recv, send};
use test_log::test;

#[test]
fn share_persist_reload_and_reconstruct_round_trips() {
  let directory = tempfile::tempdir().unwrap();
  let n = 3;

  let outbound = send::assemble("Quarterly Report", "The numbers are in the attached spreadsheet", n).unwrap();
  assert_eq!(outbound.len(), n);

  let mut sequence_map = SequenceMap::new();
  for message in &outbound {
    let record = recv::handle_envelope(
      "alice@example.com",
      &["bob@example.com".to_string()],
      &message.subject,
      &message.body,
      &mut sequence_map,
    );
    assert!(record.uid.is_some());
    privmail::record::persist(directory.path(), &record).unwrap();
  }

  let reloaded: Vec<ShareRecord> = privmail::record::load_all(directory.path()).unwrap();
  assert_eq!(reloaded.len(), n);

  let rebuilt_sequence_map = SequenceMap::reconstruct_from_records(&reloaded);
  assert_eq!(rebuilt_sequence_map.len(), 1);

  let mails = recv::reconstruct_from_records(&reloaded, n).unwrap();
  assert_eq!(mails.len(), 1);
  assert_eq!(mails[0].subject, "Quarterly Report");
  assert_eq!(mails[0].body, "The numbers are in the attached spreadsheet");
  assert_eq!(mails[0].sequence_number, 0);
}

#[test]
fn reconstructed_mails_feed_a_searchable_index() {
  let n = 2;
  let mut sequence_map = SequenceMap::new();

  let mut all_records = Vec::new();
  for subject in ["hello world", "hello again"] {
    let outbound = send::assemble(subject, subject, n).unwrap();
    for message in &outbound {
      all_records.push(recv::handle_envelope(
        "alice@example.com",
        &["bob@example.com".to_string()],
        &message.subject,
        &message.body,
        &mut sequence_map,
      ));
    }
  }

  let mails = recv::reconstruct_from_records(&all_records, n).unwrap();
  assert_eq!(mails.len(), 2);

  let index_files = privmail::index::build_index(&mails, n).unwrap();
  assert_eq!(index_files.len(), n);
  assert!(index_files.iter().all(|f| f.num_of_emails == 2));

  // "hello" occurs in both mails; its occurrence bitstring should have the
  // top two bits set once reconstructed.
  let entries = &index_files[0].index_buckets[&5];
  let hello_entry_index = (0..entries.len())
    .find(|&i| {
      let word_shares: Vec<String> = (0..n).map(|s| index_files[s].index_buckets[&5][i].keys().next().unwrap().clone()).collect();
      privmail::codec::reconstruct_string(&word_shares, true).unwrap() == "HELLO"
    })
    .expect("HELLO should be indexed");

  let occurrence_shares: Vec<Vec<u8>> = (0..n)
    .map(|s| index_files[s].index_buckets[&5][hello_entry_index].values().next().unwrap().clone())
    .collect();
  let mut occurrence = vec![0u8; occurrence_shares[0].len()];
  for share in &occurrence_shares {
    for (o, b) in occurrence.iter_mut().zip(share.iter()) {
      *o ^= b;
    }
  }
  assert_eq!(occurrence[0], 0b1100_0000);
}

#[test]
fn mismatched_share_count_is_skipped_not_corrupted() {
  let n = 3;
  let outbound = send::assemble("subject", "body", n).unwrap();
  let mut sequence_map = SequenceMap::new();
  let records: Vec<ShareRecord> = outbound[..2]
    .iter()
    .map(|m| recv::handle_envelope("a@example.com", &["b@example.com".to_string()], &m.subject, &m.body, &mut sequence_map))
    .collect();

  let mails = recv::reconstruct_from_records(&records, n).unwrap();
  assert!(mails.is_empty());
}
