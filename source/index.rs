// Index Builder (C8): computes per-word occurrence bitstrings across mails
// for each bucket size, then reshares both the words and their occurrence
// bitstrings.

use crate::error::Result;
use crate::share::recv::ReconstructedMail;
use crate::{codec, identifier};
use std::collections::BTreeMap;

/// Builds the ceil(num_of_emails/8)-byte big-endian occurrence bitstring for
/// `sequence_numbers`: bit `k` (MSB-first within byte `k/8`) is 1 iff `k` is
/// present.
pub fn construct_occurrence_array(sequence_numbers: &[u64], num_of_emails: u64) -> Vec<u8> {
  let len = ((num_of_emails + 7) / 8) as usize;
  let mut bytes = vec![0u8; len];
  for &k in sequence_numbers {
    let byte_index = (k / 8) as usize;
    let bit = 7 - (k % 8) as u32;
    if byte_index < bytes.len() {
      bytes[byte_index] |= 1 << bit;
    }
  }
  bytes
}

/// One recipient's share of the search index: `uid`/`num_of_emails` are
/// carried verbatim across all N files; `index_buckets` maps a bucket size
/// to a list of `(word_share, occurrence_share)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexShareFile {
  pub uid: String,
  pub num_of_emails: u64,
  pub index_buckets: BTreeMap<usize, Vec<BTreeMap<String, Vec<u8>>>>,
}

/// Builds the `N` index share files for the fully reconstructed `mails`.
pub fn build_index(mails: &[ReconstructedMail], n: usize) -> Result<Vec<IndexShareFile>> {
  let num_of_emails = mails.iter().map(|m| m.sequence_number).max().map_or(0, |m| m + 1);

  // bucket_size -> word -> occurring sequence numbers, preserving first-seen
  // word order within each bucket size.
  let mut order: BTreeMap<usize, Vec<String>> = BTreeMap::new();
  let mut occurrences: BTreeMap<usize, BTreeMap<String, Vec<u64>>> = BTreeMap::new();
  for mail in mails {
    for (&size, words) in &mail.buckets {
      for word in words {
        let by_word = occurrences.entry(size).or_default();
        if !by_word.contains_key(word) {
          order.entry(size).or_default().push(word.clone());
        }
        by_word.entry(word.clone()).or_default().push(mail.sequence_number);
      }
    }
  }

  let uid = identifier::make_uid();
  let mut files: Vec<IndexShareFile> = (0..n)
    .map(|_| IndexShareFile {
      uid: uid.clone(),
      num_of_emails,
      index_buckets: BTreeMap::new(),
    })
    .collect();

  for (size, words) in &order {
    let by_word = &occurrences[size];
    let mut per_file_entries: Vec<Vec<BTreeMap<String, Vec<u8>>>> = vec![Vec::new(); n];
    for word in words {
      let sequence_numbers = &by_word[word];
      let occurrence_bytes = construct_occurrence_array(sequence_numbers, num_of_emails);

      let word_shares = codec::share_string_truncated(word, n)?;
      let occurrence_shares = codec::share_bytes(&occurrence_bytes, n, 8)?;

      for i in 0..n {
        let mut entry = BTreeMap::new();
        entry.insert(word_shares[i].clone(), occurrence_shares[i].clone());
        per_file_entries[i].push(entry);
      }
    }
    for i in 0..n {
      files[i].index_buckets.insert(*size, std::mem::take(&mut per_file_entries[i]));
    }
  }

  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn occurrence_array_sets_expected_bits() {
    let bytes = construct_occurrence_array(&[0, 1, 8, 9], 10);
    assert_eq!(bytes.len(), 2);
    assert_eq!(bytes[0], 0b1100_0000);
    assert_eq!(bytes[1], 0b1100_0000);
  }

  #[test]
  fn occurrence_array_bit_count_matches_occurrences() {
    let bytes = construct_occurrence_array(&[0, 2, 4, 4], 8);
    let ones: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    // 4 appears twice in the input but only sets one bit.
    assert_eq!(ones, 3);
  }

  #[test]
  fn build_index_round_trips_words_and_occurrences() {
    let mails = vec![
      ReconstructedMail {
        uid: "uid0".into(),
        sequence_number: 0,
        subject: String::new(),
        body: String::new(),
        truncated_body: String::new(),
        buckets: BTreeMap::from([(5, vec!["HELLO".to_string()])]),
      },
      ReconstructedMail {
        uid: "uid1".into(),
        sequence_number: 1,
        subject: String::new(),
        body: String::new(),
        truncated_body: String::new(),
        buckets: BTreeMap::from([(5, vec!["HELLO".to_string(), "WORLD".to_string()])]),
      },
    ];
    let n = 3;
    let files = build_index(&mails, n).unwrap();
    assert_eq!(files.len(), n);
    assert_eq!(files[0].num_of_emails, 2);
    assert!(files.iter().all(|f| f.uid == files[0].uid));

    let entry_count = files[0].index_buckets[&5].len();
    let mut reconstructed_words = Vec::new();
    let mut reconstructed_occurrences = BTreeMap::new();
    for entry_index in 0..entry_count {
      let word_shares: Vec<String> = (0..n)
        .map(|i| files[i].index_buckets[&5][entry_index].keys().next().unwrap().clone())
        .collect();
      let word = codec::reconstruct_string(&word_shares, true).unwrap();

      let occurrence_shares: Vec<Vec<u8>> = (0..n)
        .map(|i| files[i].index_buckets[&5][entry_index].values().next().unwrap().clone())
        .collect();
      let mut occurrence = vec![0u8; occurrence_shares[0].len()];
      for share in &occurrence_shares {
        for (o, b) in occurrence.iter_mut().zip(share.iter()) {
          *o ^= b;
        }
      }
      reconstructed_words.push(word.clone());
      reconstructed_occurrences.insert(word, occurrence);
    }

    assert_eq!(reconstructed_words.len(), 2);
    assert!(reconstructed_words.contains(&"HELLO".to_string()));
    assert!(reconstructed_words.contains(&"WORLD".to_string()));
    // HELLO appears in both mails (sequence 0 and 1): top two bits set.
    assert_eq!(reconstructed_occurrences["HELLO"][0], 0b1100_0000);
    // WORLD appears only in mail 1: second-from-top bit set.
    assert_eq!(reconstructed_occurrences["WORLD"][0], 0b0100_0000);
  }
}
