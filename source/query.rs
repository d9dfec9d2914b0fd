// Length-mask construction and NOT/OR/AND modifier-chain bit packing for
// secret-shared search queries, plus the query share file assembled from
// them. Grounded on `construct_search_query.py`'s
// `secret_share_and_store`.

use crate::error::{Error, Result};
use crate::{bucketing, codec, identifier};

const LENGTH_MASK_RESIDUALS: [u8; 9] = [0, 128, 192, 224, 240, 248, 252, 254, 255];
const MODIFIER_BITS: [u8; 8] = [128, 64, 32, 16, 8, 4, 2, 1];

/// A fixed 6-byte big-endian bitstring with the top `len` bits set,
/// regardless of `len` (hides the true keyword length). `len` beyond 48
/// cannot be represented in 6 bytes and is rejected, per the documented
/// deviation from the source's 7-byte overflow for `len >= 48`.
pub fn length_mask(len: i64) -> Result<[u8; 6]> {
  if len < 0 {
    return Err(Error::ArgumentShapeMismatch(format!(
      "keyword_length must be >= 0, got {len}"
    )));
  }
  if len > 48 {
    return Err(Error::ArgumentShapeMismatch(format!(
      "keyword_length {len} exceeds the 6-byte length mask capacity of 48"
    )));
  }
  let mut bytes = [0u8; 6];
  let mut remaining = len as usize;
  for byte in bytes.iter_mut() {
    if remaining >= 8 {
      *byte = 255;
      remaining -= 8;
    } else {
      *byte = LENGTH_MASK_RESIDUALS[remaining];
      remaining = 0;
    }
  }
  Ok(bytes)
}

/// Modifier/sequence chain bit-packing. `sequence[-1]` must be `""`;
/// `modifiers` is `"NOT"|""` per clause; `sequence` is `"AND"|"OR"|""`
/// between clauses. Interleaves `modifiers[0], sequence[0], modifiers[1],
/// sequence[1], ..., modifiers[-1]` (the trailing empty sequence entry is
/// dropped), then packs a 1 bit (MSB-first) for every `NOT`/`OR` entry.
pub fn modifier_encoding(modifiers: &[&str], sequence: &[&str]) -> Result<Vec<u8>> {
  if modifiers.len() != sequence.len() {
    return Err(Error::ArgumentShapeMismatch(format!(
      "modifiers and sequence must have equal length, got {} and {}",
      modifiers.len(),
      sequence.len()
    )));
  }
  if sequence.is_empty() || *sequence.last().unwrap() != "" {
    return Err(Error::ArgumentShapeMismatch(
      "sequence's last entry must be empty".into(),
    ));
  }
  if !modifiers.iter().all(|m| *m == "NOT" || *m == "") {
    return Err(Error::ArgumentShapeMismatch(format!(
      "modifiers must each be \"NOT\" or \"\", got {modifiers:?}"
    )));
  }
  if !sequence[..sequence.len() - 1]
    .iter()
    .all(|s| *s == "OR" || *s == "AND")
  {
    return Err(Error::ArgumentShapeMismatch(format!(
      "sequence must each be \"OR\" or \"AND\" (last excluded), got {sequence:?}"
    )));
  }

  let mut interleaved = Vec::with_capacity(modifiers.len() * 2);
  for (m, s) in modifiers.iter().zip(sequence.iter()) {
    interleaved.push(*m);
    interleaved.push(*s);
  }
  interleaved.pop(); // drop the trailing empty sequence entry

  let mut bytes = Vec::with_capacity(interleaved.len().div_ceil_8());
  let mut current = 0u8;
  for (index, entry) in interleaved.iter().enumerate() {
    if index % 8 == 0 && index != 0 {
      bytes.push(current);
      current = 0;
    }
    if entry.eq_ignore_ascii_case("NOT") || entry.eq_ignore_ascii_case("OR") {
      current += MODIFIER_BITS[index % 8];
    }
  }
  bytes.push(current);
  Ok(bytes)
}

/// One keyword clause's share: the IMAP field it searches plus, unless the
/// keyword is empty (a field-only clause like `ALL`), its raw/truncated/
/// bucketed shares and length mask.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct QueryKeywordShare {
  pub field: String,
  #[serde(rename = "KEYWORD", skip_serializing_if = "Option::is_none")]
  pub keyword: Option<String>,
  #[serde(rename = "KEYWORD_LENGTH_MASK", skip_serializing_if = "Option::is_none")]
  pub keyword_length_mask: Option<Vec<u8>>,
  #[serde(rename = "KEYWORD_TRUNCATED", skip_serializing_if = "Option::is_none")]
  pub keyword_truncated: Option<String>,
  #[serde(rename = "KEYWORD_BUCKETED", skip_serializing_if = "Option::is_none")]
  pub keyword_bucketed: Option<String>,
  pub keyword_bucket_size: usize,
}

/// One recipient's share of a secret-shared search query, written out by
/// the query builder and consumed by the receiver agent.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryShareFile {
  pub uid: String,
  pub keywords: Vec<QueryKeywordShare>,
  #[serde(rename = "not_modifiers")]
  pub not_modifier: Vec<bool>,
  pub sequence_modifiers: Vec<String>,
  #[serde(rename = "MODIFIER_CHAIN_SHARE")]
  pub modifier_chain_share: Vec<u8>,
  pub bucket_scheme: Vec<usize>,
}

/// Builds the `n` query share files for one clause list. `keywords`,
/// `fields` and `modifiers` must all have the same length; `sequence` must
/// be one shorter with a trailing `""`, per [`modifier_encoding`]. Mirrors
/// `construct_search_query.py`'s `secret_share_and_store`.
pub fn build_query(keywords: &[&str], fields: &[&str], modifiers: &[&str], sequence: &[&str], n: usize) -> Result<Vec<QueryShareFile>> {
  if keywords.len() != fields.len() || keywords.len() != modifiers.len() {
    return Err(Error::ArgumentShapeMismatch(format!(
      "keywords ({}), fields ({}) and modifiers ({}) must have equal length",
      keywords.len(),
      fields.len(),
      modifiers.len()
    )));
  }

  let modifier_chain_share = {
    let encoded = modifier_encoding(modifiers, sequence)?;
    codec::share_bytes(&encoded, n, 8)?
  };

  let mut per_keyword_shares: Vec<Vec<QueryKeywordShare>> = vec![Vec::with_capacity(keywords.len()); n];
  for (&keyword, &field) in keywords.iter().zip(fields.iter()) {
    if keyword.is_empty() {
      for shares in per_keyword_shares.iter_mut() {
        shares.push(QueryKeywordShare {
          field: field.to_string(),
          keyword_bucket_size: 0,
          ..Default::default()
        });
      }
      continue;
    }

    let bucketed = bucketing::bucket_keyword(keyword);
    let bucket_size = bucketed.chars().count();

    let keyword_shares = codec::share_string_raw(keyword, n)?;
    let truncated_shares = codec::share_string_truncated(keyword, n)?;
    let length_mask_shares = codec::share_bytes(&length_mask(keyword.chars().count() as i64)?, n, 8)?;
    let bucketed_shares = if bucket_size > 0 {
      codec::share_string_truncated(&bucketed, n)?
    } else {
      vec![String::new(); n]
    };

    for i in 0..n {
      per_keyword_shares[i].push(QueryKeywordShare {
        field: field.to_string(),
        keyword: Some(keyword_shares[i].clone()),
        keyword_length_mask: Some(length_mask_shares[i].clone()),
        keyword_truncated: Some(truncated_shares[i].clone()),
        keyword_bucketed: if bucket_size > 0 { Some(bucketed_shares[i].clone()) } else { None },
        keyword_bucket_size: bucket_size,
      });
    }
  }

  let not_modifier: Vec<bool> = modifiers
    .iter()
    .map(|m| m.eq_ignore_ascii_case("NOT"))
    .collect();
  let sequence_modifiers: Vec<String> = sequence[..sequence.len() - 1]
    .iter()
    .map(|s| if s.eq_ignore_ascii_case("OR") { "OR".to_string() } else { "AND".to_string() })
    .collect();

  let uid = identifier::make_uid();
  Ok(
    (0..n)
      .map(|i| QueryShareFile {
        uid: uid.clone(),
        keywords: per_keyword_shares[i].clone(),
        not_modifier: not_modifier.clone(),
        sequence_modifiers: sequence_modifiers.clone(),
        modifier_chain_share: modifier_chain_share[i].clone(),
        bucket_scheme: crate::framing::BUCKET_SCHEME.to_vec(),
      })
      .collect(),
  )
}

/// Builds the plaintext IMAPv4 SEARCH string equivalent to one `--keywords`
/// clause list, for direct use against an unshared mailbox or for operator
/// reference. Mirrors `parse_input_arguments`'s reversed-list walk across
/// `sequence`, `modifiers`, `fields`, `keywords`: for each clause index it
/// emits sequence, then modifier, then field, then keyword (skipping `AND`
/// and empty entries), stopping the moment any list runs out of entries
/// for that index.
pub fn build_search_string(keywords: &[&str], fields: &[&str], modifiers: &[&str], sequence: &[&str]) -> String {
  let clause_lists: [&[&str]; 4] = [sequence, modifiers, fields, keywords];
  let mut search_query = String::new();
  'outer: for index in 0..keywords.len() {
    for clause in clause_lists {
      if index > clause.len().saturating_sub(1) {
        break 'outer;
      }
      let term = clause[index];
      if term.eq_ignore_ascii_case("and") || term.is_empty() {
        continue;
      }
      search_query.push_str(term);
      search_query.push(' ');
    }
  }
  search_query.trim_end().to_string()
}

trait DivCeil8 {
  fn div_ceil_8(self) -> usize;
}

impl DivCeil8 for usize {
  fn div_ceil_8(self) -> usize {
    (self + 7) / 8
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn length_mask_known_vectors() {
    assert_eq!(length_mask(9).unwrap(), [255, 128, 0, 0, 0, 0]);
    assert_eq!(length_mask(0).unwrap(), [0, 0, 0, 0, 0, 0]);
    assert_eq!(length_mask(40).unwrap(), [255, 255, 255, 255, 255, 0]);
  }

  #[test]
  fn length_mask_rejects_negative_and_overlong() {
    assert!(length_mask(-1).is_err());
    assert!(length_mask(49).is_err());
  }

  #[test]
  fn length_mask_top_bits_set() {
    for len in 0..=48 {
      let mask = length_mask(len).unwrap();
      let mut bits = String::new();
      for byte in mask {
        bits += &format!("{byte:08b}");
      }
      let ones = bits.chars().take(len as usize).filter(|&c| c == '1').count();
      assert_eq!(ones, len as usize);
      assert!(bits.chars().skip(len as usize).all(|c| c == '0'));
    }
  }

  #[test]
  fn modifier_encoding_known_vectors() {
    assert_eq!(
      modifier_encoding(&["", "", ""], &["AND", "OR", ""]).unwrap(),
      vec![16]
    );
    assert_eq!(
      modifier_encoding(
        &["NOT", "NOT", "NOT", "NOT", "NOT"],
        &["OR", "OR", "OR", "OR", ""]
      )
      .unwrap(),
      vec![255, 128]
    );
  }

  #[test]
  fn modifier_encoding_rejects_bad_shape() {
    assert!(modifier_encoding(&["NOT"], &["AND", ""]).is_err());
    assert!(modifier_encoding(&["NOT", ""], &["AND", "AND"]).is_err());
    assert!(modifier_encoding(&["MAYBE"], &[""]).is_err());
  }

  #[test]
  fn build_query_round_trips_single_keyword() {
    let files = build_query(&["Bob"], &["FROM"], &[""], &[""], 3).unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.uid == files[0].uid));

    let raw_shares: Vec<String> = files.iter().map(|f| f.keywords[0].keyword.clone().unwrap()).collect();
    assert_eq!(codec::reconstruct_string(&raw_shares, false).unwrap(), "Bob");

    let bucketed_shares: Vec<String> = files
      .iter()
      .map(|f| f.keywords[0].keyword_bucketed.clone().unwrap())
      .collect();
    assert_eq!(codec::reconstruct_string(&bucketed_shares, true).unwrap(), "BOB**");
    assert_eq!(files[0].keywords[0].keyword_bucket_size, 5);
    assert_eq!(files[0].keywords[0].field, "FROM");
  }

  #[test]
  fn build_query_field_only_clause_has_no_keyword_shares() {
    let files = build_query(&[""], &["ALL"], &[""], &[""], 2).unwrap();
    assert_eq!(files[0].keywords.len(), 1);
    assert!(files[0].keywords[0].keyword.is_none());
    assert_eq!(files[0].keywords[0].keyword_bucket_size, 0);
  }

  #[test]
  fn build_query_rejects_unequal_lengths() {
    assert!(build_query(&["a", "b"], &["FROM"], &[""], &[""], 2).is_err());
  }
}
