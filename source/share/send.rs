// Share Assembler (send side, C6): compose per-recipient share payloads
// (body, truncated body, word buckets, subject) behind a common UID.

use crate::error::Result;
use crate::{bucketing, codec, framing, identifier, wire};

/// One of the N outbound messages produced by [`assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
  pub subject: String,
  pub body: String,
}

/// Sentence-ending punctuation collapsed to a single space before bucketing,
/// matching `_secret_share_email`'s `.replace(...)` chain.
const SENTENCE_ENDINGS: [&str; 6] = [". ", ", ", ": ", "; ", "? ", "! "];

fn collapse_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bucketing_normal_form(truncated_msg: &str) -> String {
  let mut s = truncated_msg.to_lowercase();
  for ending in SENTENCE_ENDINGS {
    s = s.replace(ending, " ");
  }
  collapse_whitespace(&s)
}

/// Assembles `N` outbound messages for `subject`/`body`, all tied together
/// by a freshly generated UID.
pub fn assemble(subject: &str, body: &str, n: usize) -> Result<Vec<OutboundMessage>> {
  let uid = identifier::make_uid();

  let body_shares = codec::share_string_raw(body, n)?;

  let truncated_msg = collapse_whitespace(body);
  let truncated_body_shares = codec::share_string_truncated(&truncated_msg, n)?;

  let normalized = bucketing_normal_form(&truncated_msg);
  let tokens = bucketing::tokenize(&normalized);
  let words: Vec<String> = tokens.into_iter().map(|(word, _positions)| word).collect();
  let words = bucketing::shuffled_words(words);

  // Preserve insertion order of bucket sizes, matching the source's
  // dict-of-lists grouping (Python dicts preserve insertion order).
  let mut bucket_order: Vec<usize> = Vec::new();
  let mut buckets: std::collections::HashMap<usize, Vec<String>> = std::collections::HashMap::new();
  for word in words {
    let bucketed = bucketing::bucket_keyword(&word);
    if bucketed.is_empty() {
      continue;
    }
    let size = bucketed.chars().count();
    buckets.entry(size).or_insert_with(|| {
      bucket_order.push(size);
      Vec::new()
    });
    buckets.get_mut(&size).unwrap().push(bucketed);
  }

  // bucket_size -> list of N shares, one Vec<String> per word.
  let mut bucket_shares: std::collections::HashMap<usize, Vec<Vec<String>>> =
    std::collections::HashMap::new();
  for &size in &bucket_order {
    let mut per_word = Vec::new();
    for word in &buckets[&size] {
      per_word.push(codec::share_string_truncated(word, n)?);
    }
    bucket_shares.insert(size, per_word);
  }

  let subject_shares = codec::share_string_raw(subject, n)?;

  let mut outbound = Vec::with_capacity(n);
  for i in 0..n {
    let subject_i = format!("{uid}{}", subject_shares[i]);

    let mut body_i = wire::wrap_block(framing::BEGIN, &body_shares[i], framing::END);
    body_i.push_str("\n\n");
    body_i.push_str(&wire::wrap_block(
      framing::BEGIN_TRUNCATED,
      &truncated_body_shares[i],
      framing::END_TRUNCATED,
    ));

    for &size in &bucket_order {
      body_i.push_str("\n\n");
      let begin = framing::begin_bucket(size);
      let end = framing::end_bucket(size);
      let mut lines = vec![begin];
      for per_word in &bucket_shares[&size] {
        lines.push(per_word[i].clone());
      }
      lines.push(end);
      body_i.push_str(&lines.join("\n"));
    }

    outbound.push(OutboundMessage {
      subject: subject_i,
      body: body_i,
    });
  }

  Ok(outbound)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn assembles_n_messages_with_valid_blocks() {
    let outbound = assemble("Greetings", "Hello", 3).unwrap();
    assert_eq!(outbound.len(), 3);
    for message in &outbound {
      assert!(message.body.contains(framing::BEGIN));
      assert!(message.body.contains(framing::END));
      assert!(message.body.contains(framing::BEGIN_TRUNCATED));
      let (found, _) = framing::contains_scheme(&message.body, framing::BEGIN, framing::END);
      assert!(found);
    }
  }

  #[test]
  fn bucketing_normal_form_strips_sentence_endings() {
    assert_eq!(bucketing_normal_form("Hello, world. Bye!"), "hello world bye!");
  }
}
