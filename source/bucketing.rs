// Word normalization, bucket-length selection and padding, plus the
// CSPRNG-driven enumeration order used to hide positional correlation.

pub const BUCKET_SCHEME: [usize; 4] = [5, 10, 15, 20];
pub const PADDING_CHARACTER: char = '*';

/// Pads `word` to the smallest enclosing bucket length, or returns an empty
/// string if `word` is too long for any bucket.
pub fn bucket_keyword(word: &str) -> String {
  let len = word.chars().count();
  if len > *BUCKET_SCHEME.last().unwrap() {
    return String::new();
  }
  for &size in BUCKET_SCHEME.iter() {
    if len <= size {
      let mut padded = word.to_string();
      while padded.chars().count() < size {
        padded.push(PADDING_CHARACTER);
      }
      return padded;
    }
  }
  String::new()
}

/// Splits `text` on whitespace, preserving first-seen order and recording
/// every position at which each distinct word occurs.
pub fn tokenize(text: &str) -> Vec<(String, Vec<usize>)> {
  let mut order: Vec<String> = Vec::new();
  let mut positions: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
  for (index, word) in text.split_whitespace().enumerate() {
    positions
      .entry(word.to_string())
      .and_modify(|p| p.push(index))
      .or_insert_with(|| {
        order.push(word.to_string());
        vec![index]
      });
  }
  order
    .into_iter()
    .map(|word| {
      let p = positions.remove(&word).unwrap();
      (word, p)
    })
    .collect()
}

/// Fisher-Yates shuffle of `words`, using a CSPRNG so the sender's bucket
/// enumeration order does not leak positional correlation.
pub fn shuffled_words(words: Vec<String>) -> Vec<String> {
  use rand::Rng as _;
  let mut words = words;
  let mut rng = rand::rngs::OsRng;
  for i in (1..words.len()).rev() {
    let j = rng.gen_range(0..=i);
    words.swap(i, j);
  }
  words
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_word_pads_to_smallest_bucket() {
    assert_eq!(bucket_keyword(""), "*****");
  }

  #[test]
  fn four_char_word_pads_to_five() {
    assert_eq!(bucket_keyword("xxxx"), "xxxx*");
  }

  #[test]
  fn word_too_long_is_empty() {
    let word = "x".repeat(21);
    assert_eq!(bucket_keyword(&word), "");
  }

  #[test]
  fn bucket_keyword_output_length_is_valid() {
    for len in 0..=25 {
      let word = "a".repeat(len);
      let bucketed = bucket_keyword(&word);
      assert!(bucketed.is_empty() || BUCKET_SCHEME.contains(&bucketed.chars().count()));
    }
  }

  #[test]
  fn tokenize_preserves_first_seen_order_and_positions() {
    let tokens = tokenize("a b a c b a");
    assert_eq!(tokens[0].0, "a");
    assert_eq!(tokens[0].1, vec![0, 2, 5]);
    assert_eq!(tokens[1].0, "b");
    assert_eq!(tokens[1].1, vec![1, 4]);
    assert_eq!(tokens[2].0, "c");
    assert_eq!(tokens[2].1, vec![3]);
  }

  #[test]
  fn shuffle_preserves_multiset() {
    let words: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let shuffled = shuffled_words(words.clone());
    let mut sorted_original = words;
    let mut sorted_shuffled = shuffled;
    sorted_original.sort();
    sorted_shuffled.sort();
    assert_eq!(sorted_original, sorted_shuffled);
  }
}
