// Block delimiters and the line-by-line extraction state machine used to
// pull secret-share payloads out of an RFC-5322 body.

use std::collections::BTreeMap;

pub const BEGIN: &str = "-----BEGIN SECRET SHARE BLOCK Ver1.0-----";
pub const END: &str = "-----END SECRET SHARE BLOCK Ver1.0-----";

pub const BEGIN_TRUNCATED: &str = "-----BEGIN SECRET SHARE TRUNCATED BLOCK Ver1.0-----";
pub const END_TRUNCATED: &str = "-----END SECRET SHARE TRUNCATED BLOCK Ver1.0-----";

pub const BUCKET_SCHEME: [usize; 4] = [5, 10, 15, 20];

pub fn begin_bucket(size: usize) -> String {
  format!("-----BEGIN SECRET SHARE BUCKET SIZE {size} BLOCK Ver1.0-----")
}

pub fn end_bucket(size: usize) -> String {
  format!("-----END SECRET SHARE BUCKET SIZE {size} BLOCK Ver1.0-----")
}

/// Looks for a `begin`/`end` delimited block within `text`, splitting into
/// lines. Returns the concatenation (no separators) of the interior lines
/// only if both delimiters were seen, in order; a missing `end` (including
/// EOF before it) yields `(false, "")`.
pub fn contains_scheme(text: &str, begin: &str, end: &str) -> (bool, String) {
  let mut output = String::new();
  let mut started = false;
  let mut ended = false;
  for line in text.lines() {
    if line == end {
      ended = true;
    }
    if started && !ended {
      output.push_str(line);
    }
    if line == begin {
      started = true;
    }
  }
  if started && ended {
    (true, output)
  } else {
    (false, String::new())
  }
}

/// Result of scanning a received body line-by-line through the Body,
/// Truncated and Bucket(n) block families.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractedBlocks {
  pub body_remainder: String,
  pub share_block: String,
  pub truncated_block: String,
  pub bucket_blocks: BTreeMap<usize, Vec<String>>,
  pub unterminated: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
  Outside,
  InsideBody,
  InsideTruncated,
  InsideBucket(usize),
}

/// Scans `body` line-by-line. At most one of the Body/Truncated/Bucket(n)
/// flags is ever set (the grammar forbids nesting); lines that don't match a
/// delimiter and aren't inside a tracked block are appended to the free-text
/// remainder, separated by newlines as they originally appeared.
pub fn extract_blocks(body: &str) -> ExtractedBlocks {
  let mut out = ExtractedBlocks::default();
  let mut state = State::Outside;
  let mut remainder_lines: Vec<&str> = Vec::new();

  for line in body.lines() {
    if line == BEGIN {
      state = State::InsideBody;
      continue;
    }
    if line == END {
      state = State::Outside;
      continue;
    }
    if line == BEGIN_TRUNCATED {
      state = State::InsideTruncated;
      continue;
    }
    if line == END_TRUNCATED {
      state = State::Outside;
      continue;
    }
    let mut matched_bucket_delimiter = false;
    for &size in BUCKET_SCHEME.iter() {
      if line == begin_bucket(size) {
        state = State::InsideBucket(size);
        out.bucket_blocks.entry(size).or_default();
        matched_bucket_delimiter = true;
        break;
      }
      if line == end_bucket(size) {
        state = State::Outside;
        matched_bucket_delimiter = true;
        break;
      }
    }
    if matched_bucket_delimiter {
      continue;
    }

    match state {
      State::InsideBody => out.share_block.push_str(line),
      State::InsideTruncated => out.truncated_block.push_str(line),
      State::InsideBucket(size) => out.bucket_blocks.entry(size).or_default().push(line.to_string()),
      State::Outside => remainder_lines.push(line),
    }
  }

  if state != State::Outside {
    out.unterminated = true;
    log::warn!("unterminated block at end of body");
  }
  out.body_remainder = remainder_lines.concat();
  out
}
