// UID generation and UID/subject separation.

use crate::error::{Error, Result};
use rand::RngCore as _;

pub const UID_BYTE_LEN: usize = 6;

/// 4*ceil(n/3): the Base64 character count for `n` raw bytes.
fn b64_len(n: usize) -> usize {
  4 * ((n + 2) / 3)
}

/// Generates a fresh UID: `UID_BYTE_LEN` random bytes, Base64-encoded
/// (yields exactly 8 printable characters).
pub fn make_uid() -> String {
  use base64::Engine as _;
  let mut bytes = [0u8; UID_BYTE_LEN];
  rand::rngs::OsRng.fill_bytes(&mut bytes);
  base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Splits a `UID_BYTE_LEN`-byte UID off the front of `header_text`, returning
/// `(uid, rest)`.
pub fn split_uid(header_text: &str) -> Result<(String, String)> {
  split_uid_with_len(header_text, UID_BYTE_LEN)
}

pub fn split_uid_with_len(header_text: &str, uid_byte_len: usize) -> Result<(String, String)> {
  use base64::Engine as _;
  let k = b64_len(uid_byte_len);
  if header_text.len() < k {
    return Err(Error::InvalidUidHeader(format!(
      "expected at least {k} characters, got {}",
      header_text.len()
    )));
  }
  let (uid, rest) = header_text.split_at(k);
  base64::engine::general_purpose::STANDARD
    .decode(uid)
    .map_err(|_| Error::InvalidUidHeader(format!("{uid:?} is not valid base64")))?;
  Ok((uid.to_string(), rest.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn make_uid_is_eight_base64_chars() {
    let uid = make_uid();
    assert_eq!(uid.len(), 8);
    assert!(uid.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
  }

  #[test]
  fn split_uid_round_trips() {
    let uid = make_uid();
    let header = format!("{uid}rest-of-subject");
    let (parsed_uid, rest) = split_uid(&header).unwrap();
    assert_eq!(parsed_uid, uid);
    assert_eq!(rest, "rest-of-subject");
  }

  #[test]
  fn split_uid_rejects_short_header() {
    assert!(matches!(
      split_uid("short"),
      Err(Error::InvalidUidHeader(_))
    ));
  }
}
