// XOR secret sharing of byte arrays and strings, and the 7-bit/6-bit
// truncation maps used by the truncated (search-compatible) regime.
//
// Based on SixBit ASCII (used by AIS).

use crate::error::{Error, Result};
use rand::RngCore as _;

pub const SPECIAL_ENCODING: [u8; 128] = [
  42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, //
  42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, 42, //
  32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, //
  48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, //
  0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, //
  16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, //
  42, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, //
  16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 42, 42, 42, 42, 42, //
];

pub const SPECIAL_DECODING: [u8; 64] = [
  64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 77, 78, 79, //
  80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, //
  32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, //
  48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, //
];

/// Splits `input` into `N` byte arrays of equal length whose elementwise XOR
/// reconstructs it. The first `N-1` arrays are drawn from a CSPRNG, each
/// byte uniform in `[0, 2^bits_per_random - 1]`; the last absorbs the
/// remainder.
pub fn share_bytes(input: &[u8], n: usize, bits_per_random: u32) -> Result<Vec<Vec<u8>>> {
  if n < 2 {
    return Err(Error::ShareCountTooSmall(n));
  }
  if bits_per_random == 0 || bits_per_random > 8 {
    return Err(Error::RandBitsOutOfRange(bits_per_random));
  }
  let mask: u8 = if bits_per_random == 8 {
    0xff
  } else {
    ((1u16 << bits_per_random) - 1) as u8
  };
  let mut rng = rand::rngs::OsRng;
  let mut residual = input.to_vec();
  let mut shares = Vec::with_capacity(n);
  for _ in 0..n - 1 {
    let mut share = vec![0u8; input.len()];
    rng.fill_bytes(&mut share);
    for byte in share.iter_mut() {
      *byte &= mask;
    }
    for (r, s) in residual.iter_mut().zip(share.iter()) {
      *r ^= s;
    }
    shares.push(share);
  }
  shares.push(residual);
  Ok(shares)
}

fn reduce_xor(shares: &[Vec<u8>]) -> Vec<u8> {
  let len = shares[0].len();
  let mut out = vec![0u8; len];
  for share in shares {
    for (o, b) in out.iter_mut().zip(share.iter()) {
      *o ^= b;
    }
  }
  out
}

fn b64_encode(bytes: &[u8]) -> String {
  use base64::Engine as _;
  base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn b64_decode(s: &str) -> Result<Vec<u8>> {
  use base64::Engine as _;
  Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}

/// Shares `s` in the raw (7-bit) regime. Non-ASCII bytes are replaced with
/// `?`, matching `str.encode("ascii", errors="replace")`.
pub fn share_string_raw(s: &str, n: usize) -> Result<Vec<String>> {
  let bytes: Vec<u8> = s
    .chars()
    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
    .collect();
  let shares = share_bytes(&bytes, n, 7)?;
  Ok(shares.iter().map(|share| b64_encode(share)).collect())
}

/// Shares `s` in the truncated (6-bit) regime, after remapping every byte
/// through `SPECIAL_ENCODING`. Bytes outside the ASCII range are rejected.
pub fn share_string_truncated(s: &str, n: usize) -> Result<Vec<String>> {
  let mut mapped = Vec::with_capacity(s.len());
  for c in s.chars() {
    if !c.is_ascii() {
      return Err(Error::InvalidEncoding(format!(
        "non-ascii character {c:?} in truncated regime"
      )));
    }
    mapped.push(SPECIAL_ENCODING[c as usize & 0x7f]);
  }
  let shares = share_bytes(&mapped, n, 6)?;
  Ok(shares.iter().map(|share| b64_encode(share)).collect())
}

/// Reconstructs a string from its Base64 shares, XOR-reducing and, if
/// `truncated`, mapping each byte back through `SPECIAL_DECODING`.
pub fn reconstruct_string(shares: &[String], truncated: bool) -> Result<String> {
  if shares.len() < 2 {
    return Err(Error::ShareCountTooSmall(shares.len()));
  }
  let decoded: Vec<Vec<u8>> = shares.iter().map(|s| b64_decode(s)).collect::<Result<_>>()?;
  let len = decoded[0].len();
  if decoded.iter().any(|d| d.len() != len) {
    return Err(Error::InvalidEncoding(
      "share length mismatch during reconstruction".into(),
    ));
  }
  let mut combined = reduce_xor(&decoded);
  if truncated {
    for byte in combined.iter_mut() {
      let index = *byte as usize;
      if index >= SPECIAL_DECODING.len() {
        return Err(Error::InvalidEncoding(format!(
          "byte {index} out of range for truncated decoding"
        )));
      }
      *byte = SPECIAL_DECODING[index];
    }
  }
  String::from_utf8(combined).map_err(|e| Error::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_round_trip() {
    let shares = share_string_raw("input", 2).unwrap();
    assert_eq!(shares.len(), 2);
    let reconstructed = reconstruct_string(&shares, false).unwrap();
    assert_eq!(reconstructed, "input");
  }

  #[test]
  fn truncated_round_trip_recovers_uppercase() {
    let shares = share_string_truncated("input", 2).unwrap();
    let reconstructed = reconstruct_string(&shares, true).unwrap();
    assert_eq!(reconstructed, "INPUT");
  }

  #[test]
  fn known_truncated_vector() {
    let shares = vec!["DCUIDh4=".to_string(), "CwQcOhs=".to_string()];
    let reconstructed = reconstruct_string(&shares, true).unwrap();
    assert_eq!(reconstructed, "INPUT");
  }

  #[test]
  fn share_bytes_xor_reduces_to_input() {
    let input = b"hello world";
    let shares = share_bytes(input, 4, 8).unwrap();
    assert_eq!(shares.len(), 4);
    let lengths: Vec<_> = shares.iter().map(Vec::len).collect();
    assert!(lengths.iter().all(|&l| l == input.len()));
    assert_eq!(reduce_xor(&shares), input);
  }

  #[test]
  fn rejects_too_few_shares() {
    assert!(matches!(
      share_bytes(b"x", 1, 8),
      Err(Error::ShareCountTooSmall(1))
    ));
  }

  #[test]
  fn rejects_bad_bit_width() {
    assert!(matches!(
      share_bytes(b"x", 2, 9),
      Err(Error::RandBitsOutOfRange(9))
    ));
    assert!(matches!(
      share_bytes(b"x", 2, 0),
      Err(Error::RandBitsOutOfRange(0))
    ));
  }
}
