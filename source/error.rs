// Core error taxonomy. Codec and query-encoder errors are fatal to their
// call and bubble with `?`; framing/reconstruction call sites instead log
// and skip (see framing.rs, share/recv.rs) rather than propagate these.

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("invalid encoding: {0}")]
  InvalidEncoding(String),

  #[error("invalid base64")]
  InvalidBase64(#[from] base64::DecodeError),

  #[error("share count too small: {0} (need >= 2)")]
  ShareCountTooSmall(usize),

  #[error("random bit width out of range: {0} (need 1..=8)")]
  RandBitsOutOfRange(u32),

  #[error("malformed block: {0}")]
  MalformedBlock(String),

  #[error("invalid uid header: {0}")]
  InvalidUidHeader(String),

  #[error("unknown bucket scheme: {0}")]
  BucketSchemeUnknown(usize),

  #[error("argument shape mismatch: {0}")]
  ArgumentShapeMismatch(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
