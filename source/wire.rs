// Minimal RFC-5322 header/body composition and 60-column line wrapping for
// Base64 block payloads. Full MIME handling is out of scope; inbound
// parsing of arbitrary envelopes is instead delegated to `mail-parser`.

pub const CHAR_PER_LINE: usize = 60;

/// Wraps `payload` (typically a Base64 blob) into lines of at most
/// `CHAR_PER_LINE` characters.
pub fn wrap_lines(payload: &str) -> String {
  let chars: Vec<char> = payload.chars().collect();
  chars
    .chunks(CHAR_PER_LINE)
    .map(|chunk| chunk.iter().collect::<String>())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Wraps `payload` between a begin/end delimiter pair, one payload line per
/// at most `CHAR_PER_LINE` characters.
pub fn wrap_block(begin: &str, payload: &str, end: &str) -> String {
  format!("{begin}\n{}\n{end}", wrap_lines(payload))
}

/// Composes a minimal RFC-5322 message: `Subject:`/`From:`/`To:` headers, a
/// blank line, then `body` verbatim.
pub fn compose(from: &str, to: &str, subject: &str, body: &str) -> String {
  format!("From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\r\n{body}")
}

/// Splits `message` into `(headers, body)` at the first blank line.
pub fn split_headers_and_body(message: &str) -> (&str, &str) {
  if let Some(index) = message.find("\r\n\r\n") {
    (&message[..index], &message[index + 4..])
  } else if let Some(index) = message.find("\n\n") {
    (&message[..index], &message[index + 2..])
  } else {
    (message, "")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrap_lines_chunks_at_sixty_chars() {
    let payload = "a".repeat(130);
    let wrapped = wrap_lines(&payload);
    let lines: Vec<&str> = wrapped.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].len(), 60);
    assert_eq!(lines[1].len(), 60);
    assert_eq!(lines[2].len(), 10);
  }

  #[test]
  fn split_headers_and_body_finds_blank_line() {
    let message = "Subject: hi\r\n\r\nbody text";
    let (headers, body) = split_headers_and_body(message);
    assert_eq!(headers, "Subject: hi");
    assert_eq!(body, "body text");
  }
}
