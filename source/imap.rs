// Minimal blocking IMAP4rev1 client: LOGIN/SELECT/SEARCH/FETCH, enough for
// the receiver agent's contract (connect, fetch shares, reconstruct).
// Grounded on the teacher's tagged-response `Stream` idiom in its own
// (far more general, PEG-grammar-backed) `source/imap.rs`, simplified here
// to a line-oriented parser since only these four commands are needed —
// see `Receiver-Scripts/receive_mails_script/receive_mail.py::connect_and_fetch`
// for the equivalent Python sequence this mirrors.

use anyhow::{bail, Context as _};
use std::io::{self, BufRead as _, BufReader, Read, Write};

pub struct Client<S: Read + Write> {
  reader: BufReader<S>,
  tag: u32,
}

impl<S: Read + Write> Client<S> {
  /// Wraps `stream` and consumes the server greeting.
  pub fn new(stream: S) -> anyhow::Result<Self> {
    let mut this = Self {
      reader: BufReader::new(stream),
      tag: 0,
    };
    let greeting = this.read_line()?;
    anyhow::ensure!(greeting.starts_with("* OK"), "unexpected greeting: {greeting}");
    Ok(this)
  }

  fn read_line(&mut self) -> io::Result<String> {
    let mut line = String::new();
    self.reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
  }

  fn next_tag(&mut self) -> String {
    self.tag += 1;
    format!("a{}", self.tag)
  }

  /// Sends `command`, collects untagged (`*`) lines until the matching
  /// tagged response, and returns them alongside the tagged status line.
  fn command(&mut self, command: &str) -> anyhow::Result<(Vec<String>, String)> {
    let tag = self.next_tag();
    self.reader.get_mut().write_all(format!("{tag} {command}\r\n").as_bytes())?;
    let mut untagged = Vec::new();
    loop {
      let line = self.read_line()?;
      if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
        if !status.starts_with("OK") {
          bail!("{command} failed: {status}");
        }
        return Ok((untagged, status.to_string()));
      }
      untagged.push(line);
    }
  }

  pub fn login(&mut self, user: &str, password: &str) -> anyhow::Result<()> {
    self.command(&format!("LOGIN {user} {password}")).map(|_| ())
  }

  pub fn select(&mut self, mailbox: &str) -> anyhow::Result<()> {
    self.command(&format!("SELECT {mailbox}")).map(|_| ())
  }

  /// Runs a SEARCH and returns the matching message sequence numbers.
  pub fn search(&mut self, criteria: &str) -> anyhow::Result<Vec<u32>> {
    let (untagged, _) = self.command(&format!("SEARCH {criteria}"))?;
    for line in untagged {
      if let Some(rest) = line.strip_prefix("* SEARCH") {
        return Ok(
          rest
            .split_whitespace()
            .filter_map(|n| n.parse().ok())
            .collect(),
        );
      }
    }
    Ok(Vec::new())
  }

  /// Fetches `RFC822` for message `sequence_number`, returning the raw
  /// bytes of the literal.
  pub fn fetch_rfc822(&mut self, sequence_number: u32) -> anyhow::Result<Vec<u8>> {
    let tag = self.next_tag();
    self
      .reader
      .get_mut()
      .write_all(format!("{tag} FETCH {sequence_number} (RFC822)\r\n").as_bytes())?;

    loop {
      let line = self.read_line()?;
      if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
        if !status.starts_with("OK") {
          bail!("FETCH failed: {status}");
        }
        bail!("FETCH completed without a literal for message {sequence_number}");
      }
      if let Some(open_brace) = line.rfind('{') {
        let close_brace = line[open_brace..]
          .find('}')
          .with_context(|| format!("malformed literal header: {line}"))?
          + open_brace;
        let size: usize = line[open_brace + 1..close_brace]
          .parse()
          .with_context(|| format!("malformed literal size: {line}"))?;
        let mut buffer = vec![0u8; size];
        self.reader.read_exact(&mut buffer)?;
        // Consume the rest of the FETCH response line and the closing `)`.
        let _ = self.read_line()?;
        loop {
          let trailer = self.read_line()?;
          if trailer.starts_with(&format!("{tag} ")) {
            break;
          }
        }
        return Ok(buffer);
      }
    }
  }

  pub fn logout(&mut self) -> anyhow::Result<()> {
    let _ = self.command("LOGOUT");
    Ok(())
  }
}

/// Base64-encodes `user\0user\0password` for `AUTHENTICATE PLAIN`, matching
/// the teacher's `imap::plain`.
pub fn plain(user: &str, password: &str) -> String {
  use base64::Engine as _;
  base64::engine::general_purpose::STANDARD.encode(format!("{user}\0{user}\0{password}"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  struct Loopback {
    incoming: Cursor<Vec<u8>>,
    outgoing: Vec<u8>,
  }

  impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      self.incoming.read(buf)
    }
  }

  impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.outgoing.extend_from_slice(buf);
      Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn parses_greeting_and_search_response() {
    let script = "* OK IMAP4rev1 ready\r\n\
                   a1 OK LOGIN completed\r\n\
                   a2 OK SELECT completed\r\n\
                   * SEARCH 1 2 3\r\n\
                   a3 OK SEARCH completed\r\n";
    let stream = Loopback {
      incoming: Cursor::new(script.as_bytes().to_vec()),
      outgoing: Vec::new(),
    };
    let mut client = Client::new(stream).unwrap();
    client.login("user", "pass").unwrap();
    client.select("INBOX").unwrap();
    let hits = client.search("UNSEEN").unwrap();
    assert_eq!(hits, vec![1, 2, 3]);
  }

  #[test]
  fn plain_encodes_user_and_password() {
    let encoded = plain("alice", "secret");
    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    assert_eq!(decoded, b"alice\0alice\0secret");
  }
}
