// Minimal blocking SMTP listener and sender, covering only the DATA-only
// exchange PrivMail needs. Grounded on `Receiver-SMTP-Server/smtp_server.py`
// (built on Python's stdlib `smtpd`) for the server side and
// `Sender-Client-Proxy/sender_client_proxy.py` (built on `smtplib`/
// `aiosmtplib`) for the client side, reduced to their blocking subset.

use crate::net::Open;
use anyhow::{bail, Context as _};
use std::io::{BufRead as _, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};

/// One received SMTP envelope: sender, recipients and the raw DATA payload
/// (everything between `DATA` and the terminating `.` line).
pub struct Envelope {
  pub mail_from: String,
  pub rcpt_tos: Vec<String>,
  pub data: Vec<u8>,
}

/// Accepts connections on `listener` one at a time (per spec.md §5's
/// single-threaded cooperative model) and hands each fully-read envelope to
/// `handle`. `handle`'s return value becomes the final SMTP reply.
pub fn serve_forever(listener: &TcpListener, mut handle: impl FnMut(Envelope) -> String) -> anyhow::Result<()> {
  for stream in listener.incoming() {
    let stream = stream?;
    if let Err(error) = serve_once(stream, &mut handle) {
      log::error!("SMTP session failed: {error:#}");
    }
  }
  Ok(())
}

fn serve_once(mut stream: TcpStream, handle: &mut impl FnMut(Envelope) -> String) -> anyhow::Result<()> {
  stream.write_all(b"220 privmail ESMTP\r\n")?;
  let mut reader = BufReader::new(stream.try_clone()?);

  let mut mail_from = String::new();
  let mut rcpt_tos = Vec::new();

  loop {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
      return Ok(());
    }
    let line = line.trim_end_matches(['\r', '\n']);
    let upper = line.to_ascii_uppercase();

    if upper.starts_with("HELO") || upper.starts_with("EHLO") {
      stream.write_all(b"250 privmail\r\n")?;
    } else if upper.starts_with("MAIL FROM:") {
      mail_from = line[10..].trim_matches(['<', '>']).to_string();
      stream.write_all(b"250 OK\r\n")?;
    } else if upper.starts_with("RCPT TO:") {
      rcpt_tos.push(line[8..].trim_matches(['<', '>']).to_string());
      stream.write_all(b"250 OK\r\n")?;
    } else if upper.starts_with("DATA") {
      stream.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")?;
      let mut data = Vec::new();
      loop {
        let mut data_line = Vec::new();
        if reader.read_until(b'\n', &mut data_line)? == 0 {
          break;
        }
        if data_line == b".\r\n" || data_line == b".\n" {
          break;
        }
        data.extend_from_slice(&data_line);
      }
      let reply = handle(Envelope {
        mail_from: std::mem::take(&mut mail_from),
        rcpt_tos: std::mem::take(&mut rcpt_tos),
        data,
      });
      stream.write_all(format!("{reply}\r\n").as_bytes())?;
    } else if upper.starts_with("QUIT") {
      stream.write_all(b"221 bye\r\n")?;
      return Ok(());
    } else {
      stream.write_all(b"500 unrecognized command\r\n")?;
    }
  }
}

fn expect_status(reader: &mut BufReader<impl Read>, prefix: &str) -> anyhow::Result<()> {
  let mut line = String::new();
  reader.read_line(&mut line)?;
  if !line.starts_with(prefix) {
    bail!("unexpected SMTP reply: {line}");
  }
  Ok(())
}

/// Sends one message over a freshly opened connection, returning once the
/// server has acknowledged DATA. Per spec.md §5, the caller is expected to
/// run one of these per recipient concurrently and must treat failures as
/// independent — this function surfaces its own failure only. When
/// `auth` is `Some((user, password))`, an `AUTH PLAIN` exchange runs right
/// after `EHLO`, mirroring `aiosmtplib.SMTP.login` in the proxy-mode path
/// of `sender_client_proxy.py`; `None` skips it for the "custom mode" path.
pub fn send<O: Open>(
  open: &O,
  mail_from: &str,
  rcpt_to: &str,
  message: &str,
  auth: Option<(&str, &str)>,
) -> anyhow::Result<()> {
  let stream = open.open().context("connecting to outbound SMTP server")?;
  let mut reader = BufReader::new(stream);
  expect_status(&mut reader, "220")?;

  let mut write = |command: &str| -> anyhow::Result<()> {
    reader.get_mut().write_all(command.as_bytes())?;
    Ok(())
  };

  write("EHLO privmail\r\n")?;
  expect_status(&mut reader, "250")?;

  if let Some((user, password)) = auth {
    use zeroize::Zeroize as _;
    write("AUTH PLAIN\r\n")?;
    expect_status(&mut reader, "334")?;
    let mut credentials = crate::imap::plain(user, password);
    let result = write(&format!("{credentials}\r\n"));
    credentials.zeroize();
    result?;
    expect_status(&mut reader, "235")?;
  }

  write(&format!("MAIL FROM:<{mail_from}>\r\n"))?;
  expect_status(&mut reader, "250")?;

  write(&format!("RCPT TO:<{rcpt_to}>\r\n"))?;
  expect_status(&mut reader, "250")?;

  write("DATA\r\n")?;
  expect_status(&mut reader, "354")?;

  let mut escaped = String::new();
  for line in message.lines() {
    if let Some(stripped) = line.strip_prefix('.') {
      escaped.push('.');
      escaped.push('.');
      escaped.push_str(stripped);
    } else {
      escaped.push_str(line);
    }
    escaped.push_str("\r\n");
  }
  write(&escaped)?;
  write(".\r\n")?;
  expect_status(&mut reader, "250")?;

  Ok(())
}
