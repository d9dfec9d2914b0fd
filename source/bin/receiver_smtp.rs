// PrivMail Receiver SMTP Server: accepts inbound DATA envelopes, runs the
// C2/C3/C7 extraction, and persists one ShareRecord per envelope. Mirrors
// `Receiver-SMTP-Server/smtp_server.py`'s `CustomSMTPHandler`.

use anyhow::Context as _;
use clap::Parser as _;
use std::net::TcpListener;
use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(about = "PrivMail Receiver SMTP Server (RSS)")]
struct Arguments {
  #[arg(long = "port", short = 'p', help = "Listening port", default_value_t = 55010)]
  port: u16,
  #[arg(
    long = "directory",
    short = 'd',
    help = "Share directory to persist ShareRecords into",
    default_value = "mail_data/"
  )]
  directory: PathBuf,
  #[clap(flatten)]
  logging: privmail::LoggingArguments,
}

fn main() -> anyhow::Result<()> {
  let arguments = Arguments::parse();
  arguments.logging.init("privmail-receiver-smtp")?;

  std::fs::create_dir_all(&arguments.directory)?;
  let existing = privmail::record::load_all(&arguments.directory)?;
  let mut sequence_map = privmail::record::SequenceMap::reconstruct_from_records(&existing);
  log::info!(
    "reconstructed sequence map with {} uid(s) from {:?}",
    sequence_map.len(),
    arguments.directory
  );

  let listener = TcpListener::bind(("0.0.0.0", arguments.port))
    .with_context(|| format!("binding port {}", arguments.port))?;
  log::info!("PrivMail Receiver SMTP Server (RSS) listening on port {}", arguments.port);

  privmail::smtp::serve_forever(&listener, |envelope| {
    let parser = mail_parser::MessageParser::default();
    let message = parser.parse(&envelope.data);

    let subject = message.as_ref().and_then(|m| m.subject()).unwrap_or_default().to_string();
    let from_header = message
      .as_ref()
      .and_then(|m| m.header_raw("From"))
      .unwrap_or_default()
      .trim()
      .to_string();
    let to_header = message
      .as_ref()
      .and_then(|m| m.header_raw("To"))
      .unwrap_or_default()
      .trim()
      .to_string();
    let body = message
      .as_ref()
      .and_then(|m| m.body_text(0))
      .map(|cow| cow.into_owned())
      .unwrap_or_default();

    let mut record = privmail::share::recv::handle_envelope(
      &envelope.mail_from,
      &envelope.rcpt_tos,
      &subject,
      &body,
      &mut sequence_map,
    );
    if !from_header.is_empty() {
      record.from = Some(from_header);
    }
    if !to_header.is_empty() {
      record.to = Some(to_header);
    }

    match privmail::record::persist(&arguments.directory, &record) {
      Ok(path) => {
        log::info!("persisted {path:?} (uid={:?})", record.uid);
        "250 OK".to_string()
      }
      Err(error) => {
        log::error!("failed to persist share record: {error}");
        "451 requested action aborted: local error in processing".to_string()
      }
    }
  })
}
