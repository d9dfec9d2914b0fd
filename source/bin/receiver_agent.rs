// PrivMail Receiver Client Proxy (RCP): connects to every IMAP server
// listed in credentials.yaml, searches and fetches matching shares, and
// reconstructs the original mails. Mirrors
// `Receiver-Scripts/receive_mails_script/receive_mail.py`.

use anyhow::Context as _;
use clap::Parser as _;
use privmail::net::Open as _;
use std::path::PathBuf;
use std::time::Duration;

#[derive(clap::Parser)]
#[command(about = "PrivMail Receiver Client Proxy (RCP)")]
struct Arguments {
  /// Four comma-separated clause lists: keywords, fields, NOT-modifiers,
  /// AND/OR sequence. Defaults to an unconditional `ALL` search.
  #[arg(long = "keywords", num_args = 4)]
  keywords: Option<Vec<String>>,
  #[arg(long = "credentials", help = "Path to the IMAP credentials file", default_value = "credentials.yaml")]
  credentials: PathBuf,
  #[arg(long = "stats", help = "Write a perf_<timestamp>.yaml timing report", default_value_t = false)]
  stats: bool,
  #[arg(long = "silent", help = "Do not log the reconstructed mails", default_value_t = false)]
  silent: bool,
  #[clap(flatten)]
  logging: privmail::LoggingArguments,
}

fn search_query(raw: &[String]) -> anyhow::Result<String> {
  let lists: Vec<Vec<&str>> = raw.iter().map(|clause| clause.split(',').collect()).collect();
  anyhow::ensure!(
    lists[0].len() == lists[1].len() && lists[0].len() == lists[2].len(),
    "different size argument lists ({}, {}, {})",
    lists[0].len(),
    lists[1].len(),
    lists[2].len()
  );
  let mut sequence = lists[3].clone();
  if lists[0].len() != 1 {
    anyhow::ensure!(lists[0].len() == sequence.len() + 1, "sequence argument list has wrong size");
    sequence.push("");
  } else if sequence.is_empty() {
    sequence.push("");
  }
  Ok(privmail::query::build_search_string(&lists[0], &lists[1], &lists[2], &sequence))
}

/// Fetches every message matching `criteria` from `server` and returns one
/// [`privmail::record::ShareRecord`] per message whose body carries a
/// share scheme.
fn connect_and_fetch(server: &privmail::Server, criteria: &str) -> anyhow::Result<Vec<privmail::record::ShareRecord>> {
  let tcp = privmail::net::TCP {
    address: &server.address,
    port: 993,
    timeout: Some(Duration::from_secs(30)),
  };
  let stream = privmail::net::TLS(tcp).open().context("connecting to IMAP server")?;
  let mut client = privmail::imap::Client::new(stream)?;
  client.login(&server.username, &server.password)?;
  client.select("INBOX")?;

  let hits = client.search(criteria)?;
  log::info!("{} message(s) matched on {}", hits.len(), server.address);

  let mut sequence_map = privmail::record::SequenceMap::new();
  let mut records = Vec::new();
  for sequence_number in hits {
    let raw = match client.fetch_rfc822(sequence_number) {
      Ok(raw) => raw,
      Err(error) => {
        log::error!("fetching message {sequence_number} from {} failed: {error:#}", server.address);
        continue;
      }
    };
    let parser = mail_parser::MessageParser::default();
    let message = parser.parse(&raw);

    let subject = message.as_ref().and_then(|m| m.subject()).unwrap_or_default().to_string();
    let mail_from = message.as_ref().and_then(|m| m.header_raw("From")).unwrap_or_default().trim().to_string();
    let rcpt_to = message.as_ref().and_then(|m| m.header_raw("To")).unwrap_or_default().trim().to_string();
    let body = message.as_ref().and_then(|m| m.body_text(0)).map(|cow| cow.into_owned()).unwrap_or_default();

    let record = privmail::share::recv::handle_envelope(&mail_from, &[rcpt_to], &subject, &body, &mut sequence_map);
    if record.uid.is_some() {
      records.push(record);
    }
  }

  client.logout()?;
  Ok(records)
}

fn main() -> anyhow::Result<()> {
  let arguments = Arguments::parse();
  arguments.logging.init("privmail-receiver-agent")?;

  let default_keywords = ["".to_string(), "ALL".to_string(), "".to_string(), "".to_string()];
  let keywords = arguments.keywords.as_deref().unwrap_or(&default_keywords);
  let criteria = search_query(keywords)?;
  log::info!("parsed search query: {criteria}");

  let credentials = privmail::Credentials::load(&arguments.credentials).context("loading IMAP credentials")?;
  let n = credentials.servers.len();

  let connect_start = std::time::Instant::now();
  let mut records = Vec::new();
  for server in &credentials.servers {
    match connect_and_fetch(server, &criteria) {
      Ok(mut fetched) => records.append(&mut fetched),
      Err(error) => log::error!("fetching from {} failed: {error:#}", server.address),
    }
  }
  let connect_and_fetch_time = connect_start.elapsed();

  let reconstruct_start = std::time::Instant::now();
  let mails = privmail::share::recv::reconstruct_from_records(&records, n).context("reconstructing fetched shares")?;
  let reconstruct_time = reconstruct_start.elapsed();

  if !arguments.silent {
    for mail in &mails {
      log::info!("mail {}: subject={:?} body={:?}", mail.uid, mail.subject, mail.body);
    }
  }

  if arguments.stats {
    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M");
    #[derive(serde::Serialize)]
    struct Stats {
      timestamp: String,
      number_of_mails: usize,
      connect_and_fetch_time_seconds: f64,
      share_reconstruction_time_seconds: f64,
      total_time_seconds: f64,
    }
    let stats = Stats {
      timestamp: timestamp.to_string(),
      number_of_mails: mails.len(),
      connect_and_fetch_time_seconds: connect_and_fetch_time.as_secs_f64(),
      share_reconstruction_time_seconds: reconstruct_time.as_secs_f64(),
      total_time_seconds: (connect_and_fetch_time + reconstruct_time).as_secs_f64(),
    };
    let path = format!("perf_{timestamp}.yaml");
    let file = std::fs::File::create(&path)?;
    serde_yaml::to_writer(file, &stats)?;
    log::info!("wrote stats to {path}");
  }

  Ok(())
}
