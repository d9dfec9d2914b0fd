// PrivMail: a privacy-preserving email overlay that XOR-secret-shares
// message content and searchable metadata across N independent SMTP/IMAP
// destinations, so no single mail provider sees plaintext.
//
// This crate is the shared core (C1-C8); the five `privmail-*` binaries
// under `source/bin/` are thin wrappers wiring the core to SMTP/IMAP I/O.

pub mod bucketing;
pub mod codec;
pub mod error;
pub mod framing;
pub mod identifier;
pub mod imap;
pub mod index;
pub mod net;
pub mod query;
pub mod record;
pub mod share;
pub mod smtp;
pub mod wire;

use std::path;
use zeroize::Zeroize as _;

/// One outgoing SMTP destination: the account PrivMail authenticates as
/// when dispatching a share, and the mailbox address that share is
/// addressed to. Mirrors one entry of `destination_address_map.yaml`'s
/// per-recipient target list in the original Sender-Client-Proxy.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Destination {
  #[serde(rename = "SERVER")]
  pub server: String,
  #[serde(rename = "PORT")]
  pub port: u16,
  #[serde(rename = "USERNAME")]
  pub username: String,
  #[serde(rename = "PASSWORD")]
  pub password: String,
  #[serde(rename = "DESTINATION")]
  pub destination: String,
}

impl Drop for Destination {
  fn drop(&mut self) {
    self.password.zeroize();
  }
}

/// A recipient address mapped to the N destinations its shares fan out to,
/// as loaded from a `destination_address_map.yaml`-shaped config file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DestinationMap {
  #[serde(rename = "USERS")]
  pub users: std::collections::HashMap<String, Vec<Destination>>,
}

impl DestinationMap {
  pub fn load(path: &path::Path) -> anyhow::Result<Self> {
    use anyhow::Context as _;
    let file =
      std::fs::File::open(path).with_context(|| format!("opening destination map {path:?}"))?;
    Ok(serde_yaml::from_reader(file)?)
  }
}

/// One IMAP source mailbox to fetch shares from, as loaded from a
/// `credentials.yaml`-shaped config file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Server {
  #[serde(rename = "ADDRESS")]
  pub address: String,
  #[serde(rename = "USERNAME")]
  pub username: String,
  #[serde(rename = "PASSWORD")]
  pub password: String,
}

impl Drop for Server {
  fn drop(&mut self) {
    self.password.zeroize();
  }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
  #[serde(rename = "SERVERS")]
  pub servers: Vec<Server>,
}

impl Credentials {
  pub fn load(path: &path::Path) -> anyhow::Result<Self> {
    use anyhow::Context as _;
    let file = std::fs::File::open(path).with_context(|| format!("opening credentials {path:?}"))?;
    Ok(serde_yaml::from_reader(file)?)
  }
}

/// Sets up console+file logging exactly as the teacher's `main.rs` does: a
/// shared pattern encoder, a file appender at `{log_directory}/{name}.log`
/// logging everything, and a console appender thresholded by `verbosity`.
pub fn init_logging(name: &str, log_directory: &path::Path, verbosity: log::LevelFilter) -> anyhow::Result<()> {
  let encoder = Box::new(log4rs::encode::pattern::PatternEncoder::new(
    "{d(%F %T)} {l} {t} - {m}{n}",
  ));
  log4rs::init_config(
    log4rs::config::Config::builder()
      .appender(
        log4rs::config::Appender::builder()
          .filter(Box::new(log4rs::filter::threshold::ThresholdFilter::new(
            log::LevelFilter::Trace,
          )))
          .build(
            "file",
            Box::new(
              log4rs::append::file::FileAppender::builder()
                .encoder(encoder.clone())
                .build(log_directory.join(format!("{name}.log")))?,
            ),
          ),
      )
      .appender(
        log4rs::config::Appender::builder()
          .filter(Box::new(log4rs::filter::threshold::ThresholdFilter::new(verbosity)))
          .build(
            "console",
            Box::new(
              log4rs::append::console::ConsoleAppender::builder()
                .encoder(encoder)
                .build(),
            ),
          ),
      )
      .build(
        log4rs::config::Root::builder()
          .appenders(["console", "file"])
          .build(log::LevelFilter::Trace),
      )?,
  )?;
  Ok(())
}

/// Shared `--log-directory`/verbosity flags, flattened into every binary's
/// `Arguments` struct the way the teacher flattens its own logging flags.
#[derive(clap::Args)]
#[group(skip)]
pub struct LoggingArguments {
  #[arg(
    long = "log-directory",
    help = "Log directory",
    default_value_t = String::from("$ENV{XDG_RUNTIME_DIR}")
  )]
  pub log_directory: String,
  #[clap(flatten)]
  pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

impl LoggingArguments {
  pub fn init(&self, name: &str) -> anyhow::Result<()> {
    init_logging(
      name,
      path::Path::new(&self.log_directory),
      self.verbose.log_level_filter(),
    )
  }
}
