// PrivMail Sender Client Proxy: accepts a plaintext outgoing DATA envelope
// from a local MUA, secret-shares it (C4/C1/C6) for every secret-sharing
// recipient known to the destination map, and dispatches the N shares
// concurrently, one outbound SMTP connection per share. Mirrors
// `Sender-Client-Proxy/sender_client_proxy.py`'s `ProxySMTPHandler`.

use anyhow::Context as _;
use clap::Parser as _;
use std::net::TcpListener;
use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(about = "PrivMail Sender Client Proxy (SCP)")]
struct Arguments {
  #[arg(long = "port", short = 'p', help = "Listening port", default_value_t = 55001)]
  port: u16,
  #[arg(
    long = "destination-map",
    help = "Path to the recipient -> share-destinations map",
    default_value = "destination_address_map.yaml"
  )]
  destination_map: PathBuf,
  #[arg(
    long = "mode",
    short = 'm',
    help = "Start outgoing SMTP connections in custom mode, skipping AUTH PLAIN \
            (default: authenticate against each destination's outgoing server)",
    default_value_t = false
  )]
  custom_mode: bool,
  #[clap(flatten)]
  logging: privmail::LoggingArguments,
}

fn dispatch_share(custom_mode: bool, destination: &privmail::Destination, mail_from: &str, message: &str) {
  let tcp = privmail::net::TCP {
    address: &destination.server,
    port: destination.port,
    timeout: Some(std::time::Duration::from_secs(30)),
  };
  let auth = if custom_mode {
    None
  } else {
    Some((destination.username.as_str(), destination.password.as_str()))
  };
  match privmail::smtp::send(&tcp, mail_from, &destination.destination, message, auth) {
    Ok(()) => log::info!("share sent to {}", destination.destination),
    Err(error) => log::error!("sending share to {} failed: {error:#}", destination.destination),
  }
}

fn main() -> anyhow::Result<()> {
  let arguments = Arguments::parse();
  arguments.logging.init("privmail-sender-proxy")?;

  let destination_map = privmail::DestinationMap::load(&arguments.destination_map)
    .context("loading destination address map")?;

  let listener = TcpListener::bind(("0.0.0.0", arguments.port))
    .with_context(|| format!("binding port {}", arguments.port))?;
  log::info!("PrivMail Sender Client Proxy (SCP) listening on port {}", arguments.port);

  privmail::smtp::serve_forever(&listener, |envelope| {
    let message = String::from_utf8_lossy(&envelope.data).into_owned();
    let (headers, body) = privmail::wire::split_headers_and_body(&message);
    let subject = headers
      .lines()
      .find_map(|line| line.strip_prefix("Subject:"))
      .unwrap_or_default()
      .trim()
      .to_string();

    for recipient in &envelope.rcpt_tos {
      let Some(targets) = destination_map.users.get(recipient) else {
        log::warn!("recipient {recipient} has no destination map entry, dropping (no plaintext fallback)");
        continue;
      };
      let n = targets.len();
      match privmail::share::send::assemble(&subject, body, n) {
        Ok(outbound) => {
          std::thread::scope(|scope| {
            for (target, share) in targets.iter().zip(outbound.iter()) {
              let message = privmail::wire::compose(&envelope.mail_from, &target.destination, &share.subject, &share.body);
              scope.spawn(|| dispatch_share(arguments.custom_mode, target, &envelope.mail_from, &message));
            }
          });
        }
        Err(error) => log::error!("failed to secret-share message for {recipient}: {error}"),
      }
    }

    "250 OK".to_string()
  })
}
