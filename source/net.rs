// Blocking TCP/TLS stream setup, adapted from the teacher's `TCP`/`TLS`
// `Open` trait (source/lib.rs). `rustls::StreamOwned` owns both halves
// directly, so the self-referencing wrapper the teacher needed for its
// borrowed `rustls::Stream` isn't necessary here.

use anyhow::Context as _;
use std::{io, net, time};

pub trait Open {
  type RW: io::Read + io::Write;
  fn open(&self) -> anyhow::Result<Self::RW>;
}

pub struct TCP<'a> {
  pub address: &'a str,
  pub port: u16,
  pub timeout: Option<time::Duration>,
}

impl<'a> Open for TCP<'a> {
  type RW = net::TcpStream;

  fn open(&self) -> anyhow::Result<Self::RW> {
    use net::ToSocketAddrs as _;
    let &Self {
      address,
      port,
      timeout,
    } = self;
    let address = (address, port)
      .to_socket_addrs()?
      .next()
      .with_context(|| format!("couldn't resolve {address}:{port}"))?;
    log::debug!("connecting to {address:?} with timeout {timeout:?}");
    Ok(match timeout {
      Some(duration) => {
        let stream = net::TcpStream::connect_timeout(&address, duration)?;
        stream.set_read_timeout(Some(duration))?;
        stream
      }
      None => net::TcpStream::connect(address)?,
    })
  }
}

pub struct TLS<'a>(pub TCP<'a>);

pub type TLSStream = rustls::StreamOwned<rustls::ClientConnection, net::TcpStream>;

impl<'a> Open for TLS<'a> {
  type RW = TLSStream;

  fn open(&self) -> anyhow::Result<Self::RW> {
    let mut root_store = rustls::RootCertStore::empty();
    for certificate in rustls_native_certs::load_native_certs()? {
      root_store.add(&rustls::Certificate(certificate.0))?;
    }
    let config = rustls::ClientConfig::builder()
      .with_safe_defaults()
      .with_root_certificates(root_store)
      .with_no_client_auth();
    let server_name = self
      .0
      .address
      .try_into()
      .with_context(|| format!("couldn't convert {} to a server name", self.0.address))?;
    let connection = rustls::ClientConnection::new(std::sync::Arc::new(config), server_name)?;
    let tcp_stream = self.0.open()?;
    Ok(rustls::StreamOwned::new(connection, tcp_stream))
  }
}
