//! Transport abstraction (plain TCP, TLS over TCP, Unix socket)

use super::tls::TlsConfig;
use crate::{Error, Result};
use bytes::BytesMut;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;

/// Byte stream to the server
pub enum Transport {
    /// Plain TCP
    Tcp(TcpStream),
    /// TLS-encrypted TCP (boxed: the rustls session state is large)
    Tls(Box<TlsStream<TcpStream>>),
    /// Unix domain socket
    Unix(UnixStream),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Transport::Tcp(_) => "Transport::Tcp",
            Transport::Tls(_) => "Transport::Tls",
            Transport::Unix(_) => "Transport::Unix",
        })
    }
}

impl Transport {
    /// Connect via plain TCP.
    ///
    /// `host` is handed to the system resolver as-is; service names on a
    /// container network resolve there.
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Transport::Tcp(stream))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self> {
        Ok(Transport::Unix(UnixStream::connect(path).await?))
    }

    /// Whether this transport can be upgraded with SSLRequest
    pub fn is_plain_tcp(&self) -> bool {
        matches!(self, Transport::Tcp(_))
    }

    /// Whether the stream is encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Upgrade a plain TCP transport to TLS (after the server answered `S`)
    pub async fn upgrade_to_tls(self, tls: &TlsConfig, host: &str) -> Result<Self> {
        let tcp = match self {
            Transport::Tcp(tcp) => tcp,
            Transport::Tls(_) => return Err(Error::Tls("transport is already encrypted".into())),
            Transport::Unix(_) => {
                return Err(Error::Tls("cannot upgrade a Unix socket to TLS".into()))
            }
        };

        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|_| Error::Tls(format!("invalid hostname for TLS: {}", host)))?;
        let stream = tokio_rustls::TlsConnector::from(tls.client_config())
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))?;

        Ok(Transport::Tls(Box::new(stream)))
    }

    /// Write all bytes and flush
    pub async fn send(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(s) => {
                s.write_all(buf).await?;
                s.flush().await?;
            }
            Transport::Tls(s) => {
                s.write_all(buf).await?;
                s.flush().await?;
            }
            Transport::Unix(s) => {
                s.write_all(buf).await?;
                s.flush().await?;
            }
        }
        Ok(())
    }

    /// Read whatever is available into `buf`; `0` means end of stream
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Tcp(s) => s.read_buf(buf).await?,
            Transport::Tls(s) => s.read_buf(buf).await?,
            Transport::Unix(s) => s.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Read a single byte (the SSLRequest answer)
    pub async fn read_u8(&mut self) -> Result<u8> {
        let byte = match self {
            Transport::Tcp(s) => s.read_u8().await,
            Transport::Tls(s) => s.read_u8().await,
            Transport::Unix(s) => s.read_u8().await,
        };
        byte.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        })
    }

    /// Shut down the write half
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(s) => s.shutdown().await?,
            Transport::Tls(s) => s.shutdown().await?,
            Transport::Unix(s) => s.shutdown().await?,
        }
        Ok(())
    }
}
