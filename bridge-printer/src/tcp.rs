//! Network printer transport (raw TCP, port 9100 style)

use crate::error::{PrintError, PrintResult};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

/// Connect timeout for print sessions
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for printer transports
///
/// A transport delivers an opaque byte blob to one physical printer.
/// The bytes are never inspected or transformed.
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw printer data
    async fn print(&self, data: &[u8]) -> PrintResult<()>;
}

/// Network printer (raw TCP)
///
/// Most thermal printers accept a raw byte stream on TCP port 9100.
/// Sessions are connection-scoped: one connect, one write, one close.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a network printer from an IP string and port
    pub fn new(ip: &str, port: u16) -> PrintResult<Self> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| PrintError::InvalidAddress(ip.to_string()))?;

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            timeout: CONNECT_TIMEOUT,
        })
    }

    /// Override the connect timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The printer's socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.addr, bytes = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        debug!("Connecting to printer");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::ConnectTimeout(self.addr.to_string()))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    PrintError::ConnectRefused(self.addr.to_string())
                }
                _ => PrintError::Io(e),
            })?;

        stream.write_all(data).await?;
        stream.flush().await?;

        // Printers on 9100 treat the session as the job boundary
        let _ = stream.shutdown().await;

        info!("Print job sent");
        Ok(())
    }
}
