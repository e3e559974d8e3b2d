//! Printer adapters for sending ESC/POS data
//!
//! Supports:
//! - Network printers (raw TCP, port 9100)
//! - USB printers (see [`crate::usb`])

use crate::error::{PrintError, PrintResult};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Raw printing port understood by nearly every network thermal printer
pub const DEFAULT_PORT: u16 = 9100;

/// Trait for printer adapters
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw ESC/POS data to the printer, returning the number of bytes delivered
    async fn print(&self, data: &[u8]) -> PrintResult<usize>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Timeouts for one network print attempt
#[derive(Debug, Clone, Copy)]
pub struct NetworkTimeouts {
    /// Hard cutoff for the TCP handshake
    pub connect: Duration,
    /// Hard cutoff for write + grace + peer close, counted after connect
    pub write: Duration,
    /// Pause between the last write and the half-close
    pub close_grace: Duration,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(5000),
            write: Duration::from_millis(10000),
            close_grace: Duration::from_millis(100),
        }
    }
}

/// Outcome of a reachability probe
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProbe {
    pub ip: String,
    pub port: u16,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Network printer (TCP port 9100)
///
/// Every print opens its own socket and closes it afterwards; printers on
/// a restaurant LAN are too unreliable to hold connections open.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeouts: NetworkTimeouts,
}

impl NetworkPrinter {
    /// Create a new network printer from an IP address and port
    pub fn new(ip: &str, port: u16) -> PrintResult<Self> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid IP address: {}", ip)))?;

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            timeouts: NetworkTimeouts::default(),
        })
    }

    /// Create from a socket address string (e.g., "192.168.1.100:9100")
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;

        Ok(Self {
            addr,
            timeouts: NetworkTimeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: NetworkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send the whole buffer in one connection
    ///
    /// Success means the bytes were written and the printer then closed the
    /// connection. A printer that accepts but never closes fails once the
    /// write timeout elapses.
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    pub async fn send(&self, data: &[u8]) -> PrintResult<usize> {
        debug!("Connecting to printer");

        let mut stream = tokio::time::timeout(self.timeouts.connect, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        debug!("Connected, sending {} bytes", data.len());

        // Dropping the stream on any exit path closes the socket
        match tokio::time::timeout(self.timeouts.write, self.deliver(&mut stream, data)).await {
            Ok(Ok(sent)) => {
                info!(bytes = sent, "Print job sent successfully");
                Ok(sent)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Print job failed");
                Err(e)
            }
            Err(_) => {
                warn!("Printer did not finish within write timeout");
                Err(PrintError::Timeout(format!(
                    "Printer {} did not respond within {} ms",
                    self.addr,
                    self.timeouts.write.as_millis()
                )))
            }
        }
    }

    async fn deliver(&self, stream: &mut TcpStream, data: &[u8]) -> PrintResult<usize> {
        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        stream.flush().await?;
        let sent = data.len();

        // Some printers drop the tail of a job if the socket closes right away
        tokio::time::sleep(self.timeouts.close_grace).await;
        stream.shutdown().await?;

        // Wait for the printer to close its side; status bytes are discarded
        let mut sink = [0u8; 256];
        loop {
            match stream.read(&mut sink).await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => return Err(PrintError::Connection(format!("{}: {}", self.addr, e))),
            }
        }

        if sent == 0 {
            return Err(PrintError::NothingSent);
        }
        Ok(sent)
    }

    /// Probe whether the printer accepts TCP connections
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn test_connection(&self) -> ConnectionProbe {
        let started = Instant::now();
        let mut probe = ConnectionProbe {
            ip: self.addr.ip().to_string(),
            port: self.addr.port(),
            success: false,
            latency_ms: None,
            error: None,
        };

        match tokio::time::timeout(self.timeouts.connect, TcpStream::connect(self.addr)).await {
            Ok(Ok(_stream)) => {
                probe.success = true;
                probe.latency_ms = Some(started.elapsed().as_millis() as u64);
            }
            Ok(Err(e)) => probe.error = Some(e.to_string()),
            Err(_) => probe.error = Some("Timeout - printer did not respond".to_string()),
        }
        probe
    }
}

impl Printer for NetworkPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<usize> {
        self.send(data).await
    }

    async fn is_online(&self) -> bool {
        self.test_connection().await.success
    }
}

/// Probe `ip:port` with default timeouts
pub async fn test_connection(ip: &str, port: u16) -> ConnectionProbe {
    match NetworkPrinter::new(ip, port) {
        Ok(printer) => printer.test_connection().await,
        Err(e) => ConnectionProbe {
            ip: ip.to_string(),
            port,
            success: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// Send `data` to `ip:port` with default timeouts
pub async fn send(ip: &str, port: u16, data: &[u8]) -> PrintResult<usize> {
    NetworkPrinter::new(ip, port)?.send(data).await
}
