use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info};

use crate::endpoint::{Endpoint, TransportConfig, DEFAULT_POLL_INTERVAL};
use crate::error::{Result, TransportError};

/// A bidirectional byte channel to the device. Implements Read + Write.
///
/// Reads block until data arrives; the stream wakes up every poll interval
/// only to check whether [`Transport::close`] was called. Clones made with
/// [`Transport::try_clone`] share the closed state, so closing any handle
/// unblocks a reader parked on another.
pub struct Transport {
    inner: TransportInner,
    closed: Arc<AtomicBool>,
}

enum TransportInner {
    Serial(Box<dyn serialport::SerialPort>),
    Udp(UdpSocket),
    #[cfg(unix)]
    Local(std::os::unix::net::UnixStream),
}

impl Transport {
    /// Open the endpoint described by `endpoint` (see [`Endpoint::parse`]).
    pub fn open(endpoint: &str, config: &TransportConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(endpoint, config)?;
        Self::open_endpoint(&endpoint, config)
    }

    /// Open an already parsed endpoint.
    pub fn open_endpoint(endpoint: &Endpoint, config: &TransportConfig) -> Result<Self> {
        let poll = poll_interval(config);
        let inner = match endpoint {
            Endpoint::Serial { path, baud_rate } => {
                let port = serialport::new(path.as_str(), *baud_rate)
                    .data_bits(DataBits::Eight)
                    .parity(Parity::None)
                    .stop_bits(StopBits::One)
                    .flow_control(FlowControl::None)
                    .timeout(poll)
                    .open()
                    .map_err(|source| TransportError::Serial {
                        path: path.clone(),
                        source,
                    })?;
                info!(%path, baud_rate, "opened serial transport");
                TransportInner::Serial(port)
            }
            Endpoint::Udp { address } => {
                let socket = connect_udp(address, poll)?;
                info!(%address, "opened udp transport");
                TransportInner::Udp(socket)
            }
        };

        Ok(Self {
            inner,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Wrap one end of a local socket pair, used for in-process device links.
    #[cfg(unix)]
    pub fn from_local(
        stream: std::os::unix::net::UnixStream,
        config: &TransportConfig,
    ) -> Result<Self> {
        stream.set_read_timeout(Some(poll_interval(config)))?;
        Ok(Self {
            inner: TransportInner::Local(stream),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Try to clone this transport (creates a new OS handle).
    ///
    /// The clone shares the closed flag with the original.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            TransportInner::Serial(port) => {
                let cloned = port.try_clone().map_err(std::io::Error::from)?;
                TransportInner::Serial(cloned)
            }
            TransportInner::Udp(socket) => TransportInner::Udp(socket.try_clone()?),
            #[cfg(unix)]
            TransportInner::Local(stream) => TransportInner::Local(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            closed: Arc::clone(&self.closed),
        })
    }

    /// Close the transport. Idempotent.
    ///
    /// Pending and future reads and writes on every clone fail with
    /// `ErrorKind::NotConnected`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        #[cfg(unix)]
        if let TransportInner::Local(stream) = &self.inner {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        debug!(kind = self.kind(), "transport closed");
    }

    /// Whether `close()` has been called on this transport or a clone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            TransportInner::Serial(_) => "serial",
            TransportInner::Udp(_) => "udp",
            #[cfg(unix)]
            TransportInner::Local(_) => "local",
        }
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(ErrorKind::NotConnected, TransportError::Closed)
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.is_closed() {
                return Err(Self::closed_error());
            }
            let result = match &mut self.inner {
                TransportInner::Serial(port) => port.read(buf),
                TransportInner::Udp(socket) => match socket.recv(buf) {
                    // An empty datagram is not end-of-stream.
                    Ok(0) => continue,
                    // ICMP unreachable from an earlier send; the device may not be up yet.
                    Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                        debug!("udp peer unreachable, waiting");
                        continue;
                    }
                    other => other,
                },
                #[cfg(unix)]
                TransportInner::Local(stream) => stream.read(buf),
            };
            match result {
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Ok(0) if self.is_closed() => return Err(Self::closed_error()),
                other => return other,
            }
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }
        match &mut self.inner {
            TransportInner::Serial(port) => port.write(buf),
            TransportInner::Udp(socket) => socket.send(buf),
            #[cfg(unix)]
            TransportInner::Local(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            TransportInner::Serial(port) => port.flush(),
            TransportInner::Udp(_) => Ok(()),
            #[cfg(unix)]
            TransportInner::Local(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("type", &self.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn poll_interval(config: &TransportConfig) -> Duration {
    if config.poll_interval.is_zero() {
        DEFAULT_POLL_INTERVAL
    } else {
        config.poll_interval
    }
}

fn connect_udp(address: &str, poll: Duration) -> Result<UdpSocket> {
    let connect_err = |source: std::io::Error| TransportError::Connect {
        endpoint: address.to_string(),
        source,
    };

    let remote: SocketAddr = address
        .to_socket_addrs()
        .map_err(connect_err)?
        .next()
        .ok_or_else(|| {
            connect_err(std::io::Error::new(
                ErrorKind::NotFound,
                "endpoint resolved to no addresses",
            ))
        })?;

    let local = if remote.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(local).map_err(connect_err)?;
    socket.connect(remote).map_err(connect_err)?;
    socket.set_read_timeout(Some(poll)).map_err(connect_err)?;
    Ok(socket)
}
