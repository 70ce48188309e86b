use std::fmt;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Default serial baud rate used by the device firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default wake-up interval for blocking reads.
///
/// Reads never surface this as a timeout; it only bounds how long a reader
/// takes to notice [`crate::Transport::close`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Prefix that selects a serial device when no explicit kind is given.
const SERIAL_PREFIX: &str = "/dev/";

/// Which kind of link an endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A serial device (USB-UART on the arm's base).
    Serial,
    /// A UDP endpoint (the WiFi module), given as `host:port`.
    Udp,
}

impl TransportKind {
    /// Transport name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed device endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Serial device path and baud rate (8N1).
    Serial { path: String, baud_rate: u32 },
    /// UDP `host:port`, resolved when the transport opens.
    Udp { address: String },
}

impl Endpoint {
    /// Interpret an endpoint string.
    ///
    /// With `config.kind` unset, strings starting with `/dev/` open as serial
    /// devices and everything else is treated as a UDP `host:port`.
    pub fn parse(endpoint: &str, config: &TransportConfig) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "endpoint must not be empty".to_string(),
            });
        }

        let kind = config.kind.unwrap_or_else(|| {
            if endpoint.starts_with(SERIAL_PREFIX) {
                TransportKind::Serial
            } else {
                TransportKind::Udp
            }
        });

        match kind {
            TransportKind::Serial => {
                let baud_rate = if config.baud_rate == 0 {
                    DEFAULT_BAUD_RATE
                } else {
                    config.baud_rate
                };
                Ok(Endpoint::Serial {
                    path: endpoint.to_string(),
                    baud_rate,
                })
            }
            TransportKind::Udp => {
                let has_port = endpoint
                    .rsplit_once(':')
                    .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                    .unwrap_or(false);
                if !has_port {
                    return Err(TransportError::InvalidEndpoint {
                        endpoint: endpoint.to_string(),
                        reason: "expected host:port".to_string(),
                    });
                }
                Ok(Endpoint::Udp {
                    address: endpoint.to_string(),
                })
            }
        }
    }

    /// The transport kind this endpoint opens.
    pub fn kind(&self) -> TransportKind {
        match self {
            Endpoint::Serial { .. } => TransportKind::Serial,
            Endpoint::Udp { .. } => TransportKind::Udp,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial { path, baud_rate } => write!(f, "{path}@{baud_rate}"),
            Endpoint::Udp { address } => write!(f, "udp://{address}"),
        }
    }
}

/// Configuration for opening a transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Serial baud rate. `0` selects [`DEFAULT_BAUD_RATE`].
    pub baud_rate: u32,
    /// Explicit transport kind; `None` applies the `/dev/` prefix rule.
    pub kind: Option<TransportKind>,
    /// Read wake-up interval used to observe `close()`.
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            kind: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
