//! Byte transports for the armlink robot-arm protocol.
//!
//! Provides a unified blocking byte stream over the links the device offers:
//! - Serial (USB-UART, 115200 8N1 by default)
//! - UDP (WiFi module)
//!
//! This is the lowest layer of armlink. Framing and the command pipeline
//! build on the [`Transport`] type provided here.

pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod stream;

pub use discovery::{discover, DiscoveryConfig, DEFAULT_DISCOVERY_TIMEOUT};
pub use endpoint::{Endpoint, TransportConfig, TransportKind, DEFAULT_BAUD_RATE};
pub use error::{Result, TransportError};
pub use stream::Transport;
