//! Host-side driver for desktop robot arms.
//!
//! armlink talks to the arm over its USB serial port or its WiFi module (UDP),
//! using the `0xAA 0xAA`-framed request/reply protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte transports (serial, UDP) and LAN discovery
//! - [`frame`]: Message framing, checksums and the protocol id table
//! - [`dispatch`]: The request pipeline: ordering, retries, queue credit, alarm gate
//! - [`device`]: Typed command façade ([`device::Dobot`])
//! - [`sim`]: A UDP device simulator for demos and tests

pub mod device;
pub mod sim;

/// Re-export transport types.
pub mod transport {
    pub use armlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use armlink_frame::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use armlink_dispatch::*;
}

pub use device::{DeviceError, Dobot};
