//! Request/reply dispatch for armlink devices.
//!
//! A [`Connector`] runs two workers over one [`armlink_transport::Transport`]:
//! a receiver thread that parses inbound frames, and a dispatcher task that
//! is the only writer. The dispatcher serves submissions in arrival order
//! with at most one frame in flight, correlates replies by command id,
//! retries on timeout, keeps the device queue credit and refuses to send
//! while the device reports an alarm.

pub mod config;
pub mod connector;
mod dispatcher;
pub mod error;
mod receiver;
pub mod state;

pub use config::{
    DispatchConfig, DEFAULT_ALARM_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS, DEFAULT_REPLY_TIMEOUT,
};
pub use connector::Connector;
pub use error::{DispatchError, Result};
pub use state::LinkState;
pub use tokio_util::sync::CancellationToken;
