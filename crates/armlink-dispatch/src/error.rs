use std::sync::Arc;

use armlink_frame::{FrameError, ProtocolId};
use armlink_transport::TransportError;

/// Errors returned to submitters.
///
/// Cloneable so one terminal failure can be handed to every outstanding and
/// future submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The device endpoint could not be opened.
    #[error("failed to open device link: {0}")]
    Open(Arc<TransportError>),

    /// The link failed while reading or writing. Terminal.
    #[error("transport error: {0}")]
    Transport(Arc<FrameError>),

    /// The link was closed, explicitly or after a terminal error.
    #[error("link closed")]
    Closed,

    /// The message does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    Oversize { size: usize, max: usize },

    /// No correlated reply arrived after every attempt.
    #[error("no reply to {id} after {attempts} attempts")]
    Timeout { id: ProtocolId, attempts: u32 },

    /// The device command queue is full.
    #[error("device command queue is full")]
    NoQueueSpace,

    /// The device reports an active alarm; nothing was sent.
    #[error("device alarm raised (group {group}, code {code:#04x})")]
    AlarmRaised { group: usize, code: u8 },

    /// The caller cancelled the submission.
    #[error("submission cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Whether this error ends the link for every submitter.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchError::Transport(_) | DispatchError::Closed)
    }
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        DispatchError::Open(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
