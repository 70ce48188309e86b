use armlink_dispatch::DispatchError;
use armlink_frame::ProtocolId;

/// Errors returned by the [`crate::Dobot`] command façade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// The request pipeline failed (link, timeout, alarm, queue space).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The reply payload is shorter than the command's layout.
    #[error("invalid response to {id}: expected {expected} bytes, got {actual}")]
    InvalidResponse {
        id: ProtocolId,
        expected: usize,
        actual: usize,
    },

    /// The reply carried a value outside the command's domain.
    #[error("unexpected value {value} in response to {id}")]
    UnexpectedValue { id: ProtocolId, value: u8 },

    /// The request could not be built from the given arguments.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Gave up waiting for the device to reach a queued command index.
    #[error("queued command {index} not reached (device at {current})")]
    QueueWaitTimeout { index: u64, current: u64 },
}

impl DeviceError {
    /// The underlying dispatch error, if any.
    pub fn as_dispatch(&self) -> Option<&DispatchError> {
        match self {
            DeviceError::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
