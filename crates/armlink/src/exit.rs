use std::fmt;
use std::io;

use armlink::dispatch::DispatchError;
use armlink::transport::TransportError;
use armlink::DeviceError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const ALARM: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => FAILURE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::InvalidEndpoint { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn dispatch_error(context: &str, err: &DispatchError) -> CliError {
    match err {
        DispatchError::Open(source) => transport_error(context, source),
        DispatchError::Transport(_) | DispatchError::Closed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        DispatchError::Oversize { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        DispatchError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        DispatchError::AlarmRaised { .. } => CliError::new(ALARM, format!("{context}: {err}")),
        DispatchError::NoQueueSpace | DispatchError::Cancelled => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match &err {
        DeviceError::Dispatch(inner) => dispatch_error(context, inner),
        DeviceError::InvalidResponse { .. } | DeviceError::UnexpectedValue { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DeviceError::InvalidParams(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DeviceError::QueueWaitTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use armlink::frame::ProtocolId;

    use super::*;

    #[test]
    fn alarm_maps_to_alarm_code() {
        let err = DeviceError::Dispatch(DispatchError::AlarmRaised { group: 1, code: 4 });
        assert_eq!(device_error("pose", err).code, ALARM);
    }

    #[test]
    fn reply_timeout_maps_to_timeout() {
        let err = DispatchError::Timeout {
            id: ProtocolId::GetPose,
            attempts: 3,
        };
        assert_eq!(dispatch_error("pose", &err).code, TIMEOUT);
    }

    #[test]
    fn bad_endpoint_is_usage() {
        let err = DispatchError::Open(Arc::new(TransportError::InvalidEndpoint {
            endpoint: "nowhere".to_string(),
            reason: "expected host:port".to_string(),
        }));
        let cli = dispatch_error("open", &err);
        assert_eq!(cli.code, USAGE);
        assert!(cli.message.starts_with("open: "));
    }

    #[test]
    fn short_reply_is_data_invalid() {
        let err = DeviceError::InvalidResponse {
            id: ProtocolId::GetPose,
            expected: 32,
            actual: 4,
        };
        assert_eq!(device_error("pose", err).code, DATA_INVALID);
    }
}
