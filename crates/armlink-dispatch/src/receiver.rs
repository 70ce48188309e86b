use std::sync::Arc;
use std::thread::JoinHandle;

use armlink_frame::{FrameReader, Message};
use armlink_transport::Transport;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::DispatchError;

/// Start the receiver on its own OS thread.
///
/// The thread owns the read side of the transport and publishes every parsed
/// message to `inbound`. On EOF or a read error it reports the cause on
/// `exit` and stops; it never writes.
pub(crate) fn spawn(
    transport: Transport,
    inbound: mpsc::Sender<Message>,
    exit: oneshot::Sender<DispatchError>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("armlink-receiver".to_string())
        .spawn(move || run(transport, inbound, exit))
}

fn run(transport: Transport, inbound: mpsc::Sender<Message>, exit: oneshot::Sender<DispatchError>) {
    let mut reader = FrameReader::new(transport);
    loop {
        match reader.read_message() {
            Ok(msg) => {
                trace!(id = %msg.id, len = msg.ack_len(), "received message");
                if inbound.blocking_send(msg).is_err() {
                    debug!("dispatcher gone, receiver stopping");
                    return;
                }
            }
            Err(err) => {
                let cause = if reader.get_ref().is_closed() {
                    debug!("transport closed, receiver stopping");
                    DispatchError::Closed
                } else {
                    warn!(%err, "transport read failed");
                    DispatchError::Transport(Arc::new(err))
                };
                let _ = exit.send(cause);
                return;
            }
        }
    }
}
