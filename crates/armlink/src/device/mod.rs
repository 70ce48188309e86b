//! Typed command façade.
//!
//! [`Dobot`] turns each protocol command into a [`Message`] with the right
//! id, direction and queue flag, submits it through a [`Connector`] and
//! decodes the reply. Commands that may be queued on the device take a
//! `queued` flag and return the queue index the device assigned.

use std::time::{Duration, Instant};

use armlink_dispatch::{Connector, DispatchConfig, LinkState};
use armlink_frame::{Message, ProtocolId};
use armlink_transport::{Transport, TransportConfig};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

pub mod error;
pub mod motion;
pub mod payload;
pub mod peripherals;
pub mod setup;
pub mod status;

pub use error::{DeviceError, Result};
pub use motion::{
    ArcCmd, ArcCommonParams, ArcParams, ArmOrientation, AutoLevelingCmd, CircleCmd, CpCmd,
    CpCommonParams, CpMode, CpParams, HomeCmd, HomeParams, JogCmd, JogCommand, JogCommonParams,
    JogCoordinateParams, JogJointParams, JogLParams, ParallelOutputCmd, Point, PtpCmd,
    PtpCommonParams, PtpCoordinateParams, PtpJointParams, PtpJump2Params, PtpJumpParams,
    PtpLParams, PtpMode, PtpWithLCmd, TrigCmd, WaitCmd,
};
pub use payload::{decode_reply, Decode, Payload};
pub use peripherals::{
    Color, EMotor, EMotorS, EndEffectorParams, HhtTrigMode, IoAdc, IoDo, IoFunction,
    IoMultiplexing, IoPwm, SensorConfig, SensorPort, ToolState,
};
pub use setup::ArmAngles;
pub use status::{raised_alarms, DeviceCountInfo, DeviceVersion, Kinematics, Pose};

/// Client for one arm.
///
/// Every method is a single request/reply exchange; calls from concurrent
/// tasks reach the device in the order they were made.
pub struct Dobot {
    link: Connector,
}

impl Dobot {
    /// Open `endpoint` (a `/dev/...` serial path or a UDP `host:port`).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn open(
        endpoint: &str,
        transport_config: &TransportConfig,
        config: DispatchConfig,
    ) -> Result<Self> {
        Ok(Self::from_connector(Connector::open(
            endpoint,
            transport_config,
            config,
        )?))
    }

    /// Drive an already open transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_transport(transport: Transport, config: DispatchConfig) -> Result<Self> {
        Ok(Self::from_connector(Connector::with_transport(
            transport, config,
        )?))
    }

    pub fn from_connector(link: Connector) -> Self {
        Self { link }
    }

    /// The underlying request pipeline.
    pub fn connector(&self) -> &Connector {
        &self.link
    }

    /// Latest alarm bitmap and queue credit seen by the link.
    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Close the link. Idempotent.
    pub async fn close(&self) {
        self.link.close().await;
    }

    /// Submit a raw message and return the device's reply.
    pub async fn request(&self, msg: Message) -> Result<Message> {
        Ok(self.link.submit(msg).await?)
    }

    /// Read and decode a fixed-layout value.
    pub(crate) async fn get<T: Decode>(&self, id: ProtocolId) -> Result<T> {
        let reply = self.request(Message::read(id)).await?;
        decode_reply(&reply)
    }

    /// Read with request parameters (e.g. an I/O address) and decode the reply.
    pub(crate) async fn get_with<P: Payload, T: Decode>(&self, id: ProtocolId, key: &P) -> Result<T> {
        let msg = Message::new(id, false, false, key.to_bytes());
        let reply = self.request(msg).await?;
        decode_reply(&reply)
    }

    /// Write a value immediately.
    pub(crate) async fn set<T: Payload>(&self, id: ProtocolId, value: &T) -> Result<()> {
        self.request(Message::write(id, value.to_bytes())).await?;
        Ok(())
    }

    /// Write a value, optionally through the device command queue.
    pub(crate) async fn set_queued<T: Payload>(
        &self,
        id: ProtocolId,
        value: &T,
        queued: bool,
    ) -> Result<Option<u64>> {
        let msg = Message::write(id, value.to_bytes()).queued(queued);
        self.command(msg).await
    }

    /// Write a value that the device only accepts through its command queue.
    pub(crate) async fn enqueue<T: Payload>(&self, id: ProtocolId, value: &T) -> Result<u64> {
        self.enqueue_raw(id, value.to_bytes()).await
    }

    pub(crate) async fn enqueue_raw(&self, id: ProtocolId, params: Bytes) -> Result<u64> {
        let msg = Message::write(id, params).queued(true);
        match self.command(msg).await? {
            Some(index) => Ok(index),
            None => Err(payload::short_reply(id, 8, 0)),
        }
    }

    /// Submit a write; for queued messages return the assigned queue index.
    async fn command(&self, msg: Message) -> Result<Option<u64>> {
        let id = msg.id;
        let queued = msg.is_queued;
        let reply = self.request(msg).await?;
        if !queued {
            return Ok(None);
        }
        match reply.u64_le() {
            Some(index) => {
                debug!(%id, index, "command queued");
                Ok(Some(index))
            }
            None => Err(payload::short_reply(id, 8, reply.params.len())),
        }
    }

    async fn get_text(&self, id: ProtocolId) -> Result<String> {
        let reply = self.request(Message::read(id)).await?;
        let text = reply.params.split(|b| *b == 0).next().unwrap_or_default();
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    async fn set_text(&self, id: ProtocolId, what: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(DeviceError::InvalidParams(format!("empty {what}")));
        }
        if text.as_bytes().contains(&0) {
            return Err(DeviceError::InvalidParams(format!("{what} contains NUL")));
        }
        let mut params = BytesMut::with_capacity(text.len() + 1);
        params.put_slice(text.as_bytes());
        params.put_u8(0);
        self.request(Message::write(id, params.freeze())).await?;
        Ok(())
    }

    async fn get_flag(&self, id: ProtocolId) -> Result<bool> {
        self.get::<bool>(id).await
    }

    /// Read a one-byte enum, rejecting values outside its domain.
    async fn get_enum<E: TryFrom<u8, Error = u8>>(&self, id: ProtocolId) -> Result<E> {
        let raw = self.get::<u8>(id).await?;
        E::try_from(raw).map_err(|value| DeviceError::UnexpectedValue { id, value })
    }

    // Queue control.

    /// Start executing the device command queue.
    pub async fn start_queue(&self) -> Result<()> {
        self.fire(ProtocolId::QueuedCmdStartExec).await
    }

    /// Stop executing after the current command.
    pub async fn stop_queue(&self) -> Result<()> {
        self.fire(ProtocolId::QueuedCmdStopExec).await
    }

    /// Stop executing immediately.
    pub async fn force_stop_queue(&self) -> Result<()> {
        self.fire(ProtocolId::QueuedCmdForceStopExec).await
    }

    /// Start storing queued commands for offline playback.
    pub async fn start_download(&self, total_loop: u32, line_per_loop: u32) -> Result<()> {
        self.set(ProtocolId::QueuedCmdStartDownload, &(total_loop, line_per_loop))
            .await
    }

    pub async fn stop_download(&self) -> Result<()> {
        self.fire(ProtocolId::QueuedCmdStopDownload).await
    }

    /// Drop every command still waiting in the device queue.
    pub async fn clear_queue(&self) -> Result<()> {
        self.fire(ProtocolId::QueuedCmdClear).await
    }

    /// Free slots in the device command queue.
    pub async fn queue_left_space(&self) -> Result<u32> {
        self.get(ProtocolId::QueuedCmdLeftSpace).await
    }

    /// Index of the queued command the device is executing.
    pub async fn queue_current_index(&self) -> Result<u64> {
        self.get(ProtocolId::QueuedCmdCurrentIndex).await
    }

    /// Whether the last queued motion has finished.
    pub async fn motion_finished(&self) -> Result<bool> {
        self.get_flag(ProtocolId::QueuedCmdMotionFinish).await
    }

    /// Poll the current queue index until the device reaches `index`.
    ///
    /// `timeout` of `None` waits indefinitely.
    pub async fn wait_for_queued_index(
        &self,
        index: u64,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            let current = self.queue_current_index().await?;
            if current >= index {
                return Ok(());
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(DeviceError::QueueWaitTimeout { index, current });
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn fire(&self, id: ProtocolId) -> Result<()> {
        self.request(Message::write(id, Bytes::new())).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Dobot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dobot")
            .field("closed", &self.link.is_closed())
            .finish()
    }
}


#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::testing::{answering, device, last, reply};
    use super::*;

    #[tokio::test]
    async fn text_reads_stop_at_nul() {
        let (dobot, _) = device(answering(b"DT-1234\0\0".to_vec()));
        assert_eq!(dobot.device_sn().await.unwrap(), "DT-1234");
        dobot.close().await;
    }

    #[tokio::test]
    async fn text_writes_are_nul_terminated() {
        let (dobot, seen) = device(answering(Vec::new()));
        dobot.set_device_name("bench-arm").await.unwrap();

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::DeviceName);
        assert!(sent.rw);
        assert_eq!(sent.params.as_ref(), b"bench-arm\0");
        dobot.close().await;
    }

    #[tokio::test]
    async fn empty_text_is_rejected_locally() {
        let (dobot, seen) = device(answering(Vec::new()));
        let err = dobot.set_device_sn("").await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParams(_)));
        assert!(seen.lock().unwrap().is_empty());
        dobot.close().await;
    }

    #[tokio::test]
    async fn queued_write_returns_index() {
        let (dobot, seen) = device(answering(Vec::new()));
        let index = dobot
            .set_home_params(
                &HomeParams {
                    x: 200.0,
                    y: 0.0,
                    z: 50.0,
                    r: 0.0,
                },
                true,
            )
            .await
            .unwrap();
        assert_eq!(index, Some(42));

        let sent = last(&seen);
        assert!(sent.is_queued);
        assert_eq!(sent.params.len(), 16);
        dobot.close().await;
    }

    #[tokio::test]
    async fn immediate_write_has_no_index() {
        let (dobot, seen) = device(answering(Vec::new()));
        let index = dobot
            .set_ptp_common_params(
                &PtpCommonParams {
                    velocity_ratio: 50.0,
                    acceleration_ratio: 50.0,
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(index, None);
        assert!(!last(&seen).is_queued);
        dobot.close().await;
    }

    #[tokio::test]
    async fn short_queue_index_is_invalid_response() {
        let (dobot, _) = device(Arc::new(|request: &Message| {
            if request.id == ProtocolId::QueuedCmdLeftSpace {
                return Some(reply(request, 8u32.to_le_bytes().to_vec()));
            }
            Some(reply(request, vec![0x01, 0x02]))
        }));
        let err = dobot.wait(&WaitCmd { timeout_ms: 100 }).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InvalidResponse {
                id: ProtocolId::WaitCmd,
                expected: 8,
                actual: 2
            }
        ));
        dobot.close().await;
    }

    #[tokio::test]
    async fn start_download_packs_two_counters() {
        let (dobot, seen) = device(answering(Vec::new()));
        dobot.start_download(3, 10).await.unwrap();

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::QueuedCmdStartDownload);
        assert_eq!(sent.params.as_ref(), &[3, 0, 0, 0, 10, 0, 0, 0]);
        dobot.close().await;
    }

    #[tokio::test]
    async fn queue_triggers_carry_no_params() {
        let (dobot, seen) = device(answering(Vec::new()));
        dobot.start_queue().await.unwrap();
        dobot.stop_queue().await.unwrap();
        dobot.force_stop_queue().await.unwrap();
        dobot.clear_queue().await.unwrap();

        let seen = seen.lock().unwrap();
        let ids: Vec<_> = seen.iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                ProtocolId::QueuedCmdStartExec,
                ProtocolId::QueuedCmdStopExec,
                ProtocolId::QueuedCmdForceStopExec,
                ProtocolId::QueuedCmdClear,
            ]
        );
        assert!(seen.iter().all(|m| m.rw && m.params.is_empty()));
    }

    #[tokio::test]
    async fn wait_for_queued_index_polls_until_reached() {
        let polls = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counter = Arc::clone(&polls);
        let (dobot, _) = device(Arc::new(move |request: &Message| {
            let current = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(reply(request, current.to_le_bytes().to_vec()))
        }));

        dobot
            .wait_for_queued_index(3, Duration::from_millis(5), Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 4);
        dobot.close().await;
    }

    #[tokio::test]
    async fn wait_for_queued_index_gives_up() {
        let (dobot, _) = device(answering(1u64.to_le_bytes().to_vec()));
        let err = dobot
            .wait_for_queued_index(9, Duration::from_millis(5), Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::QueueWaitTimeout {
                index: 9,
                current: 1
            }
        ));
        dobot.close().await;
    }

    #[tokio::test]
    async fn closed_link_surfaces_dispatch_error() {
        let (dobot, _) = device(answering(Vec::new()));
        dobot.close().await;

        let err = dobot.pose().await.unwrap_err();
        assert!(matches!(
            err.as_dispatch(),
            Some(armlink_dispatch::DispatchError::Closed)
        ));
    }
}
