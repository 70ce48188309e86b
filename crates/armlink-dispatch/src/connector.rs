use std::sync::{Arc, Mutex, OnceLock};

use armlink_frame::{Message, MAX_PARAMS_LEN};
use armlink_transport::{Transport, TransportConfig};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DispatchConfig;
use crate::dispatcher::{Dispatcher, DispatcherParts, Submission};
use crate::error::{DispatchError, Result};
use crate::receiver;
use crate::state::LinkState;

/// A live link to one device.
///
/// Owns the receiver thread and the dispatcher task. `submit` may be called
/// concurrently from any task through a shared reference; requests reach the
/// wire one at a time in arrival order.
pub struct Connector {
    submissions: mpsc::Sender<Submission>,
    terminal: Arc<OnceLock<DispatchError>>,
    state: watch::Receiver<LinkState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    /// Open `endpoint` and start the link.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn open(
        endpoint: &str,
        transport_config: &TransportConfig,
        config: DispatchConfig,
    ) -> Result<Self> {
        let transport = Transport::open(endpoint, transport_config)?;
        info!(endpoint, "device link opening");
        Self::with_transport(transport, config)
    }

    /// Start the link over an already open transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_transport(transport: Transport, config: DispatchConfig) -> Result<Self> {
        let reader = transport.try_clone()?;

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_depth.max(1));
        let (exit_tx, exit_rx) = oneshot::channel();
        let (submit_tx, submit_rx) = mpsc::channel(config.submit_queue_depth.max(1));
        let (state_tx, state_rx) = watch::channel(LinkState::default());
        let terminal = Arc::new(OnceLock::new());
        let shutdown = CancellationToken::new();

        if let Err(err) = receiver::spawn(reader, inbound_tx, exit_tx) {
            transport.close();
            return Err(DispatchError::Open(Arc::new(err.into())));
        }

        let dispatcher = Dispatcher::new(
            DispatcherParts {
                writer: transport,
                inbound: inbound_rx,
                receiver_exit: exit_rx,
                submissions: submit_rx,
                shutdown: shutdown.clone(),
                terminal: Arc::clone(&terminal),
                state: state_tx,
            },
            config,
        );
        let task = tokio::spawn(dispatcher.run());

        Ok(Self {
            submissions: submit_tx,
            terminal,
            state: state_rx,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Send `msg` and wait for the device's reply.
    pub async fn submit(&self, msg: Message) -> Result<Message> {
        if let Some(err) = self.terminal.get() {
            return Err(err.clone());
        }
        if msg.params.len() > MAX_PARAMS_LEN {
            return Err(DispatchError::Oversize {
                size: msg.params.len(),
                max: MAX_PARAMS_LEN,
            });
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let submission = Submission {
            msg,
            reply: reply_tx,
        };
        if self.submissions.send(submission).await.is_err() {
            return Err(self.terminal_error());
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.terminal_error()),
        }
    }

    /// Like [`Connector::submit`], but returns `Cancelled` as soon as `cancel`
    /// fires. An exchange already on the wire still completes; its reply is
    /// dropped.
    pub async fn submit_with_cancel(
        &self,
        msg: Message,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.submit(msg) => result,
        }
    }

    /// Latest published link state.
    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    /// Subscribe to link state changes.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Whether the link has stopped.
    pub fn is_closed(&self) -> bool {
        self.terminal.get().is_some()
    }

    /// Close the link and wait for the dispatcher to stop. Idempotent.
    ///
    /// Pending and future submissions fail with `Closed`.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn terminal_error(&self) -> DispatchError {
        self.terminal.get().cloned().unwrap_or(DispatchError::Closed)
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("closed", &self.is_closed())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use armlink_frame::{encode_message, FrameReader, FrameWriter, ProtocolId};
    use bytes::BytesMut;

    use super::*;

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            reply_timeout: Duration::from_millis(100),
            alarm_poll_interval: None,
            ..DispatchConfig::default()
        }
    }

    fn transport_config() -> TransportConfig {
        TransportConfig {
            poll_interval: Duration::from_millis(10),
            ..TransportConfig::default()
        }
    }

    /// Scripted device on the far end of a socket pair. Every request the
    /// host sends is recorded; `respond` decides the replies.
    struct Device {
        handle: std::thread::JoinHandle<Vec<Message>>,
    }

    impl Device {
        fn spawn<F>(stream: UnixStream, mut respond: F) -> Self
        where
            F: FnMut(&Message) -> Vec<Message> + Send + 'static,
        {
            let handle = std::thread::spawn(move || {
                let mut writer = FrameWriter::new(stream.try_clone().unwrap());
                let mut reader = FrameReader::new(stream);
                let mut seen = Vec::new();
                while let Ok(request) = reader.read_message() {
                    let replies = respond(&request);
                    seen.push(request);
                    for reply in replies {
                        if writer.write_message(&reply).is_err() {
                            return seen;
                        }
                    }
                }
                seen
            });
            Self { handle }
        }

        fn requests(self) -> Vec<Message> {
            self.handle.join().unwrap()
        }
    }

    fn echo(request: &Message) -> Vec<Message> {
        let params = if request.is_queued {
            7u64.to_le_bytes().to_vec()
        } else {
            request.params.to_vec()
        };
        vec![Message::new(request.id, request.rw, request.is_queued, params)]
    }

    fn reply(id: ProtocolId, params: Vec<u8>) -> Message {
        Message::new(id, false, false, params)
    }

    fn connect(config: DispatchConfig) -> (Connector, UnixStream) {
        let (host, device) = UnixStream::pair().unwrap();
        let transport = Transport::from_local(host, &transport_config()).unwrap();
        (Connector::with_transport(transport, config).unwrap(), device)
    }

    fn ids(messages: &[Message]) -> Vec<ProtocolId> {
        messages.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn submit_returns_correlated_reply() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, |request| {
            let mut replies = vec![Message::read(ProtocolId::DeviceSn)];
            replies.extend(echo(request));
            replies
        });

        let reply = link
            .submit(Message::write(ProtocolId::EndEffectorSuctionCup, vec![1, 1]))
            .await
            .unwrap();
        assert_eq!(reply.id, ProtocolId::EndEffectorSuctionCup);
        assert_eq!(reply.params.as_ref(), &[1, 1]);

        link.close().await;
        assert_eq!(ids(&device.requests()), vec![ProtocolId::EndEffectorSuctionCup]);
    }

    #[tokio::test]
    async fn zero_credit_refreshes_left_space_first() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, |request| match request.id {
            ProtocolId::QueuedCmdLeftSpace => vec![reply(
                ProtocolId::QueuedCmdLeftSpace,
                vec![0x05, 0x00, 0x00, 0x00],
            )],
            _ => echo(request),
        });

        assert_eq!(link.state().left_space, 0);
        let reply = link
            .submit(Message::write(ProtocolId::HomeCmd, vec![0u8; 4]).queued(true))
            .await
            .unwrap();
        assert_eq!(reply.u64_le(), Some(7));
        assert_eq!(link.state().left_space, 4);

        link.close().await;
        let requests = device.requests();
        assert_eq!(
            ids(&requests),
            vec![ProtocolId::QueuedCmdLeftSpace, ProtocolId::HomeCmd]
        );
        assert!(!requests[0].rw);
    }

    #[tokio::test]
    async fn credit_counts_down_per_queued_submission() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, |request| match request.id {
            ProtocolId::QueuedCmdLeftSpace => vec![reply(
                ProtocolId::QueuedCmdLeftSpace,
                3u32.to_le_bytes().to_vec(),
            )],
            _ => echo(request),
        });

        for expected in [2, 1, 0] {
            link.submit(Message::write(ProtocolId::PtpCmd, vec![0u8; 17]).queued(true))
                .await
                .unwrap();
            assert_eq!(link.state().left_space, expected);
        }

        link.close().await;
        let refreshes = device
            .requests()
            .iter()
            .filter(|m| m.id == ProtocolId::QueuedCmdLeftSpace)
            .count();
        assert_eq!(refreshes, 1);
    }

    #[tokio::test]
    async fn no_queue_space_after_refresh() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, |request| match request.id {
            ProtocolId::QueuedCmdLeftSpace => vec![reply(ProtocolId::QueuedCmdLeftSpace, vec![0u8; 4])],
            _ => echo(request),
        });

        let err = link
            .submit(Message::write(ProtocolId::WaitCmd, vec![0u8; 4]).queued(true))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoQueueSpace));

        link.close().await;
        assert_eq!(ids(&device.requests()), vec![ProtocolId::QueuedCmdLeftSpace]);
    }

    #[tokio::test]
    async fn silent_device_is_retried_then_times_out() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, |_| Vec::new());

        let request = Message::write(ProtocolId::PtpCmd, vec![0x01; 17]);
        let err = link.submit(request.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Timeout {
                id: ProtocolId::PtpCmd,
                attempts: 3
            }
        ));

        // Timeouts are per submission; the link stays usable.
        assert!(!link.is_closed());

        link.close().await;
        let requests = device.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|m| *m == request));
    }

    #[tokio::test]
    async fn reply_on_second_attempt_succeeds() {
        let (link, device) = connect(fast_config());
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let device = Device::spawn(device, move |request| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Vec::new()
            } else {
                echo(request)
            }
        });

        let reply = link
            .submit(Message::read(ProtocolId::GetPose))
            .await
            .unwrap();
        assert_eq!(reply.id, ProtocolId::GetPose);

        link.close().await;
        assert_eq!(device.requests().len(), 2);
    }

    #[tokio::test]
    async fn alarm_gate_blocks_without_writing() {
        let config = DispatchConfig {
            alarm_poll_interval: Some(Duration::from_millis(10)),
            ..fast_config()
        };
        let (link, device) = connect(config);
        let device = Device::spawn(device, |request| match request.id {
            ProtocolId::AlarmsState => vec![reply(
                ProtocolId::AlarmsState,
                vec![0x00, 0x00, 0x10, 0x00],
            )],
            _ => echo(request),
        });

        let mut state = link.watch_state();
        state
            .wait_for(|s| s.active_alarm().is_some())
            .await
            .unwrap();

        let err = link
            .submit(Message::write(ProtocolId::PtpCmd, vec![0u8; 17]).queued(true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::AlarmRaised {
                group: 2,
                code: 0x10
            }
        ));

        link.close().await;
        let requests = device.requests();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|m| m.id == ProtocolId::AlarmsState));
    }

    #[tokio::test]
    async fn clearing_alarms_passes_the_gate() {
        let config = DispatchConfig {
            alarm_poll_interval: Some(Duration::from_millis(10)),
            ..fast_config()
        };
        let (link, device) = connect(config);
        let cleared = Arc::new(AtomicUsize::new(0));
        let device_cleared = Arc::clone(&cleared);
        let _device = Device::spawn(device, move |request| match (request.id, request.rw) {
            (ProtocolId::AlarmsState, true) => {
                device_cleared.store(1, Ordering::SeqCst);
                echo(request)
            }
            (ProtocolId::AlarmsState, false) => {
                let code = if device_cleared.load(Ordering::SeqCst) == 0 { 0x01 } else { 0x00 };
                vec![reply(ProtocolId::AlarmsState, vec![code, 0x00])]
            }
            _ => echo(request),
        });

        let mut state = link.watch_state();
        state
            .wait_for(|s| s.active_alarm().is_some())
            .await
            .unwrap();

        link.submit(Message::write(ProtocolId::AlarmsState, Vec::new()))
            .await
            .unwrap();
        assert_eq!(link.state().active_alarm(), None);

        link.submit(Message::read(ProtocolId::GetPose)).await.unwrap();
        link.close().await;
    }

    #[tokio::test]
    async fn submissions_complete_in_order() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, echo);
        let link = Arc::new(link);

        let order = [
            ProtocolId::DeviceSn,
            ProtocolId::DeviceName,
            ProtocolId::DeviceVersion,
            ProtocolId::GetPose,
            ProtocolId::GetKinematics,
            ProtocolId::ArmOrientation,
        ];
        let mut handles = Vec::new();
        for id in order {
            let link = Arc::clone(&link);
            handles.push(tokio::spawn(async move {
                link.submit(Message::read(id)).await
            }));
            tokio::task::yield_now().await;
        }
        for (handle, id) in handles.into_iter().zip(order) {
            assert_eq!(handle.await.unwrap().unwrap().id, id);
        }

        link.close().await;
        assert_eq!(ids(&device.requests()), order.to_vec());
    }

    #[tokio::test]
    async fn submissions_keep_order_while_alarms_are_polled() {
        let config = DispatchConfig {
            alarm_poll_interval: Some(Duration::from_millis(5)),
            ..fast_config()
        };
        let (link, device) = connect(config);
        let device = Device::spawn(device, echo);
        let link = Arc::new(link);

        // Let a few polls go out before the first submission.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let order = [
            ProtocolId::DeviceSn,
            ProtocolId::GetPose,
            ProtocolId::DeviceName,
            ProtocolId::GetKinematics,
            ProtocolId::DeviceVersion,
            ProtocolId::ArmOrientation,
        ];
        let mut handles = Vec::new();
        for id in order {
            let link = Arc::clone(&link);
            handles.push(tokio::spawn(async move {
                link.submit(Message::read(id)).await
            }));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        for (handle, id) in handles.into_iter().zip(order) {
            assert_eq!(handle.await.unwrap().unwrap().id, id);
        }

        link.close().await;
        let requests = device.requests();
        let user: Vec<_> = requests
            .iter()
            .filter(|m| m.id != ProtocolId::AlarmsState)
            .map(|m| m.id)
            .collect();
        assert_eq!(user, order.to_vec());
        assert!(requests.iter().any(|m| m.id == ProtocolId::AlarmsState));
    }

    #[tokio::test]
    async fn unanswered_alarm_polls_do_not_starve_submissions() {
        let config = DispatchConfig {
            reply_timeout: Duration::from_millis(50),
            alarm_poll_interval: Some(Duration::from_millis(100)),
            ..fast_config()
        };
        let (link, device) = connect(config);
        let device = Device::spawn(device, |request| match request.id {
            ProtocolId::AlarmsState => Vec::new(),
            _ => echo(request),
        });

        // The first poll is on the wire and will need all its attempts.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let reply = tokio::time::timeout(
            Duration::from_secs(3),
            link.submit(Message::read(ProtocolId::GetPose)),
        )
        .await
        .expect("submission was starved by alarm polls")
        .unwrap();
        assert_eq!(reply.id, ProtocolId::GetPose);
        assert!(!link.is_closed());

        link.close().await;
        let requests = device.requests();
        assert!(requests.iter().any(|m| m.id == ProtocolId::AlarmsState));
        assert_eq!(
            requests.iter().filter(|m| m.id == ProtocolId::GetPose).count(),
            1
        );
    }

    #[tokio::test]
    async fn oversize_is_rejected_before_dispatch() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, echo);

        let err = link
            .submit(Message::write(ProtocolId::UserParams, vec![0u8; MAX_PARAMS_LEN + 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Oversize { size: 168, .. }));
        assert!(!link.is_closed());

        link.close().await;
        assert!(device.requests().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_sticky() {
        let (link, device) = connect(fast_config());
        let device = Device::spawn(device, echo);

        link.close().await;
        link.close().await;
        assert!(link.is_closed());

        let err = link
            .submit(Message::read(ProtocolId::GetPose))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Closed));
        assert!(device.requests().is_empty());
    }

    #[tokio::test]
    async fn device_hangup_is_terminal() {
        let (link, mut far) = connect(fast_config());
        far.write_all(&[0x00]).unwrap();
        drop(far);

        let err = link
            .submit(Message::read(ProtocolId::GetPose))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(link.is_closed());

        let again = link
            .submit(Message::read(ProtocolId::GetPose))
            .await
            .unwrap_err();
        assert!(matches!(again, DispatchError::Transport(_)));

        link.close().await;
    }

    #[tokio::test]
    async fn write_failure_is_terminal_and_sticky() {
        let (host, _far) = UnixStream::pair().unwrap();
        host.shutdown(std::net::Shutdown::Write).unwrap();
        let transport = Transport::from_local(host, &transport_config()).unwrap();
        let link = Connector::with_transport(transport, fast_config()).unwrap();

        let err = link
            .submit(Message::read(ProtocolId::GetPose))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(link.is_closed());

        let again = link
            .submit(Message::read(ProtocolId::DeviceSn))
            .await
            .unwrap_err();
        assert!(matches!(again, DispatchError::Transport(_)));

        link.close().await;
    }

    #[tokio::test]
    async fn queued_submissions_fail_with_the_link_error() {
        let (link, far) = connect(DispatchConfig {
            reply_timeout: Duration::from_secs(5),
            ..fast_config()
        });
        let link = Arc::new(link);

        let mut handles = Vec::new();
        for id in [
            ProtocolId::GetPose,
            ProtocolId::DeviceSn,
            ProtocolId::DeviceName,
        ] {
            let link = Arc::clone(&link);
            handles.push(tokio::spawn(async move {
                link.submit(Message::read(id)).await
            }));
            tokio::task::yield_now().await;
        }

        // Take the first request off the wire, then hang up without replying.
        let first = tokio::task::spawn_blocking(move || {
            let mut reader = FrameReader::new(far);
            reader.read_message().unwrap()
        })
        .await
        .unwrap();
        assert_eq!(first.id, ProtocolId::GetPose);

        for handle in handles {
            let err = tokio::time::timeout(Duration::from_secs(3), handle)
                .await
                .expect("pending submission was not drained")
                .unwrap()
                .unwrap_err();
            assert!(matches!(err, DispatchError::Transport(_)));
        }
        assert!(link.is_closed());

        link.close().await;
    }

    #[tokio::test]
    async fn cancelled_submission_returns_promptly() {
        let (link, device) = connect(DispatchConfig {
            reply_timeout: Duration::from_secs(5),
            ..fast_config()
        });
        let mut far = device;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = link
            .submit_with_cancel(Message::read(ProtocolId::GetPose), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));

        link.close().await;
        let mut wire = Vec::new();
        far.read_to_end(&mut wire).unwrap();
        let mut expected = BytesMut::new();
        encode_message(&Message::read(ProtocolId::GetPose), &mut expected).unwrap();
        assert_eq!(wire, expected.to_vec());
    }
}
