use std::sync::{Arc, OnceLock};

use armlink_frame::{FrameError, FrameWriter, Message, ProtocolId};
use armlink_transport::Transport;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::state::{first_alarm, LinkState};

enum Event {
    Shutdown,
    ReceiverExit(DispatchError),
    AlarmTick,
    Submission(Option<Submission>),
}

/// A caller's request waiting for the dispatcher.
pub(crate) struct Submission {
    pub(crate) msg: Message,
    pub(crate) reply: oneshot::Sender<Result<Message>>,
}

/// Channels and shared cells the dispatcher task runs against.
pub(crate) struct DispatcherParts {
    pub(crate) writer: Transport,
    pub(crate) inbound: mpsc::Receiver<Message>,
    pub(crate) receiver_exit: oneshot::Receiver<DispatchError>,
    pub(crate) submissions: mpsc::Receiver<Submission>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) terminal: Arc<OnceLock<DispatchError>>,
    pub(crate) state: watch::Sender<LinkState>,
}

/// The single writer: serves submissions one at a time, polls alarms and
/// keeps the queue credit. All link state is mutated only here.
pub(crate) struct Dispatcher {
    writer: FrameWriter<Transport>,
    inbound: mpsc::Receiver<Message>,
    receiver_exit: oneshot::Receiver<DispatchError>,
    submissions: mpsc::Receiver<Submission>,
    shutdown: CancellationToken,
    terminal: Arc<OnceLock<DispatchError>>,
    state: watch::Sender<LinkState>,
    config: DispatchConfig,
    alarms: Bytes,
    left_space: u32,
}

impl Dispatcher {
    pub(crate) fn new(parts: DispatcherParts, config: DispatchConfig) -> Self {
        Self {
            writer: FrameWriter::new(parts.writer),
            inbound: parts.inbound,
            receiver_exit: parts.receiver_exit,
            submissions: parts.submissions,
            shutdown: parts.shutdown,
            terminal: parts.terminal,
            state: parts.state,
            config,
            alarms: Bytes::new(),
            left_space: 0,
        }
    }

    /// Run until shutdown, a terminal link error, or every handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut alarm_tick = self.config.alarm_poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let exit = loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Event::Shutdown,
                cause = &mut self.receiver_exit => {
                    Event::ReceiverExit(cause.unwrap_or(DispatchError::Closed))
                }
                _ = next_tick(&mut alarm_tick) => Event::AlarmTick,
                submission = self.submissions.recv() => Event::Submission(submission),
            };

            let outcome = match event {
                Event::Shutdown => Err(DispatchError::Closed),
                Event::ReceiverExit(cause) => Err(cause),
                Event::AlarmTick => {
                    let polled = self.poll_alarms().await;
                    // A full period separates two polls; waiting submissions
                    // run in between.
                    if let Some(interval) = alarm_tick.as_mut() {
                        interval.reset();
                    }
                    polled
                }
                Event::Submission(Some(submission)) => self.serve(submission).await,
                Event::Submission(None) => Err(DispatchError::Closed),
            };
            if let Err(exit) = outcome {
                break exit;
            }
        };

        self.finish(exit);
    }

    /// Serve one submission. Returns `Err` only for terminal link errors.
    async fn serve(&mut self, submission: Submission) -> Result<()> {
        let Submission { msg, reply } = submission;
        if reply.is_closed() {
            debug!(id = %msg.id, "submission abandoned before dispatch");
            return Ok(());
        }

        let outcome = self.process(&msg).await;
        let terminal = match &outcome {
            Err(err) if err.is_terminal() => Some(err.clone()),
            _ => None,
        };
        if reply.send(outcome).is_err() {
            debug!(id = %msg.id, "submitter went away, reply dropped");
        }

        match terminal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn process(&mut self, msg: &Message) -> Result<Message> {
        // Clearing alarms must get through the gate.
        if msg.id != ProtocolId::AlarmsState {
            if let Some((group, code)) = first_alarm(&self.alarms) {
                return Err(DispatchError::AlarmRaised { group, code });
            }
        }

        if msg.is_queued && self.left_space == 0 {
            self.send_and_wait(&Message::read(ProtocolId::QueuedCmdLeftSpace))
                .await?;
            if self.left_space == 0 {
                return Err(DispatchError::NoQueueSpace);
            }
        }

        let reply = self.send_and_wait(msg).await?;

        if msg.is_queued {
            self.left_space = self.left_space.saturating_sub(1);
            self.publish();
        }
        if msg.id == ProtocolId::AlarmsState {
            if msg.rw {
                self.set_alarms(Bytes::new());
            } else {
                self.set_alarms(reply.params.clone());
            }
        }

        Ok(reply)
    }

    /// Write `msg` and wait for the reply with the same id, resending on
    /// timeout up to the configured attempt count.
    async fn send_and_wait(&mut self, msg: &Message) -> Result<Message> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!(id = %msg.id, attempt, "no reply, resending");
            }
            self.write(msg)?;

            let deadline = Instant::now() + self.config.reply_timeout;
            loop {
                let received = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Err(DispatchError::Closed),
                    received = timeout_at(deadline, self.inbound.recv()) => received,
                };

                match received {
                    Err(_elapsed) => break,
                    Ok(None) => return Err(self.receiver_error()),
                    Ok(Some(reply)) if reply.id == msg.id => {
                        if reply.id == ProtocolId::QueuedCmdLeftSpace {
                            self.refresh_left_space(&reply);
                        }
                        return Ok(reply);
                    }
                    Ok(Some(reply)) => {
                        debug!(expected = %msg.id, got = %reply.id, "dropping uncorrelated reply");
                    }
                }
            }
        }

        Err(DispatchError::Timeout {
            id: msg.id,
            attempts,
        })
    }

    fn write(&mut self, msg: &Message) -> Result<()> {
        debug!(id = %msg.id, rw = msg.rw, queued = msg.is_queued, len = msg.ack_len(), "sending message");
        self.writer.write_message(msg).map_err(|err| match err {
            FrameError::Oversize { size, max } => DispatchError::Oversize { size, max },
            _ if self.writer.get_ref().is_closed() => DispatchError::Closed,
            other => {
                warn!(err = %other, "transport write failed");
                DispatchError::Transport(Arc::new(other))
            }
        })
    }

    async fn poll_alarms(&mut self) -> Result<()> {
        match self
            .send_and_wait(&Message::read(ProtocolId::AlarmsState))
            .await
        {
            Ok(reply) => {
                self.set_alarms(reply.params);
                Ok(())
            }
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                warn!(%err, "alarm poll failed");
                Ok(())
            }
        }
    }

    fn refresh_left_space(&mut self, reply: &Message) {
        match reply.u32_le() {
            Some(space) => {
                debug!(space, "queue credit refreshed");
                self.left_space = space;
                self.publish();
            }
            None => warn!(len = reply.ack_len(), "short queue space reply ignored"),
        }
    }

    fn set_alarms(&mut self, alarms: Bytes) {
        if alarms == self.alarms {
            return;
        }
        match first_alarm(&alarms) {
            Some((group, code)) => warn!(group, code, "device alarm raised"),
            None => info!("device alarms cleared"),
        }
        self.alarms = alarms;
        self.publish();
    }

    fn publish(&self) {
        self.state.send_replace(LinkState {
            alarms: self.alarms.clone(),
            left_space: self.left_space,
        });
    }

    /// Cause reported by the receiver once its channel has closed.
    fn receiver_error(&mut self) -> DispatchError {
        self.receiver_exit
            .try_recv()
            .unwrap_or(DispatchError::Closed)
    }

    fn finish(mut self, exit: DispatchError) {
        let _ = self.terminal.set(exit.clone());
        self.writer.get_ref().close();

        self.submissions.close();
        while let Ok(pending) = self.submissions.try_recv() {
            let _ = pending.reply.send(Err(exit.clone()));
        }

        match &exit {
            DispatchError::Closed => info!("dispatcher stopped"),
            err => warn!(%err, "dispatcher stopped on link failure"),
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
