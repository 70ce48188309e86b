//! A device simulator speaking the frame protocol over UDP.
//!
//! Enough of the arm is modelled for demos and end-to-end tests: pose,
//! alarms, HOME, PTP moves, the command queue (index, credit, execution
//! state) and identity strings. Any other write is stored and returned by
//! the next read of the same id; ids never written read as zeros.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use armlink_frame::{decode_message, encode_message, Message, ProtocolId};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::device::payload::{Decode, Payload};
use crate::device::status::{DeviceVersion, Pose};
use crate::device::HomeParams;

/// Alarm bitmap size reported by the simulated firmware.
pub const ALARM_BYTES: usize = 16;

const RECV_POLL: Duration = Duration::from_millis(50);
const DATAGRAM_SIZE: usize = 512;
const UNSET_READ_LEN: usize = 36;

/// Tunables for the simulated device.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Free slots reported by `QueuedCmdLeftSpace`.
    pub queue_capacity: u32,
    pub serial_number: String,
    pub name: String,
    pub version: DeviceVersion,
    /// Position the HOME command returns to until HOME params are written.
    pub home: HomeParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            serial_number: "SIM-0001".to_string(),
            name: "armlink-sim".to_string(),
            version: DeviceVersion {
                major: 3,
                minor: 7,
                revision: 0,
                hardware: 0,
            },
            home: HomeParams {
                x: 200.0,
                y: 0.0,
                z: 50.0,
                r: 0.0,
            },
        }
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    pose: Pose,
    alarms: [u8; ALARM_BYTES],
    queued_index: u64,
    executed_index: u64,
    running: bool,
    stored: HashMap<ProtocolId, Bytes>,
    requests: u64,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        let home = config.home;
        Self {
            config,
            pose: Pose {
                x: home.x,
                y: home.y,
                z: home.z,
                r: home.r,
                joint_angle: [0.0; 4],
            },
            alarms: [0; ALARM_BYTES],
            queued_index: 0,
            executed_index: 0,
            running: true,
            stored: HashMap::new(),
            requests: 0,
        }
    }

    fn handle(&mut self, msg: &Message) -> Message {
        self.requests += 1;
        let params = if msg.rw {
            self.write(msg)
        } else {
            self.read(msg)
        };
        Message::new(msg.id, msg.rw, msg.is_queued, params)
    }

    /// Milliseconds since power-on, advanced 10 ms per request served and
    /// pinned at `u32::MAX`.
    fn device_time(&self) -> u32 {
        u32::try_from(self.requests.saturating_mul(10)).unwrap_or(u32::MAX)
    }

    fn read(&mut self, msg: &Message) -> Bytes {
        match msg.id {
            ProtocolId::DeviceSn => text(&self.config.serial_number),
            ProtocolId::DeviceName => text(&self.config.name),
            ProtocolId::DeviceVersion => self.config.version.to_bytes(),
            ProtocolId::DeviceTime => self.device_time().to_bytes(),
            ProtocolId::GetPose => self.pose.to_bytes(),
            ProtocolId::AlarmsState => Bytes::copy_from_slice(&self.alarms),
            ProtocolId::HomeParams => self.home().to_bytes(),
            ProtocolId::QueuedCmdLeftSpace => self.config.queue_capacity.to_bytes(),
            ProtocolId::QueuedCmdCurrentIndex => self.executed_index.to_bytes(),
            ProtocolId::QueuedCmdMotionFinish => {
                (self.executed_index == self.queued_index).to_bytes()
            }
            // Unwritten parameters read as zeros, long enough for any layout.
            id => self
                .stored
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Bytes::from_static(&[0; UNSET_READ_LEN])),
        }
    }

    fn write(&mut self, msg: &Message) -> Bytes {
        match msg.id {
            ProtocolId::AlarmsState => {
                self.alarms = [0; ALARM_BYTES];
                info!("simulated alarms cleared");
            }
            ProtocolId::HomeCmd => {
                let home = self.home();
                self.move_to(home.x, home.y, home.z, home.r);
                self.pose.joint_angle = [0.0; 4];
            }
            ProtocolId::PtpCmd | ProtocolId::PtpWithLCmd | ProtocolId::PtpPoCmd => {
                self.ptp(&msg.params);
            }
            ProtocolId::QueuedCmdStartExec => {
                self.running = true;
                self.executed_index = self.queued_index;
            }
            ProtocolId::QueuedCmdStopExec | ProtocolId::QueuedCmdForceStopExec => {
                self.running = false;
            }
            ProtocolId::QueuedCmdClear => {
                self.executed_index = self.queued_index;
            }
            id => {
                self.stored.insert(id, msg.params.clone());
            }
        }

        if !msg.is_queued {
            return Bytes::new();
        }
        self.queued_index += 1;
        if self.running {
            self.executed_index = self.queued_index;
        }
        self.queued_index.to_bytes()
    }

    fn home(&self) -> HomeParams {
        match self.stored.get(&ProtocolId::HomeParams) {
            Some(raw) if raw.len() >= HomeParams::SIZE => HomeParams::decode(&mut raw.as_ref()),
            _ => self.config.home,
        }
    }

    fn ptp(&mut self, params: &[u8]) {
        if params.len() < 17 {
            warn!(len = params.len(), "short PTP command ignored");
            return;
        }
        let mut buf = params;
        let mode = buf.get_u8();
        let target = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        match mode {
            // Joint-angle targets.
            3..=5 => self.pose.joint_angle = target,
            6 => {
                for (angle, delta) in self.pose.joint_angle.iter_mut().zip(target) {
                    *angle += delta;
                }
            }
            // Cartesian increments.
            7 | 8 => {
                let pose = self.pose;
                self.move_to(
                    pose.x + target[0],
                    pose.y + target[1],
                    pose.z + target[2],
                    pose.r + target[3],
                );
            }
            _ => self.move_to(target[0], target[1], target[2], target[3]),
        }
    }

    fn move_to(&mut self, x: f32, y: f32, z: f32, r: f32) {
        self.pose.x = x;
        self.pose.y = y;
        self.pose.z = z;
        self.pose.r = r;
    }
}

fn text(value: &str) -> Bytes {
    let mut raw = value.as_bytes().to_vec();
    raw.push(0);
    Bytes::from(raw)
}

/// Shared view of a running simulator's state.
#[derive(Debug, Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Raise alarm number `alarm` (`group * 8 + bit`).
    pub fn raise_alarm(&self, alarm: u16) {
        let group = usize::from(alarm / 8);
        if group >= ALARM_BYTES {
            warn!(alarm, "alarm number out of range");
            return;
        }
        self.lock().alarms[group] |= 1 << (alarm % 8);
    }

    pub fn alarms(&self) -> [u8; ALARM_BYTES] {
        self.lock().alarms
    }

    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    /// Last queue index handed out.
    pub fn queued_index(&self) -> u64 {
        self.lock().queued_index
    }

    /// Requests answered so far.
    pub fn requests(&self) -> u64 {
        self.lock().requests
    }
}

/// A bound, not yet running simulator.
pub struct Simulator {
    socket: UdpSocket,
    device: SimDevice,
}

impl Simulator {
    /// Bind the simulator's UDP socket.
    pub fn bind(addr: impl ToSocketAddrs, config: SimConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        Ok(Self {
            socket,
            device: SimDevice {
                state: Arc::new(Mutex::new(SimState::new(config))),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn device(&self) -> SimDevice {
        self.device.clone()
    }

    /// Serve on a background thread until the handle is stopped or dropped.
    pub fn spawn(self) -> io::Result<SimHandle> {
        let addr = self.local_addr()?;
        let device = self.device();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("armlink-sim".to_string())
            .spawn(move || self.serve(&flag))?;
        info!(%addr, "simulator listening");
        Ok(SimHandle {
            addr,
            device,
            stop,
            thread: Some(thread),
        })
    }

    /// Serve requests on the calling thread until `stop` is set.
    pub fn serve(self, stop: &AtomicBool) {
        let mut datagram = [0u8; DATAGRAM_SIZE];
        let mut pending = BytesMut::new();
        let mut out = BytesMut::new();
        let mut last_peer: Option<SocketAddr> = None;

        while !stop.load(Ordering::SeqCst) {
            let (n, peer) = match self.socket.recv_from(&mut datagram) {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => {
                    warn!(%err, "simulator receive failed");
                    continue;
                }
            };

            if last_peer != Some(peer) {
                debug!(%peer, "simulator peer");
                pending.clear();
                last_peer = Some(peer);
            }
            pending.extend_from_slice(&datagram[..n]);

            while let Some(request) = decode_message(&mut pending) {
                let reply = self.device.lock().handle(&request);
                debug!(id = %request.id, rw = request.rw, queued = request.is_queued, "simulator request");

                out.clear();
                if let Err(err) = encode_message(&reply, &mut out) {
                    warn!(%err, "simulator reply not encodable");
                    continue;
                }
                if let Err(err) = self.socket.send_to(&out, peer) {
                    warn!(%err, %peer, "simulator send failed");
                }
            }
        }
        info!("simulator stopped");
    }
}

/// A simulator running on its own thread.
pub struct SimHandle {
    addr: SocketAddr,
    device: SimDevice,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Stop serving and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use armlink_dispatch::{DispatchConfig, DispatchError};
    use armlink_transport::TransportConfig;

    use super::*;
    use crate::device::{Dobot, PtpCmd, PtpMode};
    use crate::DeviceError;

    fn start() -> SimHandle {
        Simulator::bind("127.0.0.1:0", SimConfig::default())
            .unwrap()
            .spawn()
            .unwrap()
    }

    fn connect(sim: &SimHandle) -> Dobot {
        let config = DispatchConfig {
            reply_timeout: Duration::from_millis(500),
            alarm_poll_interval: Some(Duration::from_millis(20)),
            ..DispatchConfig::default()
        };
        Dobot::open(
            &sim.local_addr().to_string(),
            &TransportConfig::default(),
            config,
        )
        .unwrap()
    }

    #[test]
    fn device_time_advances_and_saturates() {
        let mut state = SimState::new(SimConfig::default());
        let reply = state.handle(&Message::read(ProtocolId::DeviceTime));
        assert_eq!(reply.params.as_ref(), &10u32.to_le_bytes());

        state.requests = u64::from(u32::MAX);
        let reply = state.handle(&Message::read(ProtocolId::DeviceTime));
        assert_eq!(reply.params.as_ref(), &u32::MAX.to_le_bytes());
    }

    #[test]
    fn state_answers_reads_and_stores_writes() {
        let mut state = SimState::new(SimConfig::default());

        let reply = state.handle(&Message::read(ProtocolId::DeviceSn));
        assert_eq!(reply.params.as_ref(), b"SIM-0001\0");

        let written = Message::write(ProtocolId::PtpCommonParams, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(state.handle(&written).params.is_empty());
        let read = state.handle(&Message::read(ProtocolId::PtpCommonParams));
        assert_eq!(read.params, written.params);
    }

    #[test]
    fn queued_writes_count_up() {
        let mut state = SimState::new(SimConfig::default());
        let wait = Message::write(ProtocolId::WaitCmd, 10u32.to_le_bytes().to_vec()).queued(true);

        assert_eq!(state.handle(&wait).u64_le(), Some(1));
        assert_eq!(state.handle(&wait).u64_le(), Some(2));
        let current = state.handle(&Message::read(ProtocolId::QueuedCmdCurrentIndex));
        assert_eq!(current.u64_le(), Some(2));
    }

    #[test]
    fn stopped_queue_does_not_advance() {
        let mut state = SimState::new(SimConfig::default());
        state.handle(&Message::write(ProtocolId::QueuedCmdStopExec, Vec::new()));
        let wait = Message::write(ProtocolId::WaitCmd, 10u32.to_le_bytes().to_vec()).queued(true);
        state.handle(&wait);

        let current = state.handle(&Message::read(ProtocolId::QueuedCmdCurrentIndex));
        assert_eq!(current.u64_le(), Some(0));
        let finished = state.handle(&Message::read(ProtocolId::QueuedCmdMotionFinish));
        assert_eq!(finished.params.as_ref(), &[0]);

        state.handle(&Message::write(ProtocolId::QueuedCmdStartExec, Vec::new()));
        let current = state.handle(&Message::read(ProtocolId::QueuedCmdCurrentIndex));
        assert_eq!(current.u64_le(), Some(1));
    }

    #[test]
    fn incremental_ptp_moves_relative() {
        let mut state = SimState::new(SimConfig::default());
        let cmd = PtpCmd {
            mode: PtpMode::MovlXyzInc,
            x: 10.0,
            y: -5.0,
            z: 0.0,
            r: 0.0,
        };
        state.handle(&Message::write(ProtocolId::PtpCmd, cmd.to_bytes()).queued(true));
        assert_eq!(state.pose.x, 210.0);
        assert_eq!(state.pose.y, -5.0);
    }

    #[test]
    fn raise_alarm_sets_bit() {
        let sim = Simulator::bind("127.0.0.1:0", SimConfig::default()).unwrap();
        let device = sim.device();
        device.raise_alarm(17);
        assert_eq!(device.alarms()[2], 0x02);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn move_and_wait_over_udp() {
        let sim = start();
        let dobot = connect(&sim);

        let target = PtpCmd {
            mode: PtpMode::MovjXyz,
            x: 150.0,
            y: 75.0,
            z: 20.0,
            r: 10.0,
        };
        let index = dobot.ptp(&target, true).await.unwrap().unwrap();
        dobot
            .wait_for_queued_index(index, Duration::from_millis(10), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        let pose = dobot.pose().await.unwrap();
        assert_eq!((pose.x, pose.y, pose.z, pose.r), (150.0, 75.0, 20.0, 10.0));
        assert_eq!(sim.device().queued_index(), index);
        dobot.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn alarm_blocks_until_cleared() {
        let sim = start();
        let dobot = connect(&sim);
        sim.device().raise_alarm(3);

        let mut state = dobot.connector().watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| s.active_alarm().is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        let err = dobot.pose().await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Dispatch(DispatchError::AlarmRaised { group: 0, code: 0x08 })
        ));

        dobot.clear_alarms().await.unwrap();
        assert!(dobot.pose().await.is_ok());
        assert_eq!(sim.device().alarms(), [0; ALARM_BYTES]);
        dobot.close().await;
    }
}
