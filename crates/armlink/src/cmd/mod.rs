use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use armlink::dispatch::DispatchConfig;
use armlink::transport::{TransportConfig, TransportKind, DEFAULT_BAUD_RATE};
use armlink::Dobot;
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{device_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod alarms;
pub mod discover;
pub mod home;
pub mod info;
pub mod moves;
pub mod pose;
pub mod queue;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find WiFi-attached arms on the local network.
    Discover(DiscoverArgs),
    /// Print device identity, version and counters.
    Info(InfoArgs),
    /// Print the current pose.
    Pose(PoseArgs),
    /// Show (or clear) the alarm state.
    Alarms(AlarmsArgs),
    /// Run the homing routine.
    Home(HomeArgs),
    /// Move point to point.
    Move(MoveArgs),
    /// Control the device command queue.
    Queue(QueueArgs),
    /// Run a UDP device simulator.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Discover(args) => discover::run(args, format),
        Command::Info(args) => block_on(info::run(args, format)),
        Command::Pose(args) => block_on(pose::run(args, format)),
        Command::Alarms(args) => block_on(alarms::run(args, format)),
        Command::Home(args) => block_on(home::run(args, format)),
        Command::Move(args) => block_on(moves::run(args, format)),
        Command::Queue(args) => block_on(queue::run(args, format)),
        Command::Simulate(args) => block_on(simulate::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F: Future<Output = CliResult<i32>>>(future: F) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(future)
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum TransportArg {
    Serial,
    Udp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Serial => TransportKind::Serial,
            TransportArg::Udp => TransportKind::Udp,
        }
    }
}

/// How to reach the device.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path (/dev/...) or UDP host:port.
    pub endpoint: String,
    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Transport kind. Default: serial for /dev/ paths, UDP otherwise.
    #[arg(long, value_name = "KIND")]
    pub transport: Option<TransportArg>,
    /// Per-attempt reply timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

impl DeviceArgs {
    /// Open the link. Must run inside the command runtime.
    pub fn connect(&self) -> CliResult<Dobot> {
        let reply_timeout = parse_duration(&self.timeout)?;
        let transport_config = TransportConfig {
            baud_rate: self.baud,
            kind: self.transport.map(TransportKind::from),
            ..TransportConfig::default()
        };
        let config = DispatchConfig {
            reply_timeout,
            ..DispatchConfig::default()
        };
        Dobot::open(&self.endpoint, &transport_config, config)
            .map_err(|err| device_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// How long to collect replies (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Probe these addresses instead of every interface's broadcast address.
    #[arg(long, value_delimiter = ',')]
    pub target: Option<Vec<Ipv4Addr>>,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct PoseArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct AlarmsArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Clear every alarm after reading.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args, Debug)]
pub struct HomeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Return once the command is queued instead of waiting for it to finish.
    #[arg(long)]
    pub no_wait: bool,
    /// Longest time to wait for the routine to finish.
    #[arg(long, default_value = "60s")]
    pub wait_timeout: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum MoveMode {
    Jump,
    Movj,
    Movl,
    JumpAngle,
    MovjAngle,
    MovlAngle,
    MovjAngleInc,
    MovlInc,
    MovjInc,
    JumpMovl,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Target X (mm), or joint 1 angle in angle modes.
    #[arg(allow_negative_numbers = true)]
    pub x: f32,
    #[arg(allow_negative_numbers = true)]
    pub y: f32,
    #[arg(allow_negative_numbers = true)]
    pub z: f32,
    /// End-effector rotation (degrees).
    #[arg(allow_negative_numbers = true, default_value_t = 0.0)]
    pub r: f32,
    /// Path shape.
    #[arg(long, value_enum, default_value = "movj")]
    pub mode: MoveMode,
    /// Return once the command is queued instead of waiting for it to finish.
    #[arg(long)]
    pub no_wait: bool,
    /// Longest time to wait for the move to finish.
    #[arg(long, default_value = "30s")]
    pub wait_timeout: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum QueueAction {
    Start,
    Stop,
    ForceStop,
    Clear,
    Status,
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// What to do with the queue.
    #[arg(value_enum)]
    pub action: QueueAction,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8899")]
    pub bind: String,
    /// Stop after this long instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration: Option<String>,
    /// Queue capacity reported to clients.
    #[arg(long, default_value_t = 32)]
    pub queue_capacity: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Block until the device has executed queued command `index`.
pub async fn wait_for_index(dobot: &Dobot, index: u64, wait_timeout: Duration) -> CliResult<()> {
    dobot
        .wait_for_queued_index(index, QUEUE_POLL_INTERVAL, Some(wait_timeout))
        .await
        .map_err(|err| device_error("wait failed", err))
}

/// Parse `5s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
