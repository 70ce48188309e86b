use std::time::Duration;

use armlink::device::{PtpCmd, PtpMode};
use armlink::Dobot;

use crate::cmd::home::{settle, QueuedOutput};
use crate::cmd::{parse_duration, MoveArgs, MoveMode};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print, OutputFormat};

impl From<MoveMode> for PtpMode {
    fn from(mode: MoveMode) -> Self {
        match mode {
            MoveMode::Jump => PtpMode::JumpXyz,
            MoveMode::Movj => PtpMode::MovjXyz,
            MoveMode::Movl => PtpMode::MovlXyz,
            MoveMode::JumpAngle => PtpMode::JumpAngle,
            MoveMode::MovjAngle => PtpMode::MovjAngle,
            MoveMode::MovlAngle => PtpMode::MovlAngle,
            MoveMode::MovjAngleInc => PtpMode::MovjAngleInc,
            MoveMode::MovlInc => PtpMode::MovlXyzInc,
            MoveMode::MovjInc => PtpMode::MovjXyzInc,
            MoveMode::JumpMovl => PtpMode::JumpMovlXyz,
        }
    }
}

pub async fn run(args: MoveArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let cmd = PtpCmd {
        mode: args.mode.into(),
        x: args.x,
        y: args.y,
        z: args.z,
        r: args.r,
    };

    let dobot = args.device.connect()?;
    let out = move_to(&dobot, &cmd, (!args.no_wait).then_some(wait_timeout)).await;
    dobot.close().await;

    print(&out?, format);
    Ok(SUCCESS)
}

async fn move_to(dobot: &Dobot, cmd: &PtpCmd, wait: Option<Duration>) -> CliResult<QueuedOutput> {
    let index = dobot
        .ptp(cmd, true)
        .await
        .map_err(|err| device_error("move failed", err))?
        .unwrap_or_default();
    tracing::info!(index, mode = ?cmd.mode, "move queued");
    settle(dobot, index, wait).await
}
