use std::time::Duration;

use armlink::device::{HomeCmd, Pose};
use armlink::Dobot;
use serde::Serialize;

use crate::cmd::{parse_duration, wait_for_index, HomeArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{format_floats, print, OutputFormat, Render};

#[derive(Serialize)]
pub struct QueuedOutput {
    pub schema_id: &'static str,
    pub queued_index: u64,
    pub completed: bool,
    pub pose: Option<Pose>,
}

impl Render for QueuedOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("queued_index", self.queued_index.to_string()),
            ("completed", self.completed.to_string()),
        ];
        if let Some(pose) = &self.pose {
            rows.push(("pose", format_floats(&[pose.x, pose.y, pose.z, pose.r])));
            rows.push(("joints", format_floats(&pose.joint_angle)));
        }
        rows
    }
}

pub async fn run(args: HomeArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let dobot = args.device.connect()?;
    let out = home(&dobot, (!args.no_wait).then_some(wait_timeout)).await;
    dobot.close().await;

    print(&out?, format);
    Ok(SUCCESS)
}

async fn home(dobot: &Dobot, wait: Option<Duration>) -> CliResult<QueuedOutput> {
    let index = dobot
        .home(&HomeCmd::default(), true)
        .await
        .map_err(|err| device_error("home failed", err))?
        .unwrap_or_default();
    tracing::info!(index, "homing queued");
    settle(dobot, index, wait).await
}

/// Optionally wait for queued command `index`, then report where the arm is.
pub async fn settle(dobot: &Dobot, index: u64, wait: Option<Duration>) -> CliResult<QueuedOutput> {
    let mut out = QueuedOutput {
        schema_id: "armlink/cli/v1/queued-command",
        queued_index: index,
        completed: false,
        pose: None,
    };
    if let Some(wait_timeout) = wait {
        wait_for_index(dobot, index, wait_timeout).await?;
        out.completed = true;
        out.pose = Some(
            dobot
                .pose()
                .await
                .map_err(|err| device_error("pose failed", err))?,
        );
    }
    Ok(out)
}
