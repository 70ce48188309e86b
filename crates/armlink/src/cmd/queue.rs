use armlink::{DeviceError, Dobot};
use serde::Serialize;

use crate::cmd::{QueueAction, QueueArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print, OutputFormat, Render};

#[derive(Serialize)]
struct QueueOutput {
    schema_id: &'static str,
    action: &'static str,
    left_space: u32,
    current_index: u64,
    motion_finished: bool,
}

impl Render for QueueOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", self.action.to_string()),
            ("left_space", self.left_space.to_string()),
            ("current_index", self.current_index.to_string()),
            ("motion_finished", self.motion_finished.to_string()),
        ]
    }
}

fn action_name(action: QueueAction) -> &'static str {
    match action {
        QueueAction::Start => "start",
        QueueAction::Stop => "stop",
        QueueAction::ForceStop => "force-stop",
        QueueAction::Clear => "clear",
        QueueAction::Status => "status",
    }
}

pub async fn run(args: QueueArgs, format: OutputFormat) -> CliResult<i32> {
    let dobot = args.device.connect()?;
    let out = apply(&dobot, args.action).await;
    dobot.close().await;

    print(&out?, format);
    Ok(SUCCESS)
}

async fn apply(dobot: &Dobot, action: QueueAction) -> CliResult<QueueOutput> {
    let name = action_name(action);
    let done = match action {
        QueueAction::Start => dobot.start_queue().await,
        QueueAction::Stop => dobot.stop_queue().await,
        QueueAction::ForceStop => dobot.force_stop_queue().await,
        QueueAction::Clear => dobot.clear_queue().await,
        QueueAction::Status => Ok(()),
    };
    done.map_err(|err| device_error(&format!("queue {name} failed"), err))?;

    let fail = |err: DeviceError| device_error("queue status failed", err);
    Ok(QueueOutput {
        schema_id: "armlink/cli/v1/queue-status",
        action: name,
        left_space: dobot.queue_left_space().await.map_err(fail)?,
        current_index: dobot.queue_current_index().await.map_err(fail)?,
        motion_finished: dobot.motion_finished().await.map_err(fail)?,
    })
}
