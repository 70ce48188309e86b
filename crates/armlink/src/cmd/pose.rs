use armlink::device::Pose;
use serde::Serialize;

use crate::cmd::PoseArgs;
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{format_floats, print, OutputFormat, Render};

#[derive(Serialize)]
pub struct PoseOutput {
    pub schema_id: &'static str,
    #[serde(flatten)]
    pub pose: Pose,
}

impl PoseOutput {
    pub fn new(pose: Pose) -> Self {
        Self {
            schema_id: "armlink/cli/v1/pose",
            pose,
        }
    }
}

impl Render for PoseOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let p = &self.pose;
        vec![
            ("x", format!("{:.2}", p.x)),
            ("y", format!("{:.2}", p.y)),
            ("z", format!("{:.2}", p.z)),
            ("r", format!("{:.2}", p.r)),
            ("joints", format_floats(&p.joint_angle)),
        ]
    }
}

pub async fn run(args: PoseArgs, format: OutputFormat) -> CliResult<i32> {
    let dobot = args.device.connect()?;
    let pose = dobot.pose().await;
    dobot.close().await;

    let pose = pose.map_err(|err| device_error("pose failed", err))?;
    print(&PoseOutput::new(pose), format);
    Ok(SUCCESS)
}
