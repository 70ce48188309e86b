use armlink::device::{raised_alarms, DeviceCountInfo, DeviceVersion};
use armlink::{DeviceError, Dobot};
use serde::Serialize;

use crate::cmd::InfoArgs;
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print, OutputFormat, Render};

#[derive(Serialize)]
struct InfoOutput {
    schema_id: &'static str,
    serial_number: String,
    name: String,
    version: DeviceVersion,
    device_time_ms: u32,
    counters: DeviceCountInfo,
    queue_left_space: u32,
    queue_current_index: u64,
    alarms: Vec<u16>,
}

impl Render for InfoOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let alarms = if self.alarms.is_empty() {
            "none".to_string()
        } else {
            self.alarms
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        vec![
            ("serial_number", self.serial_number.clone()),
            ("name", self.name.clone()),
            ("version", self.version.to_string()),
            ("device_time_ms", self.device_time_ms.to_string()),
            ("run_time", self.counters.run_time.to_string()),
            ("power_on_count", self.counters.power_on_count.to_string()),
            ("power_off_count", self.counters.power_off_count.to_string()),
            ("queue_left_space", self.queue_left_space.to_string()),
            ("queue_current_index", self.queue_current_index.to_string()),
            ("alarms", alarms),
        ]
    }
}

pub async fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let dobot = args.device.connect()?;
    let out = collect(&dobot).await;
    dobot.close().await;

    print(&out?, format);
    Ok(SUCCESS)
}

async fn collect(dobot: &Dobot) -> CliResult<InfoOutput> {
    let fail = |err: DeviceError| device_error("info failed", err);
    let alarms = dobot.alarms().await.map_err(fail)?;
    Ok(InfoOutput {
        schema_id: "armlink/cli/v1/device-info",
        serial_number: dobot.device_sn().await.map_err(fail)?,
        name: dobot.device_name().await.map_err(fail)?,
        version: dobot.device_version().await.map_err(fail)?,
        device_time_ms: dobot.device_time().await.map_err(fail)?,
        counters: dobot.device_info().await.map_err(fail)?,
        queue_left_space: dobot.queue_left_space().await.map_err(fail)?,
        queue_current_index: dobot.queue_current_index().await.map_err(fail)?,
        alarms: raised_alarms(&alarms),
    })
}
