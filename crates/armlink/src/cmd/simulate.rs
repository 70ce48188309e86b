use armlink::sim::{SimConfig, Simulator};
use serde::Serialize;

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print, OutputFormat, Render};

#[derive(Serialize)]
struct SimulateOutput {
    schema_id: &'static str,
    listen: String,
    serial_number: String,
    queue_capacity: u32,
}

impl Render for SimulateOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("listen", self.listen.clone()),
            ("serial_number", self.serial_number.clone()),
            ("queue_capacity", self.queue_capacity.to_string()),
        ]
    }
}

pub async fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = args.duration.as_deref().map(parse_duration).transpose()?;
    let config = SimConfig {
        queue_capacity: args.queue_capacity,
        ..SimConfig::default()
    };
    let serial_number = config.serial_number.clone();

    let simulator =
        Simulator::bind(&args.bind, config).map_err(|err| io_error("bind failed", &err))?;
    let handle = simulator
        .spawn()
        .map_err(|err| io_error("simulator start failed", &err))?;

    print(
        &SimulateOutput {
            schema_id: "armlink/cli/v1/simulator",
            listen: handle.local_addr().to_string(),
            serial_number,
            queue_capacity: args.queue_capacity,
        },
        format,
    );

    match duration {
        Some(limit) => tokio::time::sleep(limit).await,
        None => tokio::signal::ctrl_c().await.map_err(|err| {
            CliError::new(INTERNAL, format!("failed to install Ctrl-C handler: {err}"))
        })?,
    }

    let served = handle.device().requests();
    handle.stop();
    tracing::info!(requests = served, "simulator shut down");
    Ok(SUCCESS)
}
