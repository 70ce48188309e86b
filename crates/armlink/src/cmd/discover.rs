use armlink::transport::{discover, DiscoveryConfig};
use serde::Serialize;

use crate::cmd::{parse_duration, DiscoverArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print, OutputFormat, Render};

#[derive(Serialize)]
struct DiscoverOutput {
    schema_id: &'static str,
    devices: Vec<String>,
}

impl Render for DiscoverOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        if self.devices.is_empty() {
            return vec![("device", "none found".to_string())];
        }
        self.devices
            .iter()
            .map(|addr| ("device", addr.clone()))
            .collect()
    }
}

pub fn run(args: DiscoverArgs, format: OutputFormat) -> CliResult<i32> {
    let config = DiscoveryConfig {
        timeout: parse_duration(&args.timeout)?,
        targets: args.target,
        ..DiscoveryConfig::default()
    };

    let found = discover(&config).map_err(|err| transport_error("discovery failed", &err))?;
    tracing::info!(count = found.len(), "discovery finished");

    let out = DiscoverOutput {
        schema_id: "armlink/cli/v1/discovery",
        devices: found.iter().map(|addr| addr.ip().to_string()).collect(),
    };
    print(&out, format);
    Ok(SUCCESS)
}
