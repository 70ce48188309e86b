use armlink::device::raised_alarms;
use armlink::Dobot;
use serde::Serialize;

use crate::cmd::AlarmsArgs;
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{hex, print, OutputFormat, Render};

#[derive(Serialize)]
struct AlarmsOutput {
    schema_id: &'static str,
    bitmap: String,
    raised: Vec<u16>,
    cleared: bool,
}

impl Render for AlarmsOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let raised = if self.raised.is_empty() {
            "none".to_string()
        } else {
            self.raised
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        vec![
            ("bitmap", self.bitmap.clone()),
            ("raised", raised),
            ("cleared", self.cleared.to_string()),
        ]
    }
}

pub async fn run(args: AlarmsArgs, format: OutputFormat) -> CliResult<i32> {
    let dobot = args.device.connect()?;
    let out = exchange(&dobot, args.clear).await;
    dobot.close().await;

    print(&out?, format);
    Ok(SUCCESS)
}

async fn exchange(dobot: &Dobot, clear: bool) -> CliResult<AlarmsOutput> {
    let bitmap = dobot
        .alarms()
        .await
        .map_err(|err| device_error("alarm read failed", err))?;
    let raised = raised_alarms(&bitmap);

    let cleared = clear && !raised.is_empty();
    if cleared {
        dobot
            .clear_alarms()
            .await
            .map_err(|err| device_error("alarm clear failed", err))?;
        tracing::info!(count = raised.len(), "alarms cleared");
    }

    Ok(AlarmsOutput {
        schema_id: "armlink/cli/v1/alarms",
        bitmap: hex(&bitmap),
        raised,
        cleared,
    })
}
