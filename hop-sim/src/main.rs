// hop-sim: run a relay scenario over a simulated radio mesh.

use std::path::PathBuf;

use anyhow::{bail, Context};
use hop_sim::{config, Scenario};
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("hop-sim {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                let Some(path) = args.next() else {
                    bail!("--config needs a path");
                };
                config_path = Some(PathBuf::from(path));
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(config_path.as_deref()).context("loading config")?;
    info!(
        nodes = cfg.nodes.len(),
        links = cfg.links.len(),
        messages = cfg.messages.len(),
        "starting scenario"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let scenario = Scenario::new(cfg);
        tokio::select! {
            report = scenario.run() => {
                let report = report.context("running scenario")?;
                for d in &report.deliveries {
                    if !d.delivered {
                        warn!(
                            from = %d.from,
                            to = %d.to,
                            queued = d.queued,
                            "message not delivered"
                        );
                    }
                }
                info!(
                    delivered = report.delivered(),
                    total = report.deliveries.len(),
                    exchanges = report.discovery.exchanges + report.delivery.exchanges,
                    "scenario finished"
                );
                if !report.all_delivered() {
                    let total = report.deliveries.len();
                    bail!("{} of {} messages undelivered", total - report.delivered(), total);
                }
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                Ok(())
            }
        }
    })
}
