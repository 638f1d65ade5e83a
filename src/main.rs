use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sensewatch::config::Settings;
use sensewatch::Middleware;
use sensewatch_sdk::{ChannelCallback, ChannelNotifier, Output};
use sensewatch_types::{parse_millis, Metric, Millis};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sensewatch")]
#[command(about = "Device resource monitoring middleware, driven by simulated sources")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Metric to monitor periodically (name or numeric id)
    #[arg(short, long)]
    metric: Option<String>,

    /// Delivery period (e.g., "500ms", "2s")
    #[arg(short, long, default_value = "1s")]
    period: String,

    /// How long the periodic monitor lives; "0" means until exit
    #[arg(short, long, default_value = "0")]
    duration: String,

    /// Only receive values acquired for other monitors
    #[arg(long, requires = "metric")]
    opportunistic: bool,

    /// Condition expression to watch, e.g. "[5:BATTERY_PERCENT:20]"
    #[arg(short, long)]
    event: Option<String>,

    /// Seconds to run before printing the admin snapshot and exiting
    #[arg(short, long, default_value = "10")]
    seconds: u64,
}

fn millis(value: &str, what: &str) -> Result<Millis> {
    parse_millis(value).with_context(|| format!("Invalid {}: {}", what, value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.metric.is_none() && args.event.is_none() {
        bail!("Nothing to monitor: pass --metric and/or --event");
    }

    let mut builder = Middleware::builder().batch_limit(settings.batch_limit);
    for source in settings.build_sources()? {
        builder = builder.source(source);
    }
    if let Some(path) = &settings.output {
        builder = builder.output(Output::file(path));
    }
    let (middleware, handle) = builder.spawn();

    let (callback, mut deliveries) = ChannelCallback::pair();
    if let Some(name) = &args.metric {
        let metric = Metric::lookup(name).with_context(|| format!("Unknown metric: {}", name))?;
        let period = millis(&args.period, "period")?;
        let duration = millis(&args.duration, "duration")?;
        let monitor =
            middleware.register_periodic(metric, period, duration, args.opportunistic, callback)?;
        tracing::info!(%monitor, %metric, "watching metric");
    } else {
        drop(callback);
    }

    let (notifier, mut notices) = ChannelNotifier::pair();
    if let Some(expr) = &args.event {
        let period = millis(&args.period, "period")?;
        let monitor = middleware.register_event(expr, period, notifier)?;
        tracing::info!(%monitor, expr = %expr, "watching expression");
    } else {
        drop(notifier);
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            Some(delivery) = deliveries.recv() => {
                println!("{}", serde_json::to_string(&delivery)?);
            }
            Some(notice) = notices.recv() => {
                println!("{}", serde_json::to_string(&notice)?);
            }
        }
    }

    handle.join().await;
    println!("{}", serde_json::to_string_pretty(&middleware.snapshot())?);
    Ok(())
}
