use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gwinstek_gpp::sweep::{self, Axis, SweepConfig};
use gwinstek_gpp::{Channel, Gpp};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

/// Measure DC/DC converter efficiency by sweeping its input voltage and
/// its output load current with a GW Instek GPP.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port of the GPP
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Seconds to wait for the `*IDN?` answer
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Wait after each setpoint change, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Do not wait for Enter before sweeping
    #[arg(short, long)]
    yes: bool,

    /// Log every command sent to the instrument
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, default_value_t = 8.0)]
    input_voltage_nominal: f64,
    #[arg(long, default_value_t = 6.0)]
    input_voltage_min: f64,
    #[arg(long, default_value_t = 8.4)]
    input_voltage_max: f64,
    #[arg(long, default_value_t = 0.05)]
    input_voltage_step: f64,
    /// Channel powering the converter input
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=4))]
    input_voltage_set_channel: u8,
    /// Channel sensing the converter input voltage
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    input_voltage_measure_channel: u8,

    #[arg(long, default_value_t = 0.4)]
    output_current_nominal: f64,
    #[arg(long, default_value_t = 0.0)]
    output_current_min: f64,
    #[arg(long, default_value_t = 1.0)]
    output_current_max: f64,
    #[arg(long, default_value_t = 0.025)]
    output_current_step: f64,
    /// Load channel (CH1 or CH2 in CC load mode)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    output_current_set_channel: u8,
    /// Channel sensing the converter output voltage
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=4))]
    output_voltage_measure_channel: u8,
}

impl Args {
    fn sweep_config(&self) -> Result<SweepConfig> {
        let config = SweepConfig {
            input_voltage: Axis {
                nominal: self.input_voltage_nominal,
                min: self.input_voltage_min,
                max: self.input_voltage_max,
                step: self.input_voltage_step,
            },
            output_current: Axis {
                nominal: self.output_current_nominal,
                min: self.output_current_min,
                max: self.output_current_max,
                step: self.output_current_step,
            },
            input_voltage_set_channel: Channel::new(self.input_voltage_set_channel)?,
            input_voltage_measure_channel: Channel::new(self.input_voltage_measure_channel)?,
            output_current_set_channel: Channel::new(self.output_current_set_channel)?,
            output_voltage_measure_channel: Channel::new(self.output_voltage_measure_channel)?,
            settle: Duration::from_millis(self.settle_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.sweep_config()?;

    let mut gpp = match timeout(
        Duration::from_secs(args.connect_timeout),
        Gpp::open(&args.port),
    )
    .await
    {
        Ok(result) => result.with_context(|| format!("failed to connect on {}", args.port))?,
        Err(_) => bail!(
            "no answer from {} within {} s, check the instrument power and cable",
            args.port,
            args.connect_timeout
        ),
    };
    tracing::info!(
        "{} {} {} {}",
        gpp.brand(),
        gpp.model(),
        gpp.serial(),
        gpp.firmware()
    );

    println!("WARNING this script assume:");
    for line in config.describe_preconditions() {
        println!("{line}");
    }
    sweep::check_preconditions(&mut gpp, &config)
        .await
        .context("the bench is not set up for the sweep")?;

    if !args.yes {
        println!("Press Enter to continue...");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("failed to read confirmation")?;
    }

    let mut out = std::io::stdout();
    let outcomes = sweep::run(&mut gpp, &config, &mut out).await?;
    for outcome in &outcomes {
        if outcome.current_limited {
            tracing::warn!(
                "{:?} sweep stopped on current limit after {} steps",
                outcome.axis,
                outcome.rows.len()
            );
        }
    }
    Ok(())
}
