use std::time::Duration;

use anyhow::{Result, ensure};
use clap::Parser;
use gwinstek_gpp::{Ch1Ch2Mode, Gpp, LoadMode, TrackingMode};
use tokio::time::sleep;

/// Walk CH1/CH2 through the tracking and load modes and check each one is
/// reported back by `MODE1?`.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Only exercise this tracking mode
    #[arg(long, value_enum)]
    tracking: Option<TrackingMode>,

    /// Only exercise this load mode
    #[arg(long, value_enum)]
    load: Option<LoadMode>,
}

fn expected_tracking(mode: TrackingMode) -> Ch1Ch2Mode {
    match mode {
        TrackingMode::Independent => Ch1Ch2Mode::PowerIndependent,
        TrackingMode::Series => Ch1Ch2Mode::PowerSeries,
        TrackingMode::Parallel => Ch1Ch2Mode::PowerParallel,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut gpp = Gpp::open(&args.port).await?;

    let tracking = match args.tracking {
        Some(mode) => vec![mode],
        None => vec![
            TrackingMode::Series,
            TrackingMode::Parallel,
            TrackingMode::Independent,
        ],
    };
    for mode in tracking {
        println!("Set CH1/CH2 in tracking {mode:?} mode");
        gpp.set_tracking_mode(mode).await?;
        sleep(Duration::from_secs(5)).await;
        let actual = gpp.channel(1)?.ch1_ch2_mode().await?;
        ensure!(
            actual == expected_tracking(mode),
            "CH1 reports {actual:?} after selecting {mode:?}"
        );
    }

    for mode in [TrackingMode::Series, TrackingMode::Parallel] {
        if args.tracking.is_some_and(|only| only != mode) {
            continue;
        }
        for enabled in [true, false] {
            let action = if enabled { "Enable" } else { "Disable" };
            println!("{action} CH1/CH2 tracking {mode:?} mode");
            gpp.enable_tracking_mode(mode, enabled).await?;
            sleep(Duration::from_secs(5)).await;
            let expected = if enabled {
                expected_tracking(mode)
            } else {
                Ch1Ch2Mode::PowerIndependent
            };
            let actual = gpp.channel(1)?.ch1_ch2_mode().await?;
            ensure!(actual == expected, "CH1 reports {actual:?}, expected {expected:?}");
        }
    }

    let load = match args.load {
        Some(mode) => vec![mode],
        None => vec![LoadMode::Cv, LoadMode::Cc, LoadMode::Cr],
    };
    let mut ch1 = gpp.channel(1)?;
    for mode in load {
        for enabled in [true, false] {
            let action = if enabled { "Enable" } else { "Disable" };
            println!("{action} CH1 in load {mode:?} mode");
            ch1.set_load_mode_enabled(mode, enabled).await?;
            sleep(Duration::from_secs(5)).await;
            let actual = ch1.load_mode_enabled(mode).await?;
            ensure!(actual == enabled, "CH1 load {mode:?} reads back {actual}");
        }
    }
    println!("CH1 load resistance: {} ohm", ch1.resistance_setpoint().await?);

    Ok(())
}
