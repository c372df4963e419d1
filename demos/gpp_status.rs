use std::time::Duration;

use anyhow::Result;
use gwinstek_gpp::{Channel, DisplayBrightness, Gpp, MeasureKind, Measurement};
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = args.get(1).map(String::as_str).unwrap_or("/dev/ttyUSB0");

    let mut gpp = match timeout(Duration::from_secs(5), Gpp::open(port)).await {
        Ok(Ok(gpp)) => gpp,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            eprintln!("Timed out connecting to the GPP on {port} (5 s), check power and cable.");
            return Ok(());
        }
    };

    println!(
        "info: {} {} {} {}",
        gpp.brand(),
        gpp.model(),
        gpp.serial(),
        gpp.firmware()
    );

    for channel in Channel::ALL {
        let mut handle = gpp.at(channel);
        let status = handle.status().await?;
        println!("{channel}:");
        println!(
            "  Measured : {:.3} V / {:.3} A",
            status.measured_voltage_v, status.measured_current_a
        );
        println!(
            "  Set      : {:.3} V / {:.3} A",
            status.set_voltage_v, status.set_current_a
        );
        println!("  Output   : {}", if status.output_on { "ON" } else { "OFF" });
        println!(
            "  OVP      : {} at {:.3} V",
            if status.ovp_on { "ON" } else { "OFF" },
            status.ovp_v
        );
        println!(
            "  OCP      : {} at {:.3} A",
            if status.ocp_on { "ON" } else { "OFF" },
            status.ocp_a
        );
        if let Measurement::All(reading) = handle.measure(MeasureKind::All).await? {
            println!(
                "  Point    : {:.3} V / {:.3} A / {:.3} W",
                reading.voltage, reading.current, reading.power
            );
        }
        if channel.is_ch1_ch2() {
            println!("  Mode     : {:?}", handle.ch1_ch2_mode().await?);
        }
    }

    println!("voltage: {:?}", gpp.measure_all_channels(MeasureKind::Voltage).await?);
    println!("current: {:?}", gpp.measure_all_channels(MeasureKind::Current).await?);
    println!("power: {:?}", gpp.measure_all_channels(MeasureKind::Power).await?);

    // Cycle the backlight through every level, then put it back.
    let saved = gpp.display_brightness().await?;
    for level in [
        DisplayBrightness::Low,
        DisplayBrightness::Middle,
        DisplayBrightness::High,
    ] {
        println!("displayBrightness: {level:?}");
        gpp.set_display_brightness(level).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    gpp.set_display_brightness(saved).await?;

    println!("display type: {}", gpp.display_type().await?);
    println!("last error: {}", gpp.system_error().await?);
    Ok(())
}
