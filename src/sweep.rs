//! DC/DC converter efficiency sweep.
//!
//! The converter under test is fed by one channel in power mode (input
//! voltage setpoint, input current readback) and loaded by CH1 or CH2 in
//! constant-current load mode (output current setpoint, output current
//! readback). Two further channels only sense the input and output voltage
//! at the converter terminals.
//!
//! Each sweep sets both nominal setpoints, walks one axis from its minimum to
//! its maximum and emits one [`Row`] per step, then returns both setpoints to
//! zero. A sweep stops early when the input channel reports that its current
//! limit has been reached.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::{GppError, Result};
use crate::instrument::Gpp;
use crate::protocol::Ch1Ch2Mode;

pub const HEADER: &str = "inputVoltageSet, outputCurrentSet, inputVoltage, inputCurrent, \
ouputVoltage, outputCurrent, inputPower, outputPower, efficiency";

pub const CURRENT_LIMIT_MESSAGE: &str = "ERROR current limit raise in channel input voltage";

/// Setpoints are programmed with 1 mV / 1 mA resolution.
const SETPOINT_RESOLUTION: f64 = 1000.0;

const MAX_POINTS: i64 = 100_000;

/// Range and step of one swept quantity. Every field is a whole number of
/// mV (or mA), so each point is exactly what the instrument is sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub nominal: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Axis {
    fn validate(&self, name: &str) -> Result<()> {
        for (field, value) in [
            ("nominal", self.nominal),
            ("min", self.min),
            ("max", self.max),
            ("step", self.step),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GppError::InvalidArgument(format!(
                    "{name} {field} must be a finite, non-negative value, got {value}"
                )));
            }
            if !on_grid(value) {
                return Err(GppError::InvalidArgument(format!(
                    "{name} {field} {value} is not a multiple of the 0.001 setpoint resolution"
                )));
            }
        }
        if units(self.step) == 0 {
            return Err(GppError::InvalidArgument(format!(
                "{name} step must be positive, got {}",
                self.step
            )));
        }
        if self.min > self.max {
            return Err(GppError::InvalidArgument(format!(
                "{name} range is empty: {} > {}",
                self.min, self.max
            )));
        }
        if self.last_index() >= MAX_POINTS {
            return Err(GppError::InvalidArgument(format!(
                "{name} sweep has more than {MAX_POINTS} points"
            )));
        }
        Ok(())
    }

    /// A resting setpoint is either zero or inside the sweep range.
    pub fn admits(&self, setpoint: f64) -> bool {
        setpoint == 0.0 || (self.min <= setpoint && setpoint <= self.max)
    }

    /// min, min + step, ... up to and including max when it falls on a step.
    /// Only meaningful on an axis that passed validation.
    pub fn points(&self) -> impl Iterator<Item = f64> + '_ {
        let (min, step) = (units(self.min), units(self.step));
        (0..=self.last_index()).map(move |i| (min + i * step) as f64 / SETPOINT_RESOLUTION)
    }

    fn last_index(&self) -> i64 {
        match units(self.step) {
            0 => 0,
            step => (units(self.max) - units(self.min)) / step,
        }
    }
}

/// Value in mV / mA. Saturates for values too large to be a setpoint.
fn units(value: f64) -> i64 {
    (value * SETPOINT_RESOLUTION).round() as i64
}

fn on_grid(value: f64) -> bool {
    let scaled = value * SETPOINT_RESOLUTION;
    (scaled - scaled.round()).abs() < 1e-6
}

/// Bench wiring and sweep ranges.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub input_voltage: Axis,
    pub output_current: Axis,
    /// Channel supplying the converter; its current readback is the input current.
    pub input_voltage_set_channel: Channel,
    pub input_voltage_measure_channel: Channel,
    /// Load channel, must be CH1 or CH2 in constant-current load mode.
    pub output_current_set_channel: Channel,
    pub output_voltage_measure_channel: Channel,
    /// Wait after every setpoint change for the instrument to settle.
    pub settle: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            input_voltage: Axis {
                nominal: 8.0,
                min: 6.0,
                max: 8.4,
                step: 0.05,
            },
            output_current: Axis {
                nominal: 0.4,
                min: 0.0,
                max: 1.0,
                step: 0.025,
            },
            input_voltage_set_channel: Channel::ALL[3],
            input_voltage_measure_channel: Channel::ALL[0],
            output_current_set_channel: Channel::ALL[1],
            output_voltage_measure_channel: Channel::ALL[2],
            settle: Duration::from_secs(1),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        self.input_voltage.validate("input voltage")?;
        self.output_current.validate("output current")?;
        if !self.output_current_set_channel.is_ch1_ch2() {
            return Err(GppError::InvalidArgument(format!(
                "the load channel must be CH1 or CH2, got {}",
                self.output_current_set_channel
            )));
        }
        Ok(())
    }

    fn measure_only_channels(&self) -> [Channel; 2] {
        [
            self.input_voltage_measure_channel,
            self.output_voltage_measure_channel,
        ]
    }

    /// Human readable list of what [`check_preconditions`] verifies.
    pub fn describe_preconditions(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "- Channel {} is in power mode and use as voltage input between {}V and {}V \
                 of the device under test and to measure current",
                self.input_voltage_set_channel.number(),
                self.input_voltage.min,
                self.input_voltage.max
            ),
            format!(
                "- Channel {} is in load mode with Iset between {}A and {}A and only use to \
                 measure output voltage",
                self.output_current_set_channel.number(),
                self.output_current.min,
                self.output_current.max
            ),
        ];
        for channel in self.measure_only_channels() {
            if channel.is_ch1_ch2() {
                lines.push(format!(
                    "- Channel {} is in load mode with Iset=0.0A and only use to measure \
                     input voltage",
                    channel.number()
                ));
            } else {
                lines.push(format!(
                    "- Channel {} is in power mode with Vset=0.0V and Iset=0.0A and only use \
                     to measure output voltage",
                    channel.number()
                ));
            }
        }
        lines
    }
}

/// One line of the result table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub input_voltage_set: f64,
    pub output_current_set: f64,
    pub input_voltage: f64,
    pub input_current: f64,
    pub output_voltage: f64,
    pub output_current: f64,
    pub input_power: f64,
    pub output_power: f64,
    pub efficiency: f64,
}

impl Row {
    pub fn new(
        input_voltage_set: f64,
        output_current_set: f64,
        input_voltage: f64,
        input_current: f64,
        output_voltage: f64,
        output_current: f64,
    ) -> Self {
        let input_power = input_voltage * input_current;
        let output_power = output_voltage * output_current;
        Self {
            input_voltage_set,
            output_current_set,
            input_voltage,
            input_current,
            output_voltage,
            output_current,
            input_power,
            output_power,
            efficiency: efficiency(input_power, output_power),
        }
    }
}

impl std::fmt::Display for Row {
    // `{:?}` keeps the trailing `.0` on integral values.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}, {:?}, {:?}, {:?}, {:?}, {:?}, {:?}, {:?}, {:?}",
            self.input_voltage_set,
            self.output_current_set,
            self.input_voltage,
            self.input_current,
            self.output_voltage,
            self.output_current,
            self.input_power,
            self.output_power,
            self.efficiency
        )
    }
}

/// Output over input power in percent; zero when no input power flows.
pub fn efficiency(input_power: f64, output_power: f64) -> f64 {
    if input_power == 0.0 {
        0.0
    } else {
        output_power / input_power * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAxis {
    InputVoltage,
    OutputCurrent,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub axis: SweepAxis,
    pub rows: Vec<Row>,
    /// The sweep stopped because the input channel hit its current limit.
    pub current_limited: bool,
}

/// Verifies the bench is wired and configured the way the sweep expects.
/// Only reads instrument state.
pub async fn check_preconditions<S>(gpp: &mut Gpp<S>, config: &SweepConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    config.validate()?;

    let mut input = gpp.at(config.input_voltage_set_channel);
    ensure(
        input.output_enabled().await?,
        format!("{} output is disabled", input.channel()),
    )?;
    let vset = input.voltage_setpoint().await?;
    ensure(
        config.input_voltage.admits(vset),
        format!("{} voltage setpoint {vset}V is outside the sweep range", input.channel()),
    )?;

    let mut load = gpp.at(config.output_current_set_channel);
    ensure(
        load.output_enabled().await?,
        format!("{} output is disabled", load.channel()),
    )?;
    let mode = load.ch1_ch2_mode().await?;
    ensure(
        mode == Ch1Ch2Mode::LoadCc,
        format!("{} is in {mode:?} mode, expected LoadCc", load.channel()),
    )?;
    let iset = load.current_setpoint().await?;
    ensure(
        config.output_current.admits(iset),
        format!("{} current setpoint {iset}A is outside the sweep range", load.channel()),
    )?;

    for channel in config.measure_only_channels() {
        let mut sense = gpp.at(channel);
        if channel.is_ch1_ch2() {
            let mode = sense.ch1_ch2_mode().await?;
            ensure(
                mode == Ch1Ch2Mode::LoadCc,
                format!("{channel} is in {mode:?} mode, expected LoadCc"),
            )?;
        } else {
            let vset = sense.voltage_setpoint().await?;
            ensure(
                vset == 0.0,
                format!("{channel} voltage setpoint is {vset}V, expected 0"),
            )?;
        }
        ensure(
            sense.output_enabled().await?,
            format!("{channel} output is disabled"),
        )?;
        let iset = sense.current_setpoint().await?;
        ensure(
            iset == 0.0,
            format!("{channel} current setpoint is {iset}A, expected 0"),
        )?;
    }

    debug!("sweep preconditions hold");
    Ok(())
}

fn ensure(condition: bool, message: String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(GppError::Precondition(message))
    }
}

/// Runs the input voltage sweep followed by the output current sweep,
/// writing a blank line, the header and every row of each to `out`.
pub async fn run<S, W>(
    gpp: &mut Gpp<S>,
    config: &SweepConfig,
    out: &mut W,
) -> Result<[SweepOutcome; 2]>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: Write,
{
    let voltage = sweep(gpp, config, SweepAxis::InputVoltage, out).await?;
    let current = sweep(gpp, config, SweepAxis::OutputCurrent, out).await?;
    Ok([voltage, current])
}

/// One sweep along `axis`. The shutdown sequence runs whether the sweep
/// completed or was stopped by the current limit.
pub async fn sweep<S, W>(
    gpp: &mut Gpp<S>,
    config: &SweepConfig,
    axis: SweepAxis,
    out: &mut W,
) -> Result<SweepOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: Write,
{
    config.validate()?;
    let (swept, swept_channel) = match axis {
        SweepAxis::InputVoltage => (config.input_voltage, config.input_voltage_set_channel),
        SweepAxis::OutputCurrent => (config.output_current, config.output_current_set_channel),
    };
    info!(
        "{axis:?} sweep on {swept_channel}: {} to {} step {}",
        swept.min, swept.max, swept.step
    );

    writeln!(out)?;
    gpp.at(config.input_voltage_set_channel)
        .set_voltage_setpoint(config.input_voltage.nominal)
        .await?;
    sleep(config.settle).await;
    gpp.at(config.output_current_set_channel)
        .set_current_setpoint(config.output_current.nominal)
        .await?;

    writeln!(out, "{HEADER}")?;
    let mut rows = Vec::new();
    let mut current_limited = false;
    for setpoint in swept.points() {
        let mut channel = gpp.at(swept_channel);
        match axis {
            SweepAxis::InputVoltage => channel.set_voltage_setpoint(setpoint).await?,
            SweepAxis::OutputCurrent => channel.set_current_setpoint(setpoint).await?,
        }
        sleep(config.settle).await;

        let row = measure_row(gpp, config).await?;
        writeln!(out, "{row}")?;
        rows.push(row);

        if gpp
            .at(config.input_voltage_set_channel)
            .current_limit_reached()
            .await?
        {
            warn!("current limit reached on {}", config.input_voltage_set_channel);
            writeln!(out, "{CURRENT_LIMIT_MESSAGE}")?;
            current_limited = true;
            break;
        }
    }
    out.flush()?;

    gpp.at(config.output_current_set_channel)
        .set_current_setpoint(0.0)
        .await?;
    sleep(config.settle).await;
    gpp.at(config.input_voltage_set_channel)
        .set_voltage_setpoint(0.0)
        .await?;
    sleep(config.settle).await;

    info!("{axis:?} sweep finished after {} steps", rows.len());
    Ok(SweepOutcome {
        axis,
        rows,
        current_limited,
    })
}

async fn measure_row<S>(gpp: &mut Gpp<S>, config: &SweepConfig) -> Result<Row>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let input_voltage_set = gpp
        .at(config.input_voltage_set_channel)
        .voltage_setpoint()
        .await?;
    let output_current_set = gpp
        .at(config.output_current_set_channel)
        .current_setpoint()
        .await?;
    let input_voltage = gpp.at(config.input_voltage_measure_channel).voltage().await?;
    let input_current = gpp.at(config.input_voltage_set_channel).current().await?;
    let output_voltage = gpp
        .at(config.output_voltage_measure_channel)
        .voltage()
        .await?;
    let output_current = gpp.at(config.output_current_set_channel).current().await?;
    Ok(Row::new(
        input_voltage_set,
        output_current_set,
        input_voltage,
        input_current,
        output_voltage,
        output_current,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_of_a_typical_point() {
        let row = Row::new(8.0, 0.5, 8.0, 0.5, 7.5, 0.5);
        assert_eq!(row.input_power, 4.0);
        assert_eq!(row.output_power, 3.75);
        assert_eq!(row.efficiency, 93.75);
    }

    #[test]
    fn no_input_power_means_zero_efficiency() {
        assert_eq!(Row::new(0.0, 0.0, 0.0, 0.5, 7.5, 0.5).efficiency, 0.0);
        assert_eq!(Row::new(0.0, 0.0, 8.0, 0.0, 7.5, 0.5).efficiency, 0.0);
        assert_eq!(efficiency(0.0, 0.0), 0.0);
    }

    #[test]
    fn row_formatting_keeps_decimal_point() {
        let row = Row::new(8.0, 0.5, 8.0, 0.5, 7.5, 0.5);
        assert_eq!(
            row.to_string(),
            "8.0, 0.5, 8.0, 0.5, 7.5, 0.5, 4.0, 3.75, 93.75"
        );
    }

    #[test]
    fn default_axes_cover_both_ends() {
        let config = SweepConfig::default();
        let volts: Vec<f64> = config.input_voltage.points().collect();
        assert_eq!(volts.len(), 49);
        assert_eq!(volts[0], 6.0);
        assert_eq!(volts[1], 6.05);
        assert_eq!(volts[48], 8.4);

        let amps: Vec<f64> = config.output_current.points().collect();
        assert_eq!(amps.len(), 41);
        assert_eq!(amps[0], 0.0);
        assert_eq!(amps[40], 1.0);
    }

    #[test]
    fn resting_setpoint_is_zero_or_in_range() {
        let axis = SweepConfig::default().input_voltage;
        assert!(axis.admits(0.0));
        assert!(axis.admits(7.0));
        assert!(!axis.admits(5.0));
        assert!(!axis.admits(9.0));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = SweepConfig::default();
        config.output_current.step = 0.0;
        assert!(matches!(
            config.validate(),
            Err(GppError::InvalidArgument(_))
        ));

        let mut config = SweepConfig::default();
        config.output_current_set_channel = Channel::ALL[2];
        assert!(config.validate().is_err());
    }

    fn axis(min: f64, max: f64, step: f64) -> Axis {
        Axis {
            nominal: min,
            min,
            max,
            step,
        }
    }

    #[test]
    fn off_grid_axis_is_rejected() {
        for bad in [
            axis(0.0, 0.002, 0.0004),
            axis(6.0004, 6.003, 0.001),
            axis(6.0, 6.0035, 0.001),
            axis(6.0, f64::INFINITY, 0.05),
            axis(6.0, 8.4, f64::NAN),
            axis(-1.0, 1.0, 0.5),
            axis(0.0, 1e12, 0.001),
        ] {
            assert!(
                matches!(bad.validate("test"), Err(GppError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn fine_axis_has_distinct_points_within_range() {
        let fine = axis(6.001, 6.006, 0.001);
        fine.validate("test").unwrap();
        let points: Vec<f64> = fine.points().collect();
        assert_eq!(points, [6.001, 6.002, 6.003, 6.004, 6.005, 6.006]);

        // max off the step sequence stops at the last step below it
        let short = axis(0.0, 0.1, 0.025 * 3.0);
        short.validate("test").unwrap();
        assert_eq!(short.points().collect::<Vec<_>>(), [0.0, 0.075]);
    }
}
