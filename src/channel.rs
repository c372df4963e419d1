use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{GppError, Result};
use crate::instrument::Gpp;
use crate::protocol::{
    Ch1Ch2Mode, LoadMode, MeasureKind, Measurement, SourceKind, on_off, one_zero, parse_f64,
    parse_on_off, parse_one_zero, parse_reading, parse_with_unit,
};

pub const CHANNEL_COUNT: usize = 4;

/// 1-based channel number, always within 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(u8);

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [Channel(1), Channel(2), Channel(3), Channel(4)];

    pub fn new(number: u8) -> Result<Self> {
        if (1..=CHANNEL_COUNT as u8).contains(&number) {
            Ok(Channel(number))
        } else {
            Err(GppError::InvalidArgument(format!(
                "channel must be 1..={CHANNEL_COUNT}, got {number}"
            )))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// CH1 and CH2 double as an electronic load and can be coupled.
    pub fn is_ch1_ch2(self) -> bool {
        matches!(self.0, 1 | 2)
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

/// One-shot snapshot of a channel, gathered with one query per field.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    pub measured_voltage_v: f64,
    pub measured_current_a: f64,
    pub output_on: bool,
    pub ovp_on: bool,
    pub ovp_v: f64,
    pub ocp_on: bool,
    pub ocp_a: f64,
    pub set_voltage_v: f64,
    pub set_current_a: f64,
}

/// Channel-scoped accessors. Holds no state besides the borrowed device and
/// the channel number.
pub struct ChannelHandle<'a, S> {
    gpp: &'a mut Gpp<S>,
    channel: Channel,
}

impl<'a, S> ChannelHandle<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(gpp: &'a mut Gpp<S>, channel: Channel) -> Self {
        Self { gpp, channel }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn n(&self) -> u8 {
        self.channel.number()
    }

    fn guard_ch1_ch2(&self, what: &str) -> Result<()> {
        if self.channel.is_ch1_ch2() {
            Ok(())
        } else {
            Err(GppError::InvalidOperation(format!(
                "{what} is not available on {}",
                self.channel
            )))
        }
    }

    /// Actual output voltage (`VOUT<n>?`).
    pub async fn voltage(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!("VOUT{}?", self.n())).await?;
        parse_with_unit("voltage", &resp, 'V')
    }

    /// Actual output current (`IOUT<n>?`).
    pub async fn current(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!("IOUT{}?", self.n())).await?;
        parse_with_unit("current", &resp, 'A')
    }

    /// Point measurement. `MeasureKind::All` answers a voltage, current,
    /// power triple.
    pub async fn measure(&mut self, kind: MeasureKind) -> Result<Measurement> {
        let resp = self
            .gpp
            .query(&format!(":MEAS{}:{}?", self.n(), kind.as_scpi()))
            .await?;
        match kind {
            MeasureKind::All => Ok(Measurement::All(parse_reading(&resp)?)),
            _ => Ok(Measurement::Scalar(parse_f64("measurement", &resp)?)),
        }
    }

    pub async fn output_enabled(&mut self) -> Result<bool> {
        let resp = self.gpp.query(&format!(":OUTP{}:STAT?", self.n())).await?;
        parse_on_off("output state", &resp)
    }

    pub async fn set_output_enabled(&mut self, enabled: bool) -> Result<()> {
        self.gpp
            .send(&format!(":OUTP{}:STAT {}", self.n(), one_zero(enabled)))
            .await
    }

    pub async fn ovp_enabled(&mut self) -> Result<bool> {
        let resp = self
            .gpp
            .query(&format!(":OUTP{}:OVP:STAT?", self.n()))
            .await?;
        parse_on_off("OVP state", &resp)
    }

    pub async fn set_ovp_enabled(&mut self, enabled: bool) -> Result<()> {
        self.gpp
            .send(&format!(":OUTP{}:OVP:STAT {}", self.n(), one_zero(enabled)))
            .await
    }

    pub async fn ovp_value(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!(":OUTP{}:OVP?", self.n())).await?;
        parse_f64("OVP threshold", &resp)
    }

    pub async fn set_ovp_value(&mut self, volts: f64) -> Result<()> {
        self.gpp
            .send(&format!(":OUTP{}:OVP {volts}", self.n()))
            .await
    }

    pub async fn ocp_enabled(&mut self) -> Result<bool> {
        let resp = self
            .gpp
            .query(&format!(":OUTP{}:OCP:STAT?", self.n()))
            .await?;
        parse_on_off("OCP state", &resp)
    }

    pub async fn set_ocp_enabled(&mut self, enabled: bool) -> Result<()> {
        self.gpp
            .send(&format!(":OUTP{}:OCP:STAT {}", self.n(), one_zero(enabled)))
            .await
    }

    pub async fn ocp_value(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!(":OUTP{}:OCP?", self.n())).await?;
        parse_f64("OCP threshold", &resp)
    }

    pub async fn set_ocp_value(&mut self, amps: f64) -> Result<()> {
        self.gpp
            .send(&format!(":OUTP{}:OCP {amps}", self.n()))
            .await
    }

    /// Voltage, current or resistance target through the `:SOUR` subsystem.
    pub async fn source(&mut self, kind: SourceKind) -> Result<f64> {
        let resp = self
            .gpp
            .query(&format!(":SOUR{}:{}?", self.n(), kind.as_scpi()))
            .await?;
        parse_f64("source setpoint", &resp)
    }

    pub async fn set_source(&mut self, kind: SourceKind, value: f64) -> Result<()> {
        self.gpp
            .send(&format!(":SOUR{}:{} {value}", self.n(), kind.as_scpi()))
            .await
    }

    /// True once the output has been clamped by its current limit.
    pub async fn current_limit_reached(&mut self) -> Result<bool> {
        let resp = self
            .gpp
            .query(&format!(":SOUR{}:CURR:STAT?", self.n()))
            .await?;
        parse_one_zero("current limit state", &resp)
    }

    /// Voltage target (`VSET<n>?`).
    pub async fn voltage_setpoint(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!("VSET{}?", self.n())).await?;
        parse_with_unit("voltage setpoint", &resp, 'V')
    }

    pub async fn set_voltage_setpoint(&mut self, volts: f64) -> Result<()> {
        self.gpp.send(&format!("VSET{}:{volts}", self.n())).await
    }

    /// Current target (`ISET<n>?`).
    pub async fn current_setpoint(&mut self) -> Result<f64> {
        let resp = self.gpp.query(&format!("ISET{}?", self.n())).await?;
        parse_with_unit("current setpoint", &resp, 'A')
    }

    pub async fn set_current_setpoint(&mut self, amps: f64) -> Result<()> {
        self.gpp.send(&format!("ISET{}:{amps}", self.n())).await
    }

    /// CH1/CH2 coupling or load mode (`MODE<n>?`).
    pub async fn ch1_ch2_mode(&mut self) -> Result<Ch1Ch2Mode> {
        self.guard_ch1_ch2("CH1/CH2 mode")?;
        let resp = self.gpp.query(&format!("MODE{}?", self.n())).await?;
        Ch1Ch2Mode::from_scpi(&resp)
    }

    pub async fn load_mode_enabled(&mut self, mode: LoadMode) -> Result<bool> {
        self.guard_ch1_ch2("load mode")?;
        let resp = self
            .gpp
            .query(&format!(":LOAD{}:{}?", self.n(), mode.as_scpi()))
            .await?;
        parse_on_off("load mode state", &resp)
    }

    pub async fn set_load_mode_enabled(&mut self, mode: LoadMode, enabled: bool) -> Result<()> {
        self.guard_ch1_ch2("load mode")?;
        self.gpp
            .send(&format!(
                ":LOAD{}:{} {}",
                self.n(),
                mode.as_scpi(),
                on_off(enabled)
            ))
            .await
    }

    /// Load resistance target in ohms.
    pub async fn resistance_setpoint(&mut self) -> Result<u32> {
        self.guard_ch1_ch2("load resistance")?;
        let resp = self.gpp.query(&format!(":LOAD{}:RES?", self.n())).await?;
        resp.trim()
            .parse::<u32>()
            .map_err(|_| GppError::parse("load resistance", &resp))
    }

    pub async fn set_resistance_setpoint(&mut self, ohms: u32) -> Result<()> {
        self.guard_ch1_ch2("load resistance")?;
        self.gpp
            .send(&format!(":LOAD{}:RES {ohms}", self.n()))
            .await
    }

    pub async fn status(&mut self) -> Result<ChannelStatus> {
        Ok(ChannelStatus {
            measured_voltage_v: self.voltage().await?,
            measured_current_a: self.current().await?,
            output_on: self.output_enabled().await?,
            ovp_on: self.ovp_enabled().await?,
            ovp_v: self.ovp_value().await?,
            ocp_on: self.ocp_enabled().await?,
            ocp_a: self.ocp_value().await?,
            set_voltage_v: self.voltage_setpoint().await?,
            set_current_a: self.current_setpoint().await?,
        })
    }
}
