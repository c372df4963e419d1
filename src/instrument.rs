use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::channel::{CHANNEL_COUNT, Channel, ChannelHandle};
use crate::error::{GppError, Result};
use crate::protocol::{
    COMMAND_TERMINATOR, DisplayBrightness, Identity, MeasureKind, SourceKind, TrackingMode,
    on_off, one_zero, parse_list,
};

pub const BAUD_RATE: u32 = 9600;

const DISPLAY_TYPES: std::ops::RangeInclusive<u8> = 1..=7;

/// A GW Instek GPP power supply reached over a line-oriented byte stream.
///
/// Every accessor is one blocking round trip: a query writes a single
/// command and waits for exactly one response line, a setter only writes.
/// Nothing read from the instrument is cached apart from the `*IDN?`
/// identity taken at connection time.
pub struct Gpp<S> {
    io: BufReader<S>,
    identity: Identity,
    channels: [Channel; CHANNEL_COUNT],
}

impl Gpp<SerialStream> {
    /// Opens `path` (e.g. `/dev/ttyUSB0`) at 9600 baud, 8N1, and reads the
    /// instrument identity.
    pub async fn open(path: &str) -> Result<Self> {
        let port = tokio_serial::new(path, BAUD_RATE)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;
        debug!("serial port {path} opened at {BAUD_RATE} baud");
        Self::connect(port).await
    }
}

impl<S> Gpp<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already opened stream and identifies the instrument.
    pub async fn connect(stream: S) -> Result<Self> {
        let mut io = BufReader::new(stream);
        let response = query_line(&mut io, "*IDN?").await?;
        let identity = Identity::parse(&response)?;
        debug!(
            "connected to {} {} ({}, firmware {})",
            identity.brand, identity.model, identity.serial, identity.firmware
        );
        Ok(Self {
            io,
            identity,
            channels: Channel::ALL,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The product brand, for example `GW INSTEK`.
    pub fn brand(&self) -> &str {
        &self.identity.brand
    }

    /// The product model, for example `GPP-4323`.
    pub fn model(&self) -> &str {
        &self.identity.model
    }

    /// The product serial, for example `SN:AAA000000`.
    pub fn serial(&self) -> &str {
        &self.identity.serial
    }

    /// The firmware version, for example `V1.22`.
    pub fn firmware(&self) -> &str {
        &self.identity.firmware
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    /// View of channel `number` (1..=4).
    pub fn channel(&mut self, number: u8) -> Result<ChannelHandle<'_, S>> {
        let channel = Channel::new(number)?;
        Ok(self.at(channel))
    }

    /// View of an already validated channel.
    pub fn at(&mut self, channel: Channel) -> ChannelHandle<'_, S> {
        let channel = self.channels[channel.index()];
        ChannelHandle::new(self, channel)
    }

    /// Broadcast measurement, one value per channel. `MeasureKind::All` has
    /// no device-wide form.
    pub async fn measure_all_channels(&mut self, kind: MeasureKind) -> Result<Vec<f64>> {
        if kind == MeasureKind::All {
            return Err(GppError::InvalidArgument(
                "the ALL measurement is not available for all channels at once".into(),
            ));
        }
        let resp = self
            .query(&format!(":MEAS:{}:ALL?", kind.as_scpi()))
            .await?;
        parse_list("broadcast measurement", &resp)
    }

    /// Voltage or current setpoints of every channel.
    pub async fn source_all_channels(&mut self, kind: SourceKind) -> Result<Vec<f64>> {
        if kind == SourceKind::Resistance {
            return Err(GppError::InvalidArgument(
                "resistance setpoints cannot be read for all channels at once".into(),
            ));
        }
        let resp = self
            .query(&format!(":SOUR:{}:ALL?", kind.as_scpi()))
            .await?;
        parse_list("broadcast setpoint", &resp)
    }

    /// Switches every output at once. `:ALLOUT{ON|OFF}` has the same effect.
    pub async fn set_output_all(&mut self, enabled: bool) -> Result<()> {
        self.send(&format!("OUT{}", one_zero(enabled))).await
    }

    /// Puts CH1/CH2 in the given tracking mode (`TRACK<n>`).
    pub async fn set_tracking_mode(&mut self, mode: TrackingMode) -> Result<()> {
        self.send(&format!("TRACK{}", mode.as_value())).await
    }

    /// Enables or disables series/parallel tracking (`OUTP:SER|PAR ON|OFF`).
    /// Independent is the absence of tracking and cannot be toggled.
    pub async fn enable_tracking_mode(&mut self, mode: TrackingMode, enabled: bool) -> Result<()> {
        if mode == TrackingMode::Independent {
            return Err(GppError::InvalidArgument(
                "the independent tracking mode cannot be enabled or disabled".into(),
            ));
        }
        self.send(&format!("OUTP:{} {}", mode.as_scpi(), on_off(enabled)))
            .await
    }

    pub async fn display_brightness(&mut self) -> Result<DisplayBrightness> {
        let resp = self.query(":DISP:BRIG?").await?;
        DisplayBrightness::from_scpi(&resp)
    }

    pub async fn set_display_brightness(&mut self, level: DisplayBrightness) -> Result<()> {
        self.send(&format!(":DISP:BRIG {}", level.as_scpi())).await
    }

    /// Current display layout, 1..=7.
    pub async fn display_type(&mut self) -> Result<u8> {
        let resp = self.query(":DISP:TYPE?").await?;
        let value = resp
            .trim()
            .parse::<u8>()
            .map_err(|_| GppError::parse("display type", &resp))?;
        if !DISPLAY_TYPES.contains(&value) {
            return Err(GppError::InvalidValue {
                what: "display type",
                token: resp,
            });
        }
        Ok(value)
    }

    pub async fn set_display_type(&mut self, display_type: u8) -> Result<()> {
        if !DISPLAY_TYPES.contains(&display_type) {
            return Err(GppError::InvalidArgument(format!(
                "display type must be 1..=7, got {display_type}"
            )));
        }
        self.send(&format!(":DISP:TYPE {display_type}")).await
    }

    /// The instrument's own error queue entry, returned verbatim.
    pub async fn system_error(&mut self) -> Result<String> {
        self.query(":SYST:ERR?").await
    }

    pub(crate) async fn send(&mut self, command: &str) -> Result<()> {
        write_line(&mut self.io, command).await
    }

    pub(crate) async fn query(&mut self, command: &str) -> Result<String> {
        query_line(&mut self.io, command).await
    }
}

async fn write_line<S>(io: &mut BufReader<S>, command: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("GPP write  -> {command}");
    let stream = io.get_mut();
    stream
        .write_all(format!("{command}{COMMAND_TERMINATOR}").as_bytes())
        .await?;
    stream.flush().await?;
    Ok(())
}

async fn query_line<S>(io: &mut BufReader<S>, command: &str) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_line(io, command).await?;
    let mut line = String::new();
    if io.read_line(&mut line).await? == 0 {
        return Err(GppError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("connection closed while waiting for the answer to {command:?}"),
        )));
    }
    let trimmed = line.trim().to_string();

    debug!("GPP result <- {trimmed}");

    if trimmed.is_empty() {
        return Err(GppError::parse("response", &line));
    }
    Ok(trimmed)
}
