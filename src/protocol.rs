//! Wire tokens and response parsers for the GPP command set.
//!
//! Every enumeration maps to a closed set of tokens. Encoding is infallible
//! because the Rust enum is already closed; decoding rejects anything outside
//! the table instead of falling back to a default.

use clap::ValueEnum;

use crate::error::{GppError, Result};

/// Commands end with a carriage return, responses with a line feed.
pub const COMMAND_TERMINATOR: &str = "\r";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureKind {
    Voltage,
    Current,
    Power,
    /// Voltage, current and power in one `v,i,p` response.
    All,
}

impl MeasureKind {
    pub(crate) fn as_scpi(self) -> &'static str {
        match self {
            MeasureKind::Voltage => "VOLT",
            MeasureKind::Current => "CURR",
            MeasureKind::Power => "POWE",
            MeasureKind::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Voltage,
    Current,
    Resistance,
}

impl SourceKind {
    pub(crate) fn as_scpi(self) -> &'static str {
        match self {
            SourceKind::Voltage => "VOLT",
            SourceKind::Current => "CURR",
            SourceKind::Resistance => "RES",
        }
    }
}

/// Operating mode reported by `MODE1?` / `MODE2?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ch1Ch2Mode {
    PowerIndependent,
    PowerSeries,
    PowerParallel,
    LoadCv,
    LoadCc,
    LoadCr,
}

impl Ch1Ch2Mode {
    pub fn as_scpi(self) -> &'static str {
        match self {
            Ch1Ch2Mode::PowerIndependent => "IND",
            Ch1Ch2Mode::PowerSeries => "SER",
            Ch1Ch2Mode::PowerParallel => "PAR",
            Ch1Ch2Mode::LoadCv => "CV",
            Ch1Ch2Mode::LoadCc => "CC",
            Ch1Ch2Mode::LoadCr => "CR",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        match token.trim() {
            "IND" => Ok(Ch1Ch2Mode::PowerIndependent),
            "SER" => Ok(Ch1Ch2Mode::PowerSeries),
            "PAR" => Ok(Ch1Ch2Mode::PowerParallel),
            "CV" => Ok(Ch1Ch2Mode::LoadCv),
            "CC" => Ok(Ch1Ch2Mode::LoadCc),
            "CR" => Ok(Ch1Ch2Mode::LoadCr),
            other => Err(GppError::InvalidValue {
                what: "CH1/CH2 mode",
                token: other.to_string(),
            }),
        }
    }
}

/// Electronic load sub-modes of CH1/CH2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoadMode {
    Cv,
    Cc,
    Cr,
}

impl LoadMode {
    pub(crate) fn as_scpi(self) -> &'static str {
        match self {
            LoadMode::Cv => "CV",
            LoadMode::Cc => "CC",
            LoadMode::Cr => "CR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrackingMode {
    Independent,
    Series,
    Parallel,
}

impl TrackingMode {
    /// Argument of `TRACK<n>`.
    pub(crate) fn as_value(self) -> u8 {
        match self {
            TrackingMode::Independent => 0,
            TrackingMode::Series => 1,
            TrackingMode::Parallel => 2,
        }
    }

    /// Mnemonic of the `OUTP:<mode> ON|OFF` form.
    pub(crate) fn as_scpi(self) -> &'static str {
        match self {
            TrackingMode::Independent => "IND",
            TrackingMode::Series => "SER",
            TrackingMode::Parallel => "PAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayBrightness {
    Low,
    Middle,
    High,
}

impl DisplayBrightness {
    pub(crate) fn as_scpi(self) -> &'static str {
        match self {
            DisplayBrightness::Low => "LOW",
            DisplayBrightness::Middle => "MIDDLE",
            DisplayBrightness::High => "HIGH",
        }
    }

    pub(crate) fn from_scpi(token: &str) -> Result<Self> {
        match token.trim().to_uppercase().as_str() {
            "LOW" => Ok(DisplayBrightness::Low),
            "MIDDLE" => Ok(DisplayBrightness::Middle),
            "HIGH" => Ok(DisplayBrightness::High),
            _ => Err(GppError::InvalidValue {
                what: "display brightness",
                token: token.trim().to_string(),
            }),
        }
    }
}

/// Answer of a `:MEAS<n>:ALL?` query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Scalar(f64),
    All(Reading),
}

/// Fields of the `*IDN?` answer, e.g. `GW INSTEK,GPP-4323,SN:AAA000000,V1.22`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    pub(crate) fn parse(response: &str) -> Result<Self> {
        let fields: Vec<&str> = response.trim().split(',').map(str::trim).collect();
        match fields.as_slice() {
            [brand, model, serial, firmware] => Ok(Identity {
                brand: brand.to_string(),
                model: model.to_string(),
                serial: serial.to_string(),
                firmware: firmware.to_string(),
            }),
            _ => Err(GppError::parse("identity", response)),
        }
    }
}

pub(crate) fn on_off(value: bool) -> &'static str {
    if value { "ON" } else { "OFF" }
}

pub(crate) fn one_zero(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

pub(crate) fn parse_f64(what: &'static str, input: &str) -> Result<f64> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|_| GppError::parse(what, input))
}

/// Parses a readback such as `12.340V`, dropping the unit letter if present.
pub(crate) fn parse_with_unit(what: &'static str, input: &str, unit: char) -> Result<f64> {
    let trimmed = input.trim();
    parse_f64(what, trimmed.strip_suffix(unit).unwrap_or(trimmed))
        .map_err(|_| GppError::parse(what, input))
}

/// `ON` / `OFF` family: output, protection and load-mode state.
pub(crate) fn parse_on_off(what: &'static str, input: &str) -> Result<bool> {
    match input.trim() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(GppError::parse(what, input)),
    }
}

/// `1` / `0` family: current-limit state.
pub(crate) fn parse_one_zero(what: &'static str, input: &str) -> Result<bool> {
    match input.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(GppError::parse(what, input)),
    }
}

pub(crate) fn parse_list(what: &'static str, input: &str) -> Result<Vec<f64>> {
    input
        .trim()
        .split(',')
        .map(|field| parse_f64(what, field))
        .collect::<Result<Vec<_>>>()
        .map_err(|_| GppError::parse(what, input))
}

pub(crate) fn parse_reading(input: &str) -> Result<Reading> {
    match parse_list("measurement triple", input)?.as_slice() {
        [voltage, current, power] => Ok(Reading {
            voltage: *voltage,
            current: *current,
            power: *power,
        }),
        _ => Err(GppError::parse("measurement triple", input)),
    }
}
