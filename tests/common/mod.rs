//! In-memory GPP used by the integration tests.
//!
//! The simulator sits on the far end of a `tokio::io::duplex` pipe, answers
//! queries from its state, applies setters to it and records every command
//! it receives. Measured values are fixed per channel so the efficiency of
//! each row is known in advance.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gwinstek_gpp::Gpp;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

pub const IDN: &str = "GW INSTEK,GPP-4323,SN:GEX000001,V1.22";

#[derive(Debug, Clone)]
pub struct SimState {
    pub vset: [f64; 4],
    pub iset: [f64; 4],
    pub vout: [f64; 4],
    pub iout: [f64; 4],
    pub output: [bool; 4],
    pub ovp: [(bool, f64); 4],
    pub ocp: [(bool, f64); 4],
    /// Raw `MODE<n>?` answers for CH1/CH2.
    pub mode: [String; 2],
    pub load: [[bool; 3]; 2],
    pub resistance: [u32; 4],
    pub brightness: String,
    pub display_type: u8,
    /// `:SOUR<n>:CURR:STAT?` starts answering `1` on this query (1-based).
    pub current_limit_on_query: Option<usize>,
    pub current_limit_queries: usize,
    pub log: Vec<String>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            vset: [0.0; 4],
            iset: [0.0; 4],
            // CH1 senses the converter input, CH3 its output.
            vout: [8.0, 0.0, 7.5, 0.0],
            // CH2 sinks the load current, CH4 sources the input current.
            iout: [0.0, 0.5, 0.0, 0.5],
            output: [true; 4],
            ovp: [(false, 33.0); 4],
            ocp: [(false, 3.3); 4],
            mode: ["CC".to_string(), "CC".to_string()],
            load: [[false, true, false], [false, true, false]],
            resistance: [10; 4],
            brightness: "HIGH".to_string(),
            display_type: 1,
            current_limit_on_query: None,
            current_limit_queries: 0,
            log: Vec::new(),
        }
    }
}

fn strip_channel<'a>(cmd: &'a str, prefix: &str) -> Option<(usize, &'a str)> {
    let rest = cmd.strip_prefix(prefix)?;
    let digit = rest.chars().next()?.to_digit(10)? as usize;
    Some((digit - 1, &rest[1..]))
}

fn load_index(token: &str) -> Option<usize> {
    match token {
        "CV" => Some(0),
        "CC" => Some(1),
        "CR" => Some(2),
        _ => None,
    }
}

fn on_off(value: bool) -> String {
    let token = if value { "ON" } else { "OFF" };
    token.to_string()
}

impl SimState {
    pub fn handle(&mut self, cmd: &str) -> Option<String> {
        self.log.push(cmd.to_string());
        match cmd {
            "*IDN?" => return Some(IDN.to_string()),
            ":SYST:ERR?" => return Some("No Error.".to_string()),
            "OUT1" => {
                self.output = [true; 4];
                return None;
            }
            "OUT0" => {
                self.output = [false; 4];
                return None;
            }
            ":MEAS:VOLT:ALL?" => return Some(join(&self.vout)),
            ":MEAS:CURR:ALL?" => return Some(join(&self.iout)),
            ":MEAS:POWE:ALL?" => {
                let power: Vec<f64> = (0..4).map(|i| self.vout[i] * self.iout[i]).collect();
                return Some(join(&power));
            }
            ":SOUR:VOLT:ALL?" => return Some(join(&self.vset)),
            ":SOUR:CURR:ALL?" => return Some(join(&self.iset)),
            ":DISP:BRIG?" => return Some(self.brightness.clone()),
            ":DISP:TYPE?" => return Some(self.display_type.to_string()),
            _ => {}
        }
        if let Some(level) = cmd.strip_prefix(":DISP:BRIG ") {
            self.brightness = level.to_string();
            return None;
        }
        if let Some(value) = cmd.strip_prefix(":DISP:TYPE ") {
            self.display_type = value.parse().ok()?;
            return None;
        }
        if let Some(value) = cmd.strip_prefix("TRACK") {
            self.mode[0] = match value {
                "0" => "IND",
                "1" => "SER",
                "2" => "PAR",
                _ => return None,
            }
            .to_string();
            self.mode[1] = self.mode[0].clone();
            return None;
        }
        if let Some(rest) = cmd.strip_prefix("OUTP:") {
            let (mode, state) = rest.split_once(' ')?;
            let token = if state == "ON" { mode } else { "IND" };
            self.mode = [token.to_string(), token.to_string()];
            return None;
        }
        if let Some((n, rest)) = strip_channel(cmd, "VSET") {
            return setpoint(&mut self.vset[n], rest, 'V');
        }
        if let Some((n, rest)) = strip_channel(cmd, "ISET") {
            return setpoint(&mut self.iset[n], rest, 'A');
        }
        if let Some((n, "?")) = strip_channel(cmd, "VOUT") {
            return Some(format!("{}V", self.vout[n]));
        }
        if let Some((n, "?")) = strip_channel(cmd, "IOUT") {
            return Some(format!("{}A", self.iout[n]));
        }
        if let Some((n, "?")) = strip_channel(cmd, "MODE") {
            return Some(self.mode[n].clone());
        }
        if let Some((n, rest)) = strip_channel(cmd, ":OUTP") {
            return match rest {
                ":STAT?" => Some(on_off(self.output[n])),
                ":STAT 1" | ":STAT 0" => {
                    self.output[n] = rest.ends_with('1');
                    None
                }
                ":OVP:STAT?" => Some(on_off(self.ovp[n].0)),
                ":OCP:STAT?" => Some(on_off(self.ocp[n].0)),
                ":OVP?" => Some(format!("{:.3}", self.ovp[n].1)),
                ":OCP?" => Some(format!("{:.3}", self.ocp[n].1)),
                _ => {
                    let (field, value) = rest.split_once(' ')?;
                    match field {
                        ":OVP:STAT" => self.ovp[n].0 = value == "1",
                        ":OCP:STAT" => self.ocp[n].0 = value == "1",
                        ":OVP" => self.ovp[n].1 = value.parse().ok()?,
                        ":OCP" => self.ocp[n].1 = value.parse().ok()?,
                        _ => {}
                    }
                    None
                }
            };
        }
        if let Some((n, rest)) = strip_channel(cmd, ":SOUR") {
            return match rest {
                ":CURR:STAT?" => {
                    self.current_limit_queries += 1;
                    let limited = self
                        .current_limit_on_query
                        .is_some_and(|at| self.current_limit_queries >= at);
                    Some(if limited { "1" } else { "0" }.to_string())
                }
                ":VOLT?" => Some(format!("{:.3}", self.vset[n])),
                ":CURR?" => Some(format!("{:.3}", self.iset[n])),
                ":RES?" => Some(self.resistance[n].to_string()),
                _ => {
                    let (field, value) = rest.split_once(' ')?;
                    match field {
                        ":VOLT" => self.vset[n] = value.parse().ok()?,
                        ":CURR" => self.iset[n] = value.parse().ok()?,
                        ":RES" => self.resistance[n] = value.parse().ok()?,
                        _ => {}
                    }
                    None
                }
            };
        }
        if let Some((n, rest)) = strip_channel(cmd, ":LOAD") {
            if rest == ":RES?" {
                return Some(self.resistance[n].to_string());
            }
            if let Some(value) = rest.strip_prefix(":RES ") {
                self.resistance[n] = value.parse().ok()?;
                return None;
            }
            let rest = rest.strip_prefix(':')?;
            if let Some(mode) = rest.strip_suffix('?') {
                return Some(on_off(self.load[n][load_index(mode)?]));
            }
            let (mode, state) = rest.split_once(' ')?;
            self.load[n][load_index(mode)?] = state == "ON";
            return None;
        }
        if let Some((n, rest)) = strip_channel(cmd, ":MEAS") {
            let (v, i) = (self.vout[n], self.iout[n]);
            return match rest {
                ":VOLT?" => Some(format!("{v:.3}")),
                ":CURR?" => Some(format!("{i:.3}")),
                ":POWE?" => Some(format!("{:.3}", v * i)),
                ":ALL?" => Some(format!("{v:.3},{i:.3},{:.3}", v * i)),
                _ => Some("ERR".to_string()),
            };
        }
        cmd.ends_with('?').then(|| "ERR".to_string())
    }
}

fn setpoint(target: &mut f64, rest: &str, unit: char) -> Option<String> {
    if rest == "?" {
        return Some(format!("{:.3}{unit}", *target));
    }
    *target = rest.strip_prefix(':')?.parse().ok()?;
    None
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.3}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Connects a driver to a simulator started from `state`.
pub async fn connect(state: SimState) -> (Gpp<DuplexStream>, Arc<Mutex<SimState>>) {
    let (client, server) = tokio::io::duplex(1024);
    let state = Arc::new(Mutex::new(state));
    let sim = Arc::clone(&state);
    tokio::spawn(async move {
        let mut io = BufReader::new(server);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match io.read_until(b'\r', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let cmd = String::from_utf8_lossy(&buf)
                .trim_end_matches('\r')
                .to_string();
            let reply = sim.lock().unwrap().handle(&cmd);
            if let Some(reply) = reply {
                if io
                    .get_mut()
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    });
    let gpp = Gpp::connect(client).await.unwrap();
    (gpp, state)
}

/// Commands received since connecting, excluding the `*IDN?` handshake.
pub fn commands(state: &Arc<Mutex<SimState>>) -> Vec<String> {
    state.lock().unwrap().log.iter().skip(1).cloned().collect()
}
