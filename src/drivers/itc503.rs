use crate::core::IsobusClient;
use crate::domain::model::{ControlMode, Identity};
use crate::utils::error::{BusError, Result};
use crate::utils::validation::validate_range;
use serde::Serialize;

/// ITC503 temperature controller, addressed over ISOBUS (directly or through
/// a GPIB bridge).
///
/// Readbacks are `R0`..`R10`; setters are single letters with a numeric
/// argument and only work in remote mode, so call
/// [`Itc503::prepare_remote`] once per session.
pub struct Itc503 {
    bus: IsobusClient,
}

/// Heater/gas automation, the `An` command digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMode {
    /// Heater and gas both manual.
    Manual,
    /// Heater automatic, gas manual.
    HeaterAuto,
    /// Heater manual, gas automatic.
    GasAuto,
    /// Heater and gas both automatic.
    Auto,
}

impl AutoMode {
    pub fn command_digit(self) -> u8 {
        match self {
            Self::Manual => 0,
            Self::HeaterAuto => 1,
            Self::GasAuto => 2,
            Self::Auto => 3,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::Manual),
            1 => Some(Self::HeaterAuto),
            2 => Some(Self::GasAuto),
            3 => Some(Self::Auto),
            _ => None,
        }
    }
}

impl std::str::FromStr for AutoMode {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "heater-auto" => Ok(Self::HeaterAuto),
            "gas-auto" => Ok(Self::GasAuto),
            "auto" => Ok(Self::Auto),
            other => Err(BusError::ParseError {
                reply: other.to_string(),
                reason: "expected manual, heater-auto, gas-auto or auto".to_string(),
            }),
        }
    }
}

/// Where a programmed temperature sweep is, from the two-digit `Snn` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "step")]
pub enum SweepPhase {
    Idle,
    /// Ramping towards step n (odd codes, 2n-1).
    SweepingTo(u8),
    /// Dwelling at step n (even codes, 2n).
    HoldingAt(u8),
}

impl SweepPhase {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Idle,
            n if n % 2 == 1 => Self::SweepingTo((n + 1) / 2),
            n => Self::HoldingAt(n / 2),
        }
    }
}

/// Decoded `X` status: `XnAnCnSnnHnLn`.
#[derive(Debug, Clone, Serialize)]
pub struct ItcStatus {
    pub system: u8,
    pub auto_mode: AutoMode,
    pub control: ControlMode,
    pub sweep: SweepPhase,
    pub heater_sensor: u8,
    pub auto_pid: bool,
    pub raw: String,
}

impl Itc503 {
    pub fn new(bus: IsobusClient) -> Self {
        Self { bus }
    }

    pub fn endpoint(&self) -> String {
        self.bus.endpoint()
    }

    /// The session-opening dance: remote unlocked, heater and gas automatic,
    /// auto-PID on.
    pub async fn prepare_remote(&mut self) -> Result<()> {
        self.set_control(ControlMode::RemoteUnlocked).await?;
        self.set_auto(AutoMode::Auto).await?;
        self.set_auto_pid(true).await
    }

    pub async fn status(&mut self) -> Result<ItcStatus> {
        let reply = self.bus.exec("X").await?;
        parse_status(&reply)
    }

    // Readbacks.

    /// `R0`, the temperature setpoint in kelvin.
    pub async fn setpoint(&mut self) -> Result<f64> {
        self.bus.exec_f64("R0").await
    }

    /// `R1`..`R3`, one of the three sensors, in kelvin.
    pub async fn temperature(&mut self, sensor: u8) -> Result<f64> {
        validate_range("sensor", sensor, 1, 3)?;
        self.bus.exec_f64(&format!("R{}", sensor)).await
    }

    /// `R4`, setpoint minus control-sensor temperature.
    pub async fn temperature_error(&mut self) -> Result<f64> {
        self.bus.exec_f64("R4").await
    }

    /// `R5`, heater output as a percentage of the range limit.
    pub async fn heater_output_percent(&mut self) -> Result<f64> {
        self.bus.exec_f64("R5").await
    }

    /// `R6`, heater output in volts.
    pub async fn heater_output_volts(&mut self) -> Result<f64> {
        self.bus.exec_f64("R6").await
    }

    /// `R7`, needle-valve gas flow in arbitrary units.
    pub async fn gas_flow(&mut self) -> Result<f64> {
        self.bus.exec_f64("R7").await
    }

    /// `R8`/`R9`/`R10`: the PID triple.
    pub async fn pid(&mut self) -> Result<(f64, f64, f64)> {
        let p = self.bus.exec_f64("R8").await?;
        let i = self.bus.exec_f64("R9").await?;
        let d = self.bus.exec_f64("R10").await?;
        Ok((p, i, d))
    }

    // Setters (remote mode only).

    /// `T`, the temperature setpoint in kelvin. The controller covers 0.3 K
    /// to 1500 K depending on sensor fit; anything outside is refused before
    /// touching the wire.
    pub async fn set_setpoint(&mut self, kelvin: f64) -> Result<()> {
        if !(0.3..=1500.0).contains(&kelvin) {
            return Err(BusError::SetpointOutOfRange {
                target: "temperature setpoint".to_string(),
                value: kelvin,
                unit: "K",
                min: 0.3,
                max: 1500.0,
            });
        }
        self.bus.exec_value(&format!("T{}", kelvin)).await?;
        Ok(())
    }

    pub async fn set_pid(&mut self, p: f64, i: f64, d: f64) -> Result<()> {
        self.bus.exec_value(&format!("P{}", p)).await?;
        self.bus.exec_value(&format!("I{}", i)).await?;
        self.bus.exec_value(&format!("D{}", d)).await?;
        Ok(())
    }

    pub async fn set_auto(&mut self, mode: AutoMode) -> Result<()> {
        self.bus
            .exec_value(&format!("A{}", mode.command_digit()))
            .await?;
        Ok(())
    }

    pub async fn set_auto_pid(&mut self, enabled: bool) -> Result<()> {
        self.bus
            .exec_value(if enabled { "L1" } else { "L0" })
            .await?;
        Ok(())
    }

    /// `H`, which sensor the control loop follows.
    pub async fn set_heater_sensor(&mut self, sensor: u8) -> Result<()> {
        validate_range("sensor", sensor, 1, 3)?;
        self.bus.exec_value(&format!("H{}", sensor)).await?;
        Ok(())
    }

    /// `O`, manual heater output in percent. Drops the heater out of auto.
    pub async fn set_heater_output(&mut self, percent: f64) -> Result<()> {
        validate_range("heater_output", percent, 0.0, 99.9)?;
        self.bus.exec_value(&format!("O{}", percent)).await?;
        Ok(())
    }

    /// `G`, manual gas flow in percent.
    pub async fn set_gas_flow(&mut self, percent: f64) -> Result<()> {
        validate_range("gas_flow", percent, 0.0, 99.9)?;
        self.bus.exec_value(&format!("G{}", percent)).await?;
        Ok(())
    }

    pub async fn set_control(&mut self, mode: ControlMode) -> Result<()> {
        self.bus.set_control(mode).await
    }

    pub async fn sweep_start(&mut self) -> Result<()> {
        self.bus.exec_value("S1").await?;
        Ok(())
    }

    pub async fn sweep_stop(&mut self) -> Result<()> {
        self.bus.exec_value("S0").await?;
        Ok(())
    }

    /// Local locked, for handing the front panel back at the end of a session.
    pub async fn local(&mut self) -> Result<()> {
        self.set_control(ControlMode::LocalLocked).await
    }

    pub async fn version(&mut self) -> Result<String> {
        self.bus.version().await
    }

    pub async fn identity(&mut self) -> Result<Identity> {
        self.bus.identity().await
    }
}

/// `XnAnCnSnnHnLn`, scanned by marker letter so the sweep field may be one or
/// two digits.
pub fn parse_status(reply: &str) -> Result<ItcStatus> {
    let bad = |reason: String| BusError::ParseError {
        reply: reply.to_string(),
        reason,
    };

    if !reply.is_ascii() {
        return Err(bad("status is not ASCII".to_string()));
    }
    if !reply.starts_with('X') {
        return Err(bad("status does not start with X".to_string()));
    }

    let mut positions = Vec::with_capacity(5);
    for marker in ['A', 'C', 'S', 'H', 'L'] {
        match reply.find(marker) {
            Some(index) => positions.push(index),
            None => return Err(bad(format!("marker {} missing", marker))),
        }
    }
    if !positions.windows(2).all(|w| w[0] < w[1]) || positions[0] < 2 {
        return Err(bad("markers out of order".to_string()));
    }

    let digits = |start: usize, end: usize, what: &str| -> Result<u8> {
        reply[start..end]
            .parse::<u8>()
            .map_err(|_| bad(format!("{} field is not a number", what)))
    };

    let [a, c, s, h, l] = [
        positions[0],
        positions[1],
        positions[2],
        positions[3],
        positions[4],
    ];
    let system = digits(1, a, "system")?;
    let auto_code = digits(a + 1, c, "auto mode")?;
    let control_code = digits(c + 1, s, "control mode")?;
    let sweep_code = digits(s + 1, h, "sweep")?;
    let heater_sensor = digits(h + 1, l, "heater sensor")?;
    let auto_pid_code = digits(l + 1, reply.len(), "auto-PID")?;

    let auto_mode = AutoMode::from_digit(auto_code)
        .ok_or_else(|| bad(format!("auto mode digit {} out of range", auto_code)))?;
    let control = ControlMode::from_digit(control_code)
        .ok_or_else(|| bad(format!("control mode digit {} out of range", control_code)))?;
    let auto_pid = match auto_pid_code {
        0 => false,
        1 => true,
        other => return Err(bad(format!("auto-PID digit {} out of range", other))),
    };

    Ok(ItcStatus {
        system,
        auto_mode,
        control,
        sweep: SweepPhase::from_code(sweep_code),
        heater_sensor,
        auto_pid,
        raw: reply.to_string(),
    })
}
