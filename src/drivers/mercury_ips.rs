use crate::core::ScpiClient;
use crate::domain::model::{Axis, Identity, MagnetAction};
use crate::utils::error::{BusError, Result};

/// Mercury iPS-M magnet power supply, speaking the verb-noun grammar over TCP
/// (port 7020) or a serial/GPIB link.
///
/// Each fitted axis is a `GRP{X,Y,Z}:PSU` device group; [`MercuryIps::magnet`]
/// hands out a per-axis view over the shared client.
pub struct MercuryIps {
    scpi: ScpiClient,
}

/// Largest field setpoint magnitude per axis, in tesla. The solenoid (Z)
/// takes 6 T, the split-pair X/Y coils 1 T.
fn field_limit(axis: Axis) -> f64 {
    match axis {
        Axis::X | Axis::Y => 1.0,
        Axis::Z => 6.0,
    }
}

const CURRENT_LIMIT_A: f64 = 360.0;
const CURRENT_RAMP_LIMIT_A_PER_MIN: f64 = 1200.0;

impl MercuryIps {
    pub fn new(scpi: ScpiClient) -> Self {
        Self { scpi }
    }

    pub fn endpoint(&self) -> String {
        self.scpi.endpoint()
    }

    pub async fn identity(&mut self) -> Result<Identity> {
        self.scpi.identity().await
    }

    /// `*IDN?` plus the sanity check a session starts with: the far end must
    /// actually be an Oxford Mercury, not whatever else answered the socket.
    pub async fn connect_check(&mut self) -> Result<Identity> {
        let identity = self.identity().await?;
        let vendor = identity.vendor.as_deref().unwrap_or("");
        let model = identity.model.as_deref().unwrap_or("");
        if !(vendor.contains("OXFORD INSTRUMENTS") && model.contains("MERCURY")) {
            return Err(BusError::IdentityMismatch {
                endpoint: self.scpi.endpoint(),
                expected: "OXFORD INSTRUMENTS MERCURY".to_string(),
                reply: format!("{}:{}", vendor, model),
            });
        }
        Ok(identity)
    }

    /// `READ:SYS:CAT`, the boards this unit actually carries, as
    /// `GRPZ:PSU`-style entries.
    pub async fn catalogue(&mut self) -> Result<Vec<String>> {
        let value = self.scpi.read("SYS:CAT").await?;
        Ok(value
            .split("DEV:")
            .map(|entry| entry.trim_matches(':').to_string())
            .filter(|entry| !entry.is_empty())
            .collect())
    }

    pub fn magnet(&mut self, axis: Axis) -> Magnet<'_> {
        Magnet {
            scpi: &mut self.scpi,
            axis,
        }
    }
}

/// One axis of the supply. Borrows the client, so only one axis talks at a
/// time — which is all a single socket can do anyway.
pub struct Magnet<'a> {
    scpi: &'a mut ScpiClient,
    axis: Axis,
}

impl Magnet<'_> {
    pub fn axis(&self) -> Axis {
        self.axis
    }

    fn sig(&self, leaf: &str) -> String {
        format!("DEV:{}:PSU:SIG:{}", self.axis.group(), leaf)
    }

    fn actn(&self) -> String {
        format!("DEV:{}:PSU:ACTN", self.axis.group())
    }

    /// SIG:FLD, the field at the leads in tesla.
    pub async fn field(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("FLD"), "T").await
    }

    pub async fn field_setpoint(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("FSET"), "T").await
    }

    pub async fn set_field_setpoint(&mut self, tesla: f64) -> Result<()> {
        let limit = field_limit(self.axis);
        if !tesla.is_finite() || tesla.abs() > limit {
            return Err(BusError::SetpointOutOfRange {
                target: format!("{} axis field setpoint", self.axis),
                value: tesla,
                unit: "T",
                min: -limit,
                max: limit,
            });
        }
        self.scpi.set_f64(&self.sig("FSET"), tesla).await
    }

    /// SIG:RFST, field ramp rate in tesla per minute.
    pub async fn field_ramp_rate(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("RFST"), "T/m").await
    }

    pub async fn set_field_ramp_rate(&mut self, tesla_per_min: f64) -> Result<()> {
        self.scpi.set_f64(&self.sig("RFST"), tesla_per_min).await
    }

    /// SIG:CURR, current through the leads in amperes.
    pub async fn current(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("CURR"), "A").await
    }

    /// SIG:PCUR, the persistent-mode current frozen into the magnet.
    pub async fn persistent_current(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("PCUR"), "A").await
    }

    /// SIG:VOLT, voltage across the leads.
    pub async fn voltage(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("VOLT"), "V").await
    }

    pub async fn current_setpoint(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("CSET"), "A").await
    }

    pub async fn set_current_setpoint(&mut self, amps: f64) -> Result<()> {
        if !amps.is_finite() || amps.abs() > CURRENT_LIMIT_A {
            return Err(BusError::SetpointOutOfRange {
                target: format!("{} axis current setpoint", self.axis),
                value: amps,
                unit: "A",
                min: -CURRENT_LIMIT_A,
                max: CURRENT_LIMIT_A,
            });
        }
        self.scpi.set_f64(&self.sig("CSET"), amps).await
    }

    /// SIG:RCST, current ramp rate in amperes per minute.
    pub async fn current_ramp_rate(&mut self) -> Result<f64> {
        self.scpi.read_f64(&self.sig("RCST"), "A/m").await
    }

    pub async fn set_current_ramp_rate(&mut self, amps_per_min: f64) -> Result<()> {
        if !amps_per_min.is_finite()
            || !(0.0..=CURRENT_RAMP_LIMIT_A_PER_MIN).contains(&amps_per_min)
        {
            return Err(BusError::SetpointOutOfRange {
                target: format!("{} axis current ramp rate", self.axis),
                value: amps_per_min,
                unit: "A/min",
                min: 0.0,
                max: CURRENT_RAMP_LIMIT_A_PER_MIN,
            });
        }
        self.scpi.set_f64(&self.sig("RCST"), amps_per_min).await
    }

    /// SIG:SWHT, whether the superconducting switch heater is on.
    pub async fn switch_heater(&mut self) -> Result<bool> {
        let value = self.scpi.read(&self.sig("SWHT")).await?;
        match value.as_str() {
            "ON" => Ok(true),
            "OFF" => Ok(false),
            _ => Err(BusError::ParseError {
                reply: value,
                reason: "expected ON or OFF".to_string(),
            }),
        }
    }

    pub async fn set_switch_heater(&mut self, on: bool) -> Result<()> {
        self.scpi
            .set(&self.sig("SWHN"), if on { "ON" } else { "OFF" })
            .await
    }

    /// ACTN readback: what the supply is doing right now.
    pub async fn activity(&mut self) -> Result<MagnetAction> {
        let value = self.scpi.read(&self.actn()).await?;
        MagnetAction::from_token(&value).ok_or(BusError::ParseError {
            reply: value,
            reason: "expected HOLD, RTOS, RTOZ or CLMP".to_string(),
        })
    }

    pub async fn act(&mut self, action: MagnetAction) -> Result<()> {
        self.scpi.set(&self.actn(), action.token()).await
    }

    /// Stop a ramp (or let one finish) and sit at the present output.
    pub async fn hold(&mut self) -> Result<()> {
        self.act(MagnetAction::Hold).await
    }

    pub async fn ramp_to_setpoint(&mut self) -> Result<()> {
        self.act(MagnetAction::ToSetpoint).await
    }

    pub async fn ramp_to_zero(&mut self) -> Result<()> {
        self.act(MagnetAction::ToZero).await
    }

    /// Clamp the output stage. Only sensible at zero field.
    pub async fn clamp(&mut self) -> Result<()> {
        self.act(MagnetAction::Clamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockLink;
    use crate::core::LinkOptions;
    use std::time::Duration;

    fn supply(link: MockLink) -> MercuryIps {
        let options = LinkOptions {
            timeout: Duration::from_millis(50),
            settle: Duration::ZERO,
            retry_attempts: 0,
            retry_delay: Duration::from_millis(1),
        };
        MercuryIps::new(ScpiClient::new(Box::new(link), options))
    }

    #[tokio::test]
    async fn test_field_read() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:FLD",
            "STAT:DEV:GRPZ:PSU:SIG:FLD:4.9999T",
        );
        let mut ips = supply(probe.clone());
        let field = ips.magnet(Axis::Z).field().await.unwrap();
        assert!((field - 4.9999).abs() < 1e-9);
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_field_setpoint_guards_per_axis() {
        let mut ips = supply(MockLink::new());
        // 2 T is fine on Z but over the X coil's limit.
        assert!(matches!(
            ips.magnet(Axis::X).set_field_setpoint(2.0).await,
            Err(BusError::SetpointOutOfRange { .. })
        ));
        assert!(matches!(
            ips.magnet(Axis::Z).set_field_setpoint(6.5).await,
            Err(BusError::SetpointOutOfRange { .. })
        ));
        assert!(matches!(
            ips.magnet(Axis::Z).set_field_setpoint(f64::NAN).await,
            Err(BusError::SetpointOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_field_setpoint_within_limit_hits_the_wire() {
        let probe = MockLink::new().expect(
            "SET:DEV:GRPZ:PSU:SIG:FSET:5",
            "STAT:SET:DEV:GRPZ:PSU:SIG:FSET:5:VALID",
        );
        let mut ips = supply(probe.clone());
        ips.magnet(Axis::Z).set_field_setpoint(5.0).await.unwrap();
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_current_ramp_rate_guard() {
        let mut ips = supply(MockLink::new());
        assert!(matches!(
            ips.magnet(Axis::Z).set_current_ramp_rate(-1.0).await,
            Err(BusError::SetpointOutOfRange { .. })
        ));
        assert!(matches!(
            ips.magnet(Axis::Z).set_current_ramp_rate(1500.0).await,
            Err(BusError::SetpointOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_switch_heater_readback() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:SWHT",
            "STAT:DEV:GRPZ:PSU:SIG:SWHT:OFF",
        );
        let mut ips = supply(probe.clone());
        assert!(!ips.magnet(Axis::Z).switch_heater().await.unwrap());
    }

    #[tokio::test]
    async fn test_actions_and_activity() {
        let probe = MockLink::new()
            .expect(
                "SET:DEV:GRPX:PSU:ACTN:RTOZ",
                "STAT:SET:DEV:GRPX:PSU:ACTN:RTOZ:VALID",
            )
            .expect("READ:DEV:GRPX:PSU:ACTN", "STAT:DEV:GRPX:PSU:ACTN:RTOZ");
        let mut ips = supply(probe.clone());
        let mut magnet = ips.magnet(Axis::X);
        magnet.ramp_to_zero().await.unwrap();
        assert_eq!(magnet.activity().await.unwrap(), MagnetAction::ToZero);
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_connect_check_rejects_strangers() {
        let probe = MockLink::new().expect("*IDN?", "IDN:ACME:WIDGET:1:0.1");
        let mut ips = supply(probe.clone());
        assert!(matches!(
            ips.connect_check().await,
            Err(BusError::IdentityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_catalogue_lists_fitted_boards() {
        let probe = MockLink::new().expect(
            "READ:SYS:CAT",
            "STAT:SYS:CAT:DEV:GRPX:PSU:DEV:GRPY:PSU:DEV:GRPZ:PSU",
        );
        let mut ips = supply(probe.clone());
        assert_eq!(
            ips.catalogue().await.unwrap(),
            vec!["GRPX:PSU", "GRPY:PSU", "GRPZ:PSU"]
        );
    }
}
