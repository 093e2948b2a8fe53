use crate::core::IsobusClient;
use crate::domain::model::{ControlMode, Identity, ProbeRate};
use crate::utils::error::{BusError, Result};
use crate::utils::validation::validate_range;
use serde::Serialize;

/// ILM210 helium/nitrogen level meter, addressed over ISOBUS.
///
/// Three probe channels; the interesting one is usually channel 1 with the
/// helium probe. Level replies are in tenths of a percent (`R732` = 73.2 %).
pub struct Ilm210 {
    bus: IsobusClient,
}

/// What a channel is wired up for, from the usage digit of the `X` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelUsage {
    NotInUse,
    Nitrogen,
    HeliumPulsed,
    HeliumContinuous,
    ProbeError,
    Unknown,
}

impl ChannelUsage {
    fn from_digit(digit: char) -> Self {
        match digit {
            '0' => Self::NotInUse,
            '1' => Self::Nitrogen,
            '2' => Self::HeliumPulsed,
            '3' => Self::HeliumContinuous,
            '9' => Self::ProbeError,
            _ => Self::Unknown,
        }
    }
}

/// One channel's slice of the `X` status reply.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IlmChannel {
    pub usage: ChannelUsage,
    /// Raw hex status byte; the named accessors cover the documented bits.
    pub flags: u8,
}

impl IlmChannel {
    /// Bit 0: probe current is flowing.
    pub fn current_flowing(&self) -> bool {
        self.flags & 0x01 != 0
    }

    /// Bits 1/2: FAST wins when the instrument reports both.
    pub fn probe_rate(&self) -> Option<ProbeRate> {
        if self.flags & 0x02 != 0 {
            Some(ProbeRate::Fast)
        } else if self.flags & 0x04 != 0 {
            Some(ProbeRate::Slow)
        } else {
            None
        }
    }
}

/// Decoded `X` status: `XabcSuuvvwwRzz`.
#[derive(Debug, Clone, Serialize)]
pub struct IlmStatus {
    pub channels: [IlmChannel; 3],
    /// Raw relay hex byte, bit n-1 for relay n.
    pub relays: u8,
    pub raw: String,
}

impl IlmStatus {
    pub fn relay_active(&self, relay: u8) -> bool {
        (1..=4).contains(&relay) && self.relays & (1 << (relay - 1)) != 0
    }
}

impl Ilm210 {
    pub fn new(bus: IsobusClient) -> Self {
        Self { bus }
    }

    pub fn endpoint(&self) -> String {
        self.bus.endpoint()
    }

    /// Level of `channel` (1..=3) in percent.
    pub async fn level(&mut self, channel: u8) -> Result<f64> {
        validate_range("channel", channel, 1, 3)?;
        let tenths = self.bus.exec_f64(&format!("R{}", channel)).await?;
        Ok(tenths / 10.0)
    }

    pub async fn status(&mut self) -> Result<IlmStatus> {
        let reply = self.bus.exec("X").await?;
        parse_status(&reply)
    }

    /// Probe rate of `channel`, read out of the status flags. `None` when the
    /// instrument reports neither rate bit (e.g. a nitrogen channel).
    pub async fn rate(&mut self, channel: u8) -> Result<Option<ProbeRate>> {
        validate_range("channel", channel, 1, 3)?;
        let status = self.status().await?;
        Ok(status.channels[channel as usize - 1].probe_rate())
    }

    /// Switches `channel` between slow and fast sampling. The command is only
    /// honoured in remote mode, so it rides the usual lock dance.
    pub async fn set_rate(&mut self, channel: u8, rate: ProbeRate) -> Result<()> {
        validate_range("channel", channel, 1, 3)?;
        let letter = match rate {
            ProbeRate::Slow => 'S',
            ProbeRate::Fast => 'T',
        };
        self.bus
            .exec_remote_locked(&format!("{}{}", letter, channel))
            .await?;
        Ok(())
    }

    pub async fn set_control(&mut self, mode: ControlMode) -> Result<()> {
        self.bus.set_control(mode).await
    }

    /// Remote unlocked: the state a session runs in.
    pub async fn remote(&mut self) -> Result<()> {
        self.set_control(ControlMode::RemoteUnlocked).await
    }

    /// Local locked: the state to leave the instrument in when done.
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

/// `XabcSuuvvwwRzz`: usage digits a/b/c, channel hex bytes uu/vv/ww, relay
/// hex byte zz.
pub fn parse_status(reply: &str) -> Result<IlmStatus> {
    let bad = |reason: &str| BusError::ParseError {
        reply: reply.to_string(),
        reason: reason.to_string(),
    };

    if !reply.is_ascii() {
        return Err(bad("status is not ASCII"));
    }
    let bytes = reply.as_bytes();
    if bytes.len() < 14 {
        return Err(bad("status shorter than XabcSuuvvwwRzz"));
    }
    if bytes[0] != b'X' || bytes[4] != b'S' || bytes[11] != b'R' {
        return Err(bad("X/S/R markers not where the layout puts them"));
    }

    let usage: Vec<ChannelUsage> = reply[1..4]
        .chars()
        .map(ChannelUsage::from_digit)
        .collect();
    let mut flags = [0u8; 3];
    for (slot, index) in [(0usize, 5usize), (1, 7), (2, 9)] {
        flags[slot] = u8::from_str_radix(&reply[index..index + 2], 16)
            .map_err(|_| bad("channel status byte is not hex"))?;
    }
    let relays = u8::from_str_radix(&reply[12..14], 16)
        .map_err(|_| bad("relay status byte is not hex"))?;

    Ok(IlmStatus {
        channels: [
            IlmChannel {
                usage: usage[0],
                flags: flags[0],
            },
            IlmChannel {
                usage: usage[1],
                flags: flags[1],
            },
            IlmChannel {
                usage: usage[2],
                flags: flags[2],
            },
        ],
        relays,
        raw: reply.to_string(),
    })
}
