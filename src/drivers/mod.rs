// Drivers layer: one façade per instrument family, plus the factory that
// turns a rack entry into a connected driver.

pub mod ilm210;
pub mod itc503;
pub mod mercury_ips;

pub use ilm210::{ChannelUsage, Ilm210, IlmChannel, IlmStatus};
pub use itc503::{AutoMode, Itc503, ItcStatus, SweepPhase};
pub use mercury_ips::{Magnet, MercuryIps};

use crate::adapters::{self, Framing, PrologixLink};
use crate::config::{InstrumentConfig, InstrumentKind, LinkConfig};
use crate::core::{IsobusClient, LinkOptions, ScpiClient};
use crate::domain::model::Identity;
use crate::domain::ports::Transport;
use crate::utils::error::{BusError, Result};

/// A connected instrument of whichever kind the rack entry named.
pub enum Rig {
    Ilm210(Ilm210),
    Itc503(Itc503),
    MercuryIps(MercuryIps),
}

impl Rig {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Rig::Ilm210(_) => InstrumentKind::Ilm210,
            Rig::Itc503(_) => InstrumentKind::Itc503,
            Rig::MercuryIps(_) => InstrumentKind::MercuryIps,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Rig::Ilm210(driver) => driver.endpoint(),
            Rig::Itc503(driver) => driver.endpoint(),
            Rig::MercuryIps(driver) => driver.endpoint(),
        }
    }

    pub async fn identity(&mut self) -> Result<Identity> {
        match self {
            Rig::Ilm210(driver) => driver.identity().await,
            Rig::Itc503(driver) => driver.identity().await,
            Rig::MercuryIps(driver) => driver.identity().await,
        }
    }
}

/// Opens the configured link and wraps it in the matching driver.
pub async fn connect(instrument: &InstrumentConfig, options: LinkOptions) -> Result<Rig> {
    let framing = if instrument.kind.is_isobus() {
        Framing::ISOBUS
    } else {
        Framing::SCPI
    };

    let link = open_link(&instrument.link, framing, &instrument.name).await?;
    tracing::info!(
        instrument = %instrument.name,
        kind = instrument.kind.as_str(),
        endpoint = %link.endpoint(),
        "instrument link open"
    );

    let rig = match instrument.kind {
        InstrumentKind::Ilm210 => Rig::Ilm210(Ilm210::new(IsobusClient::new(
            link,
            instrument.isobus_address,
            options,
        ))),
        InstrumentKind::Itc503 => Rig::Itc503(Itc503::new(IsobusClient::new(
            link,
            instrument.isobus_address,
            options,
        ))),
        InstrumentKind::MercuryIps => {
            Rig::MercuryIps(MercuryIps::new(ScpiClient::new(link, options)))
        }
    };

    Ok(rig)
}

async fn open_link(
    link: &LinkConfig,
    framing: Framing,
    instrument_name: &str,
) -> Result<Box<dyn Transport>> {
    match link {
        LinkConfig::Serial {
            port,
            baud,
            data_bits,
            stop_bits,
            parity,
        } => {
            let link = adapters::open_serial(port, *baud, *data_bits, *stop_bits, parity, framing)?;
            Ok(Box::new(link))
        }
        LinkConfig::Tcp { host, port } => {
            let link = adapters::connect_tcp(host, *port, framing).await?;
            Ok(Box::new(link))
        }
        LinkConfig::Prologix { gpib_address, over } => match over.as_ref() {
            LinkConfig::Serial {
                port,
                baud,
                data_bits,
                stop_bits,
                parity,
            } => {
                let stream =
                    adapters::open_serial_stream(port, *baud, *data_bits, *stop_bits, parity)?;
                let bridge =
                    PrologixLink::attach(stream, framing, port.clone(), *gpib_address).await?;
                Ok(Box::new(bridge))
            }
            LinkConfig::Tcp { host, port } => {
                let (stream, endpoint) = adapters::connect_tcp_stream(host, *port).await?;
                let bridge = PrologixLink::attach(stream, framing, endpoint, *gpib_address).await?;
                Ok(Box::new(bridge))
            }
            // 配置驗證會擋掉，這裡再守一次
            LinkConfig::Prologix { .. } => Err(BusError::InvalidConfigValueError {
                field: format!("instrument.{}.link.over", instrument_name),
                value: "prologix".to_string(),
                reason: "A Prologix bridge cannot be carried over another Prologix bridge"
                    .to_string(),
            }),
        },
    }
}
