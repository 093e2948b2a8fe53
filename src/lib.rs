pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod drivers;
pub mod utils;

pub use adapters::{AsciiLink, Framing, MockLink, PrologixLink};
pub use config::{InstrumentConfig, InstrumentKind, LinkConfig, RackConfig};
pub use core::{IsobusClient, LinkOptions, ScpiClient};
pub use domain::model::{Axis, ControlMode, Identity, MagnetAction, ProbeRate, Reading};
pub use domain::ports::Transport;
pub use drivers::{Ilm210, Itc503, MercuryIps, Rig};
pub use utils::error::{BusError, Result};
