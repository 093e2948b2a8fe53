pub mod rack;

pub use rack::{
    InstrumentConfig, InstrumentKind, LinkConfig, RackConfig, RackInfo, TimingConfig,
};
