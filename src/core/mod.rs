pub mod isobus;
pub mod scpi;

pub use crate::domain::model::{Axis, ControlMode, Identity, MagnetAction, ProbeRate};
pub use crate::domain::ports::Transport;
pub use crate::utils::error::Result;
pub use isobus::IsobusClient;
pub use scpi::ScpiClient;

use std::time::Duration;

/// Per-link timing knobs, resolved from the rack file's `[defaults]` section
/// plus per-instrument overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// How long to wait for a reply before the command counts as lost.
    pub timeout: Duration,
    /// Pause between writing a command and reading the reply. Older ISOBUS
    /// instruments drop characters when interrogated back-to-back.
    pub settle: Duration,
    /// Extra attempts after a timeout. Rejections are never retried.
    pub retry_attempts: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            settle: Duration::from_millis(70),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}
