use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    SerialError(#[from] tokio_serial::Error),

    #[error("CSV output error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("No reply from {endpoint} within {timeout_ms} ms (command: {command:?})")]
    TimeoutError {
        endpoint: String,
        command: String,
        timeout_ms: u64,
    },

    #[error("Instrument rejected command {command:?}: reply was {reply:?}")]
    CommandRejected { command: String, reply: String },

    #[error("SCPI fault {fault} for {noun} (reply: {reply:?})")]
    ScpiFault {
        noun: String,
        fault: ScpiFaultKind,
        reply: String,
    },

    #[error("Unexpected reply to {command:?}: {reply:?}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Cannot parse reply {reply:?}: {reason}")]
    ParseError { reply: String, reason: String },

    #[error("Setpoint {value} {unit} outside [{min}, {max}] for {target}")]
    SetpointOutOfRange {
        target: String,
        value: f64,
        unit: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Identity mismatch at {endpoint}: expected {expected}, got {reply:?}")]
    IdentityMismatch {
        endpoint: String,
        expected: String,
        reply: String,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("No instrument named {name:?} in the rack configuration")]
    UnknownInstrument { name: String },
}

/// Fault tokens a Mercury-series controller appends to a reply instead of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScpiFaultKind {
    /// Malformed command or a value outside the accepted range.
    Invalid,
    /// The noun path does not exist on this instrument.
    NotFound,
    /// The setting is locked out (wrong mode, or switch heater state forbids it).
    Denied,
    /// The reading is not available right now.
    NotAvailable,
}

impl ScpiFaultKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "INVALID" => Some(Self::Invalid),
            "NOT_FOUND" => Some(Self::NotFound),
            "DENIED" => Some(Self::Denied),
            "N/A" => Some(Self::NotAvailable),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScpiFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Invalid => "INVALID",
            Self::NotFound => "NOT_FOUND",
            Self::Denied => "DENIED",
            Self::NotAvailable => "N/A",
        };
        write!(f, "{}", token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Link,
    Protocol,
    Device,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BusError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IoError(_) | Self::SerialError(_) | Self::TimeoutError { .. } => {
                ErrorCategory::Link
            }
            Self::CommandRejected { .. }
            | Self::UnexpectedReply { .. }
            | Self::ParseError { .. }
            | Self::IdentityMismatch { .. } => ErrorCategory::Protocol,
            Self::ScpiFault { .. } | Self::SetpointOutOfRange { .. } => ErrorCategory::Device,
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::UnknownInstrument { .. } => ErrorCategory::Config,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TimeoutError { .. } => ErrorSeverity::Medium,
            Self::IoError(_) | Self::SerialError(_) => ErrorSeverity::Critical,
            Self::CommandRejected { .. }
            | Self::ScpiFault { .. }
            | Self::UnexpectedReply { .. }
            | Self::ParseError { .. }
            | Self::IdentityMismatch { .. }
            | Self::SetpointOutOfRange { .. } => ErrorSeverity::High,
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::UnknownInstrument { .. } => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::IoError(_) | Self::SerialError(_) => {
                "Check the cable, the port path and that no other program holds the link open"
                    .to_string()
            }
            Self::TimeoutError { timeout_ms, .. } => format!(
                "Instrument did not answer within {} ms; check the ISOBUS address / GPIB address, \
                 raise timeout_ms, or power-cycle the instrument",
                timeout_ms
            ),
            Self::CommandRejected { .. } => {
                "The instrument refused the command; it may be in LOCAL mode — \
                 switch it to remote first"
                    .to_string()
            }
            Self::ScpiFault { fault, .. } => match fault {
                ScpiFaultKind::Invalid => {
                    "Check the value range and the command spelling".to_string()
                }
                ScpiFaultKind::NotFound => {
                    "Run `READ:SYS:CAT` to list the boards this unit actually carries".to_string()
                }
                ScpiFaultKind::Denied => {
                    "The setting is locked out; check the switch heater state and remote mode"
                        .to_string()
                }
                ScpiFaultKind::NotAvailable => {
                    "The reading is not available right now; retry after the unit settles"
                        .to_string()
                }
            },
            Self::UnexpectedReply { .. } | Self::ParseError { .. } => {
                "Reply did not match the expected grammar; check for a wrong baud rate, \
                 a stale reply in the buffer, or a different instrument on this address"
                    .to_string()
            }
            Self::IdentityMismatch { .. } => {
                "A different instrument answered; check the address wiring in the rack file"
                    .to_string()
            }
            Self::SetpointOutOfRange { .. } => {
                "Pick a setpoint inside the supported range for this axis".to_string()
            }
            Self::CsvError(_) | Self::SerializationError(_) => {
                "Check that the output path is writable".to_string()
            }
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => {
                "Fix the rack TOML file; `rack_check` prints the full validation report".to_string()
            }
            Self::UnknownInstrument { .. } => {
                "List configured instruments with `cryobus status`".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Link => format!("Link problem: {}", self),
            ErrorCategory::Protocol => format!("Protocol problem: {}", self),
            ErrorCategory::Device => format!("Instrument refused: {}", self),
            ErrorCategory::Config => format!("Configuration problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
