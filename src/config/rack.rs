use crate::core::LinkOptions;
use crate::utils::error::{BusError, Result};
use crate::utils::validation::{
    validate_baud_rate, validate_gpib_address, validate_isobus_address, validate_non_empty_string,
    validate_path, validate_positive_number, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// 機架配置：一個 TOML 檔描述整個低溫機架上的儀器與連線
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackConfig {
    pub rack: RackInfo,
    #[serde(default)]
    pub defaults: TimingConfig,
    #[serde(default, rename = "instrument")]
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackInfo {
    pub name: String,
    pub description: Option<String>,
}

/// 時間參數：機架層級的預設值，儀器層級可覆寫
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    pub timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    pub kind: InstrumentKind,
    /// ISOBUS 位址 1-8；省略表示儀器單獨掛在鏈路上，不加 @n 前綴
    pub isobus_address: Option<u8>,
    pub link: LinkConfig,
    pub timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Ilm210,
    Itc503,
    MercuryIps,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Ilm210 => "ilm210",
            InstrumentKind::Itc503 => "itc503",
            InstrumentKind::MercuryIps => "mercury_ips",
        }
    }

    /// 舊式 ISOBUS 儀器走 CR 結尾與回音協定；Mercury 走 SCPI
    pub fn is_isobus(&self) -> bool {
        matches!(self, InstrumentKind::Ilm210 | InstrumentKind::Itc503)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        #[serde(default = "default_parity")]
        parity: String,
    },
    Tcp {
        host: String,
        #[serde(default = "default_scpi_port")]
        port: u16,
    },
    /// Prologix GPIB-Ethernet/USB 橋接器，`over` 指向承載它的串列或 TCP 鏈路
    Prologix {
        gpib_address: u8,
        over: Box<LinkConfig>,
    },
}

// Oxford 儀器的出廠串列參數是 9600-8-2-none
fn default_baud() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    2
}

fn default_parity() -> String {
    "none".to_string()
}

// Mercury 系列的 SCPI-over-Ethernet 固定埠
fn default_scpi_port() -> u16 {
    7020
}

impl RackConfig {
    /// 從 TOML 檔案載入機架配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| BusError::ConfigError {
            message: format!("Failed to read config file '{}': {}", path.as_ref().display(), e),
        })?;

        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串載入配置（支援環境變數替換）
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let substituted = Self::substitute_env_vars(content);

        let config: RackConfig =
            toml::from_str(&substituted).map_err(|e| BusError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;

        config.validate_config()?;
        Ok(config)
    }

    /// 環境變數替換：${VAR_NAME} 格式
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    /// 驗證配置的完整性
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
    }

    /// 以名稱查找儀器
    pub fn instrument(&self, name: &str) -> Result<&InstrumentConfig> {
        self.instruments
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| BusError::UnknownInstrument {
                name: name.to_string(),
            })
    }

    /// 解析某台儀器實際生效的時間參數：儀器覆寫 > 機架預設 > 內建預設
    pub fn options_for(&self, instrument: &InstrumentConfig) -> LinkOptions {
        let builtin = LinkOptions::default();

        let pick_ms = |field: Option<u64>, default_field: Option<u64>, builtin: Duration| {
            field
                .or(default_field)
                .map(Duration::from_millis)
                .unwrap_or(builtin)
        };

        LinkOptions {
            timeout: pick_ms(instrument.timeout_ms, self.defaults.timeout_ms, builtin.timeout),
            settle: pick_ms(instrument.settle_ms, self.defaults.settle_ms, builtin.settle),
            retry_attempts: instrument
                .retry_attempts
                .or(self.defaults.retry_attempts)
                .unwrap_or(builtin.retry_attempts),
            retry_delay: pick_ms(
                instrument.retry_delay_ms,
                self.defaults.retry_delay_ms,
                builtin.retry_delay,
            ),
        }
    }
}

impl LinkConfig {
    fn validate_link(&self, instrument_name: &str, depth: usize) -> Result<()> {
        match self {
            LinkConfig::Serial { port, baud, data_bits, stop_bits, parity } => {
                validate_path(&format!("instrument.{}.link.port", instrument_name), port)?;
                validate_baud_rate(&format!("instrument.{}.link.baud", instrument_name), *baud)?;

                if !matches!(data_bits, 7 | 8) {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.link.data_bits", instrument_name),
                        value: data_bits.to_string(),
                        reason: "Data bits must be 7 or 8".to_string(),
                    });
                }

                if !matches!(stop_bits, 1 | 2) {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.link.stop_bits", instrument_name),
                        value: stop_bits.to_string(),
                        reason: "Stop bits must be 1 or 2".to_string(),
                    });
                }

                if !matches!(parity.as_str(), "none" | "odd" | "even") {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.link.parity", instrument_name),
                        value: parity.clone(),
                        reason: "Parity must be one of: none, odd, even".to_string(),
                    });
                }

                Ok(())
            }
            LinkConfig::Tcp { host, port } => {
                validate_non_empty_string(&format!("instrument.{}.link.host", instrument_name), host)?;

                if *port == 0 {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.link.port", instrument_name),
                        value: port.to_string(),
                        reason: "TCP port must be non-zero".to_string(),
                    });
                }

                Ok(())
            }
            LinkConfig::Prologix { gpib_address, over } => {
                validate_gpib_address(&format!("instrument.{}.link.gpib_address", instrument_name), *gpib_address)?;

                // 橋接器不能疊橋接器
                if depth > 0 || matches!(over.as_ref(), LinkConfig::Prologix { .. }) {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.link.over", instrument_name),
                        value: "prologix".to_string(),
                        reason: "A Prologix bridge cannot be carried over another Prologix bridge".to_string(),
                    });
                }

                over.validate_link(instrument_name, depth + 1)
            }
        }
    }
}

impl Validate for RackConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("rack.name", &self.rack.name)?;

        if self.instruments.is_empty() {
            return Err(BusError::MissingConfigError {
                field: "instrument".to_string(),
            });
        }

        if let Some(timeout) = self.defaults.timeout_ms {
            validate_positive_number("defaults.timeout_ms", timeout, 1)?;
        }

        let mut seen_names = HashSet::new();
        for instrument in &self.instruments {
            validate_non_empty_string("instrument.name", &instrument.name)?;

            if !seen_names.insert(instrument.name.as_str()) {
                return Err(BusError::InvalidConfigValueError {
                    field: "instrument.name".to_string(),
                    value: instrument.name.clone(),
                    reason: "Instrument names must be unique within a rack".to_string(),
                });
            }

            if let Some(address) = instrument.isobus_address {
                if !instrument.kind.is_isobus() {
                    return Err(BusError::InvalidConfigValueError {
                        field: format!("instrument.{}.isobus_address", instrument.name),
                        value: address.to_string(),
                        reason: format!(
                            "{} speaks SCPI and does not use ISOBUS addressing",
                            instrument.kind.as_str()
                        ),
                    });
                }

                validate_isobus_address(
                    &format!("instrument.{}.isobus_address", instrument.name),
                    address,
                )?;
            }

            if let Some(timeout) = instrument.timeout_ms {
                validate_positive_number(
                    &format!("instrument.{}.timeout_ms", instrument.name),
                    timeout,
                    1,
                )?;
            }

            instrument.link.validate_link(&instrument.name, 0)?;
        }

        Ok(())
    }
}
