use crate::utils::error::{BusError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// ISOBUS daisy-chain addresses run from 1 to 8; 0 means "talk to everyone"
/// and is never valid for a single configured instrument.
pub fn validate_isobus_address(field_name: &str, address: u8) -> Result<()> {
    validate_range(field_name, address, 1, 8)
}

/// Primary GPIB addresses; 0 is conventionally the controller itself.
pub fn validate_gpib_address(field_name: &str, address: u8) -> Result<()> {
    validate_range(field_name, address, 1, 30)
}

pub fn validate_baud_rate(field_name: &str, baud: u32) -> Result<()> {
    let supported: HashSet<u32> = [1200, 2400, 4800, 9600, 19200].into_iter().collect();
    if !supported.contains(&baud) {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: baud.to_string(),
            reason: format!(
                "Unsupported baud rate. Supported rates: {}",
                "1200, 2400, 4800, 9600, 19200"
            ),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(BusError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}
