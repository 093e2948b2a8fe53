use crate::adapters::ascii::{AsciiLink, Framing};
use crate::utils::error::{BusError, Result};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Opens a serial port with the byte format the instrument expects.
///
/// Oxford ISOBUS racks ship with 9600 baud, 8 data bits, 2 stop bits and no
/// parity; the arguments exist for units that were reconfigured in the field.
pub fn open_serial(
    path: &str,
    baud: u32,
    data_bits: u8,
    stop_bits: u8,
    parity: &str,
    framing: Framing,
) -> Result<AsciiLink<SerialStream>> {
    let stream = open_serial_stream(path, baud, data_bits, stop_bits, parity)?;
    Ok(AsciiLink::new(stream, framing, path))
}

/// Raw-stream variant for callers that frame the port themselves, such as a
/// GPIB bridge sitting between the port and the instrument.
pub fn open_serial_stream(
    path: &str,
    baud: u32,
    data_bits: u8,
    stop_bits: u8,
    parity: &str,
) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, baud)
        .data_bits(map_data_bits(data_bits)?)
        .stop_bits(map_stop_bits(stop_bits)?)
        .parity(map_parity(parity)?)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    tracing::debug!(port = %path, baud, "serial port open");
    Ok(stream)
}

fn map_data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(BusError::InvalidConfigValueError {
            field: "data_bits".to_string(),
            value: other.to_string(),
            reason: "data bits must be 5, 6, 7 or 8".to_string(),
        }),
    }
}

fn map_stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(BusError::InvalidConfigValueError {
            field: "stop_bits".to_string(),
            value: other.to_string(),
            reason: "stop bits must be 1 or 2".to_string(),
        }),
    }
}

fn map_parity(parity: &str) -> Result<Parity> {
    match parity.to_ascii_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "even" => Ok(Parity::Even),
        "odd" => Ok(Parity::Odd),
        other => Err(BusError::InvalidConfigValueError {
            field: "parity".to_string(),
            value: other.to_string(),
            reason: "parity must be none, even or odd".to_string(),
        }),
    }
}
