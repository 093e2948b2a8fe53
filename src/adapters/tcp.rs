use crate::adapters::ascii::{AsciiLink, Framing};
use crate::utils::error::Result;
use tokio::net::TcpStream;

/// Connects to an instrument's raw-socket command port.
///
/// Mercury-series controllers listen on port 7020 and speak exactly the same
/// dialect as their serial port, one command per connection turn.
pub async fn connect_tcp(host: &str, port: u16, framing: Framing) -> Result<AsciiLink<TcpStream>> {
    let (stream, endpoint) = connect_tcp_stream(host, port).await?;
    Ok(AsciiLink::new(stream, framing, endpoint))
}

/// Raw-stream variant for callers that frame the socket themselves, such as a
/// GPIB bridge reached over Ethernet.
pub async fn connect_tcp_stream(host: &str, port: u16) -> Result<(TcpStream, String)> {
    let endpoint = format!("{}:{}", host, port);
    let stream = TcpStream::connect(&endpoint).await?;
    // Command/response turnaround dominates; never batch the writes.
    stream.set_nodelay(true)?;

    tracing::debug!(endpoint = %endpoint, "tcp link open");
    Ok((stream, endpoint))
}
