use crate::domain::ports::Transport;
use crate::utils::error::{BusError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Line terminators for one link.
///
/// ISOBUS instruments frame both directions with a bare CR; Mercury-series
/// controllers use LF. A GPIB bridge talks LF to the bridge itself while the
/// forwarded instrument replies keep their native terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub tx: &'static str,
    pub rx: u8,
}

impl Framing {
    pub const ISOBUS: Framing = Framing { tx: "\r", rx: b'\r' };
    pub const SCPI: Framing = Framing { tx: "\n", rx: b'\n' };

    /// Framing for the same protocol when it crosses a Prologix-style bridge:
    /// commands are framed for the bridge, replies keep the instrument's
    /// terminator.
    pub fn bridged(self) -> Framing {
        Framing { tx: "\n", rx: self.rx }
    }
}

/// Byte stream wrapped into a line-oriented [`Transport`].
///
/// Reads are buffered: a `receive_line` that picks up more than one line keeps
/// the surplus for the next call instead of dropping it.
pub struct AsciiLink<T> {
    stream: T,
    framing: Framing,
    read_buf: Vec<u8>,
    endpoint: String,
}

impl<T> AsciiLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T, framing: Framing, endpoint: impl Into<String>) -> Self {
        Self {
            stream,
            framing,
            read_buf: Vec::with_capacity(128),
            endpoint: endpoint.into(),
        }
    }

    fn find_terminator(&self, start_hint: usize) -> Option<usize> {
        let start = start_hint.min(self.read_buf.len());
        self.read_buf[start..]
            .iter()
            .position(|b| *b == self.framing.rx)
            .map(|offset| start + offset)
    }

    /// Removes the first `n` bytes of the read buffer, keeping any surplus.
    fn consume(&mut self, n: usize) {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        } else {
            self.read_buf.rotate_left(n);
            let keep = self.read_buf.len() - n;
            self.read_buf.truncate(keep);
            self.read_buf.shrink_to(128);
        }
    }

    /// Reads until the buffer holds at least one terminator, returning its index.
    async fn buffer_line(&mut self) -> Result<usize> {
        let mut scanned = 0;
        loop {
            if let Some(index) = self.find_terminator(scanned) {
                return Ok(index);
            }
            scanned = self.read_buf.len();

            let mut chunk = [0u8; 64];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(BusError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("link to {} closed while waiting for a reply", self.endpoint),
                )));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Cuts the buffered line at `end` and strips terminator residue. CRLF
    /// pairs leave a stray byte on whichever side the terminator is not,
    /// so both edges are trimmed.
    fn take_line(&mut self, end: usize) -> Result<String> {
        let raw = self.read_buf[..end].to_vec();
        self.consume(end + 1);

        let text = String::from_utf8(raw).map_err(|e| BusError::ParseError {
            reply: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: "reply is not ASCII".to_string(),
        })?;
        Ok(text.trim_matches(|c| c == '\r' || c == '\n').to_string())
    }
}

#[async_trait]
impl<T> Transport for AsciiLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, line: &str) -> Result<()> {
        tracing::trace!(endpoint = %self.endpoint, tx = %line, "send");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(self.framing.tx.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive_line(&mut self) -> Result<String> {
        loop {
            let end = self.buffer_line().await?;
            let line = self.take_line(end)?;
            if !line.is_empty() {
                tracing::trace!(endpoint = %self.endpoint, rx = %line, "receive");
                return Ok(line);
            }
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_appends_cr_for_isobus() {
        let stream = tokio_test::io::Builder::new().write(b"@1R1\r").build();
        let mut link = AsciiLink::new(stream, Framing::ISOBUS, "mock");
        link.send_line("@1R1").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_appends_lf_for_scpi() {
        let stream = tokio_test::io::Builder::new()
            .write(b"READ:DEV:GRPZ:PSU:SIG:FLD\n")
            .build();
        let mut link = AsciiLink::new(stream, Framing::SCPI, "mock");
        link.send_line("READ:DEV:GRPZ:PSU:SIG:FLD").await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_strips_terminator() {
        let stream = tokio_test::io::Builder::new().read(b"R732\r").build();
        let mut link = AsciiLink::new(stream, Framing::ISOBUS, "mock");
        assert_eq!(link.receive_line().await.unwrap(), "R732");
    }

    #[tokio::test]
    async fn test_receive_reassembles_split_reply() {
        let stream = tokio_test::io::Builder::new()
            .read(b"R7")
            .read(b"32\r")
            .build();
        let mut link = AsciiLink::new(stream, Framing::ISOBUS, "mock");
        assert_eq!(link.receive_line().await.unwrap(), "R732");
    }

    #[tokio::test]
    async fn test_receive_keeps_surplus_for_next_call() {
        let stream = tokio_test::io::Builder::new().read(b"R732\rR810\r").build();
        let mut link = AsciiLink::new(stream, Framing::ISOBUS, "mock");
        assert_eq!(link.receive_line().await.unwrap(), "R732");
        assert_eq!(link.receive_line().await.unwrap(), "R810");
    }

    #[tokio::test]
    async fn test_receive_tolerates_crlf() {
        // CR-framed link fed CRLF replies: the stray LF must not leak into the
        // next line.
        let stream = tokio_test::io::Builder::new()
            .read(b"R732\r\n")
            .read(b"X000S00A0R00\r\n")
            .build();
        let mut link = AsciiLink::new(stream, Framing::ISOBUS, "mock");
        assert_eq!(link.receive_line().await.unwrap(), "R732");
        assert_eq!(link.receive_line().await.unwrap(), "X000S00A0R00");
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let stream = tokio_test::io::Builder::new().build();
        let mut link = AsciiLink::new(stream, Framing::SCPI, "mock");
        match link.receive_line().await {
            Err(BusError::IoError(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected EOF error, got {:?}", other),
        }
    }
}
