use crate::adapters::ascii::{AsciiLink, Framing};
use crate::domain::ports::Transport;
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// GPIB instrument reached through a Prologix-style controller.
///
/// The bridge itself is a line device: `++` lines configure it, anything else
/// is forwarded to the addressed instrument. Payload lines must never start
/// with `++`; neither ISOBUS commands nor the SCPI-like grammar can.
pub struct PrologixLink<T> {
    inner: AsciiLink<T>,
    gpib_address: u8,
}

impl<T> PrologixLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Puts the bridge into controller mode and points it at one instrument.
    ///
    /// `framing` is the instrument's own framing; bridge commands always go
    /// out LF-terminated. `++eos 3` stops the bridge appending a second
    /// terminator and `++eoi 1` marks end-of-message the GPIB way, which the
    /// Oxford GPIB boards accept in place of a trailing CR.
    pub async fn attach(
        stream: T,
        framing: Framing,
        endpoint: impl Into<String>,
        gpib_address: u8,
    ) -> Result<Self> {
        let mut inner = AsciiLink::new(stream, framing.bridged(), endpoint);

        inner.send_line("++mode 1").await?;
        inner.send_line(&format!("++addr {}", gpib_address)).await?;
        inner.send_line("++auto 1").await?;
        inner.send_line("++eoi 1").await?;
        inner.send_line("++eos 3").await?;

        tracing::debug!(gpib_address, "bridge configured");
        Ok(Self {
            inner,
            gpib_address,
        })
    }
}

#[async_trait]
impl<T> Transport for PrologixLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.inner.send_line(line).await
    }

    async fn receive_line(&mut self) -> Result<String> {
        self.inner.receive_line().await
    }

    /// After a missed reply the instrument may still be composing one. A
    /// serial poll drains its status byte and a selected-device-clear flushes
    /// its output queue, so the retry starts from a clean bus.
    async fn reset(&mut self) -> Result<()> {
        self.inner.send_line("++spoll").await?;
        let status = self.inner.receive_line().await?;
        tracing::warn!(
            gpib_address = self.gpib_address,
            status = %status,
            "serial poll after missed reply"
        );
        self.inner.send_line("++clr").await?;
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{} @ GPIB {}", self.inner.endpoint(), self.gpib_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_configures_bridge() {
        let stream = tokio_test::io::Builder::new()
            .write(b"++mode 1\n")
            .write(b"++addr 24\n")
            .write(b"++auto 1\n")
            .write(b"++eoi 1\n")
            .write(b"++eos 3\n")
            .build();
        PrologixLink::attach(stream, Framing::ISOBUS, "/dev/ttyUSB0", 24)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forwarding_and_reply_framing() {
        // Commands go out LF-framed for the bridge; the instrument's reply
        // keeps its native CR terminator.
        let stream = tokio_test::io::Builder::new()
            .write(b"++mode 1\n")
            .write(b"++addr 24\n")
            .write(b"++auto 1\n")
            .write(b"++eoi 1\n")
            .write(b"++eos 3\n")
            .write(b"R1\n")
            .read(b"R732\r")
            .build();
        let mut link = PrologixLink::attach(stream, Framing::ISOBUS, "/dev/ttyUSB0", 24)
            .await
            .unwrap();
        link.send_line("R1").await.unwrap();
        assert_eq!(link.receive_line().await.unwrap(), "R732");
    }

    #[tokio::test]
    async fn test_reset_polls_and_clears() {
        let stream = tokio_test::io::Builder::new()
            .write(b"++mode 1\n")
            .write(b"++addr 24\n")
            .write(b"++auto 1\n")
            .write(b"++eoi 1\n")
            .write(b"++eos 3\n")
            .write(b"++spoll\n")
            .read(b"64\r\n")
            .write(b"++clr\n")
            .build();
        let mut link = PrologixLink::attach(stream, Framing::ISOBUS, "/dev/ttyUSB0", 24)
            .await
            .unwrap();
        link.reset().await.unwrap();
        assert_eq!(link.endpoint(), "/dev/ttyUSB0 @ GPIB 24");
    }
}
