use crate::utils::error::Result;
use async_trait::async_trait;

/// One exclusive byte link to an instrument (or to a bus the instrument sits on).
///
/// Implementations frame whole lines: `send_line` takes the payload without a
/// terminator and appends the link's own, `receive_line` strips the terminator
/// before returning. Timeouts are the caller's business; `receive_line` may
/// wait forever on a silent instrument.
#[async_trait]
pub trait Transport: Send {
    async fn send_line(&mut self, line: &str) -> Result<()>;

    async fn receive_line(&mut self) -> Result<String>;

    /// Best-effort recovery after a timeout, before the command is retried.
    /// Plain links have nothing to do; a GPIB bridge serial-polls and clears
    /// the stuck device here.
    async fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable address of the far end, for logs and error messages.
    fn endpoint(&self) -> String;
}
