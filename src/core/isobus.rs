use crate::core::LinkOptions;
use crate::domain::model::{ControlMode, Identity};
use crate::domain::ports::Transport;
use crate::utils::error::{BusError, Result};
use tokio::time;

/// Command engine for the single-letter ISOBUS dialect the older Oxford
/// instruments speak (ILM level meters, ITC temperature controllers).
///
/// Commands are one letter plus an optional argument; the reply echoes the
/// letter, or leads with `?` when the instrument refuses. With an ISOBUS
/// address configured every command goes out as `@n...`, which daisy-chained
/// instruments other than `n` ignore.
pub struct IsobusClient {
    link: Box<dyn Transport>,
    address: Option<u8>,
    options: LinkOptions,
}

impl IsobusClient {
    pub fn new(link: Box<dyn Transport>, address: Option<u8>, options: LinkOptions) -> Self {
        Self {
            link,
            address,
            options,
        }
    }

    pub fn endpoint(&self) -> String {
        match self.address {
            Some(n) => format!("{} @{}", self.link.endpoint(), n),
            None => self.link.endpoint(),
        }
    }

    fn frame(&self, command: &str) -> String {
        match self.address {
            Some(n) => format!("@{}{}", n, command),
            None => command.to_string(),
        }
    }

    /// Sends one command and returns the raw reply line.
    ///
    /// A timeout resets the link and retries the same command up to the
    /// configured attempt count; a `?` rejection is final and never retried.
    pub async fn exec(&mut self, command: &str) -> Result<String> {
        let framed = self.frame(command);
        let mut attempt = 0;
        loop {
            self.link.send_line(&framed).await?;
            time::sleep(self.options.settle).await;

            match time::timeout(self.options.timeout, self.link.receive_line()).await {
                Ok(received) => {
                    let reply = received?;
                    if reply.starts_with('?') {
                        return Err(BusError::CommandRejected {
                            command: framed,
                            reply,
                        });
                    }
                    return Ok(reply);
                }
                Err(_) if attempt < self.options.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        command = %framed,
                        attempt,
                        "no reply within {:?}, recovering link and retrying",
                        self.options.timeout
                    );
                    match time::timeout(self.options.timeout, self.link.reset()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!("link recovery failed: {}", e),
                        Err(_) => tracing::warn!("link recovery timed out"),
                    }
                    time::sleep(self.options.retry_delay).await;
                }
                Err(_) => {
                    return Err(BusError::TimeoutError {
                        endpoint: self.link.endpoint(),
                        command: framed,
                        timeout_ms: self.options.timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Sends a command and strips the echoed command letter off the reply.
    pub async fn exec_value(&mut self, command: &str) -> Result<String> {
        let echo = match command.chars().next() {
            Some(c) => c,
            None => {
                return Err(BusError::ParseError {
                    reply: String::new(),
                    reason: "empty command".to_string(),
                })
            }
        };

        let reply = self.exec(command).await?;
        match reply.strip_prefix(echo) {
            Some(rest) => Ok(rest.trim().to_string()),
            None => Err(BusError::UnexpectedReply {
                command: self.frame(command),
                reply,
            }),
        }
    }

    /// Reads a numeric value, e.g. `R1` answered with `R732` gives `732.0`.
    pub async fn exec_f64(&mut self, command: &str) -> Result<f64> {
        let value = self.exec_value(command).await?;
        value.parse::<f64>().map_err(|_| BusError::ParseError {
            reply: value,
            reason: "expected a number after the echoed command letter".to_string(),
        })
    }

    /// The `Cn` front-panel interlock command.
    pub async fn set_control(&mut self, mode: ControlMode) -> Result<()> {
        self.exec_value(&format!("C{}", mode.command_digit()))
            .await?;
        Ok(())
    }

    /// Runs a state-changing command inside the usual guard dance: lock the
    /// panel (`C1`), send the command, hand the panel back (`C3`).
    pub async fn exec_remote_locked(&mut self, command: &str) -> Result<String> {
        self.set_control(ControlMode::RemoteLocked).await?;
        let outcome = self.exec(command).await;
        let restore = self.set_control(ControlMode::RemoteUnlocked).await;
        let reply = outcome?;
        restore?;
        Ok(reply)
    }

    /// The `V` command's free-text version string, e.g.
    /// `ILM200 Version 1.08 (c) OXFORD 1994`.
    pub async fn version(&mut self) -> Result<String> {
        self.exec("V").await
    }

    pub async fn identity(&mut self) -> Result<Identity> {
        let text = self.version().await?;
        Ok(parse_identity(&text))
    }
}

/// Splits the fixed word layout these instruments use for `V`:
/// `<model> Version <fw> (c) <vendor> <serial>`. Anything shorter is left
/// unparsed; the raw string is still available through [`IsobusClient::version`].
pub fn parse_identity(text: &str) -> Identity {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 6 {
        return Identity::default();
    }
    Identity {
        model: Some(tokens[0].to_string()),
        firmware: Some(format!("{} {}", tokens[1], tokens[2])),
        vendor: Some(format!("{} {}", tokens[3], tokens[4])),
        serial: Some(tokens[5].to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockLink;
    use std::time::Duration;

    fn quick() -> LinkOptions {
        LinkOptions {
            timeout: Duration::from_millis(50),
            settle: Duration::from_millis(1),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn client(link: MockLink, address: Option<u8>) -> IsobusClient {
        IsobusClient::new(Box::new(link), address, quick())
    }

    #[tokio::test]
    async fn test_address_prefix() {
        let probe = MockLink::new().expect("@6R1", "R732");
        let mut bus = client(probe.clone(), Some(6));
        assert_eq!(bus.exec("R1").await.unwrap(), "R732");
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_no_address_sends_bare_command() {
        let probe = MockLink::new().expect("R1", "R732");
        let mut bus = client(probe.clone(), None);
        assert_eq!(bus.exec_f64("R1").await.unwrap(), 732.0);
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_rejection_is_an_error() {
        let probe = MockLink::new().expect("@1T300", "?T300");
        let mut bus = client(probe.clone(), Some(1));
        match bus.exec("T300").await {
            Err(BusError::CommandRejected { command, reply }) => {
                assert_eq!(command, "@1T300");
                assert_eq!(reply, "?T300");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_echo_mismatch_is_unexpected_reply() {
        let probe = MockLink::new().expect("@1R1", "T305");
        let mut bus = client(probe.clone(), Some(1));
        assert!(matches!(
            bus.exec_value("R1").await,
            Err(BusError::UnexpectedReply { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_retries_after_reset() {
        let probe = MockLink::new()
            .expect_silence("@1R1")
            .expect("@1R1", "R732");
        let mut bus = client(probe.clone(), Some(1));
        assert_eq!(bus.exec_f64("R1").await.unwrap(), 732.0);
        assert_eq!(probe.resets(), 1);
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_timeout_exhausts_attempts() {
        let probe = MockLink::new()
            .expect_silence("@1R1")
            .expect_silence("@1R1")
            .expect_silence("@1R1");
        let mut bus = client(probe.clone(), Some(1));
        match bus.exec("R1").await {
            Err(BusError::TimeoutError { command, .. }) => assert_eq!(command, "@1R1"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(probe.resets(), 2);
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_remote_locked_dance_restores_panel() {
        let probe = MockLink::new()
            .expect("@1C1", "C")
            .expect("@1S1", "S")
            .expect("@1C3", "C");
        let mut bus = client(probe.clone(), Some(1));
        bus.exec_remote_locked("S1").await.unwrap();
        assert_eq!(probe.sent(), vec!["@1C1", "@1S1", "@1C3"]);
        probe.assert_exhausted();
    }

    #[test]
    fn test_identity_word_layout() {
        let id = parse_identity("ILM200 Version 1.08 (c) OXFORD 1994");
        assert_eq!(id.model.as_deref(), Some("ILM200"));
        assert_eq!(id.firmware.as_deref(), Some("Version 1.08"));
        assert_eq!(id.vendor.as_deref(), Some("(c) OXFORD"));
        assert_eq!(id.serial.as_deref(), Some("1994"));
    }

    #[test]
    fn test_identity_short_string_left_unparsed() {
        assert_eq!(parse_identity("ILM200 1.08"), Identity::default());
    }
}
