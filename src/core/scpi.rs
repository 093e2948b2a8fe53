use crate::core::LinkOptions;
use crate::domain::model::Identity;
use crate::domain::ports::Transport;
use crate::utils::error::{BusError, Result, ScpiFaultKind};
use tokio::time;

/// Command engine for the verb-noun grammar of the Mercury-series
/// controllers: `READ:`/`SET:` requests, `STAT:` echoes, colon-separated noun
/// paths down to a signal leaf.
pub struct ScpiClient {
    link: Box<dyn Transport>,
    options: LinkOptions,
}

impl ScpiClient {
    pub fn new(link: Box<dyn Transport>, options: LinkOptions) -> Self {
        Self { link, options }
    }

    pub fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    /// One request/reply turn with the timeout-and-retry treatment. These
    /// controllers answer promptly, so no settle pause is taken.
    pub async fn query(&mut self, command: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            self.link.send_line(command).await?;

            match time::timeout(self.options.timeout, self.link.receive_line()).await {
                Ok(received) => return received,
                Err(_) if attempt < self.options.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        command = %command,
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
                        command: command.to_string(),
                        timeout_ms: self.options.timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// `READ:<noun>`, expecting `STAT:<noun>:<value>`. The value may carry a
    /// glued unit suffix; [`ScpiClient::read_f64`] strips it.
    pub async fn read(&mut self, noun: &str) -> Result<String> {
        let command = format!("READ:{}", noun);
        let reply = self.query(&command).await?;

        let value = reply
            .strip_prefix("STAT:")
            .and_then(|rest| rest.strip_prefix(noun))
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| BusError::UnexpectedReply {
                command: command.clone(),
                reply: reply.clone(),
            })?;

        if let Some(fault) = ScpiFaultKind::from_token(value) {
            return Err(BusError::ScpiFault {
                noun: noun.to_string(),
                fault,
                reply,
            });
        }
        Ok(value.to_string())
    }

    pub async fn read_f64(&mut self, noun: &str, unit: &str) -> Result<f64> {
        let value = self.read(noun).await?;
        parse_number(&value, unit)
    }

    /// `SET:<noun>:<value>`, expecting the echo to end in `VALID`.
    pub async fn set(&mut self, noun: &str, value: &str) -> Result<()> {
        let command = format!("SET:{}:{}", noun, value);
        let reply = self.query(&command).await?;

        let confirmation = reply
            .strip_prefix("STAT:SET:")
            .and_then(|rest| rest.strip_prefix(noun))
            .ok_or_else(|| BusError::UnexpectedReply {
                command: command.clone(),
                reply: reply.clone(),
            })?;

        let verdict = confirmation.rsplit(':').next().unwrap_or(confirmation);
        if verdict == "VALID" {
            return Ok(());
        }
        match ScpiFaultKind::from_token(verdict) {
            Some(fault) => Err(BusError::ScpiFault {
                noun: noun.to_string(),
                fault,
                reply,
            }),
            None => Err(BusError::UnexpectedReply { command, reply }),
        }
    }

    pub async fn set_f64(&mut self, noun: &str, value: f64) -> Result<()> {
        self.set(noun, &value.to_string()).await
    }

    /// `*IDN?`, answered like
    /// `IDN:OXFORD INSTRUMENTS:MERCURY iPS:170550002:2.6.04.000`.
    pub async fn identity(&mut self) -> Result<Identity> {
        let reply = self.query("*IDN?").await?;
        parse_identity(&reply).ok_or_else(|| BusError::UnexpectedReply {
            command: "*IDN?".to_string(),
            reply,
        })
    }
}

/// Pulls a number out of a signal value, tolerating a glued unit (`4.9999T`),
/// a colon-separated one (`4.9999:T`) or none at all.
pub fn parse_number(value: &str, unit: &str) -> Result<f64> {
    let mut bare = value;
    if !unit.is_empty() {
        if let Some(stripped) = bare.strip_suffix(unit) {
            bare = stripped;
        }
    }
    bare = bare.strip_suffix(':').unwrap_or(bare).trim();

    bare.parse::<f64>().map_err(|_| BusError::ParseError {
        reply: value.to_string(),
        reason: format!("expected a number with an optional {:?} unit", unit),
    })
}

fn parse_identity(reply: &str) -> Option<Identity> {
    let rest = reply.strip_prefix("IDN:")?;
    let mut fields = rest.splitn(4, ':').map(|f| {
        let f = f.trim();
        (!f.is_empty()).then(|| f.to_string())
    });

    let vendor = fields.next().flatten();
    let model = fields.next().flatten();
    let serial = fields.next().flatten();
    let firmware = fields.next().flatten();
    if vendor.is_none() && model.is_none() {
        return None;
    }
    Some(Identity {
        vendor,
        model,
        serial,
        firmware,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockLink;
    use std::time::Duration;

    fn quick() -> LinkOptions {
        LinkOptions {
            timeout: Duration::from_millis(50),
            settle: Duration::ZERO,
            retry_attempts: 1,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn client(link: MockLink) -> ScpiClient {
        ScpiClient::new(Box::new(link), quick())
    }

    #[tokio::test]
    async fn test_read_strips_stat_echo() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:FLD",
            "STAT:DEV:GRPZ:PSU:SIG:FLD:4.9999T",
        );
        let mut scpi = client(probe.clone());
        assert_eq!(
            scpi.read("DEV:GRPZ:PSU:SIG:FLD").await.unwrap(),
            "4.9999T"
        );
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_read_f64_strips_glued_unit() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:FLD",
            "STAT:DEV:GRPZ:PSU:SIG:FLD:4.9999T",
        );
        let mut scpi = client(probe.clone());
        let field = scpi.read_f64("DEV:GRPZ:PSU:SIG:FLD", "T").await.unwrap();
        assert!((field - 4.9999).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_read_not_found_fault() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPQ:PSU:SIG:FLD",
            "STAT:DEV:GRPQ:PSU:SIG:FLD:NOT_FOUND",
        );
        let mut scpi = client(probe.clone());
        match scpi.read("DEV:GRPQ:PSU:SIG:FLD").await {
            Err(BusError::ScpiFault { fault, .. }) => {
                assert_eq!(fault, ScpiFaultKind::NotFound)
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_not_available() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:RCST",
            "STAT:DEV:GRPZ:PSU:SIG:RCST:N/A",
        );
        let mut scpi = client(probe.clone());
        assert!(matches!(
            scpi.read("DEV:GRPZ:PSU:SIG:RCST").await,
            Err(BusError::ScpiFault {
                fault: ScpiFaultKind::NotAvailable,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_set_acknowledged_valid() {
        let probe = MockLink::new().expect(
            "SET:DEV:GRPZ:PSU:SIG:FSET:5",
            "STAT:SET:DEV:GRPZ:PSU:SIG:FSET:5:VALID",
        );
        let mut scpi = client(probe.clone());
        scpi.set_f64("DEV:GRPZ:PSU:SIG:FSET", 5.0).await.unwrap();
        probe.assert_exhausted();
    }

    #[tokio::test]
    async fn test_set_refused_invalid() {
        let probe = MockLink::new().expect(
            "SET:DEV:GRPZ:PSU:SIG:FSET:99",
            "STAT:SET:DEV:GRPZ:PSU:SIG:FSET:99:INVALID",
        );
        let mut scpi = client(probe.clone());
        assert!(matches!(
            scpi.set_f64("DEV:GRPZ:PSU:SIG:FSET", 99.0).await,
            Err(BusError::ScpiFault {
                fault: ScpiFaultKind::Invalid,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_wrong_noun_echo_is_unexpected() {
        let probe = MockLink::new().expect(
            "READ:DEV:GRPZ:PSU:SIG:FLD",
            "STAT:DEV:GRPX:PSU:SIG:FLD:0.0000T",
        );
        let mut scpi = client(probe.clone());
        assert!(matches!(
            scpi.read("DEV:GRPZ:PSU:SIG:FLD").await,
            Err(BusError::UnexpectedReply { .. })
        ));
    }

    #[tokio::test]
    async fn test_identity_parse() {
        let probe = MockLink::new().expect(
            "*IDN?",
            "IDN:OXFORD INSTRUMENTS:MERCURY iPS:170550002:2.6.04.000",
        );
        let mut scpi = client(probe.clone());
        let id = scpi.identity().await.unwrap();
        assert_eq!(id.vendor.as_deref(), Some("OXFORD INSTRUMENTS"));
        assert_eq!(id.model.as_deref(), Some("MERCURY iPS"));
        assert_eq!(id.serial.as_deref(), Some("170550002"));
        assert_eq!(id.firmware.as_deref(), Some("2.6.04.000"));
    }

    #[test]
    fn test_parse_number_forms() {
        assert!((parse_number("4.9999T", "T").unwrap() - 4.9999).abs() < 1e-9);
        assert!((parse_number("4.9999:T", "T").unwrap() - 4.9999).abs() < 1e-9);
        assert!((parse_number("-0.0460", "T").unwrap() + 0.046).abs() < 1e-9);
        assert!((parse_number("120.00A/m", "A/m").unwrap() - 120.0).abs() < 1e-9);
        assert!(parse_number("DENIED", "T").is_err());
    }
}
