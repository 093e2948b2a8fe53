use crate::domain::ports::Transport;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    script: VecDeque<(String, Vec<String>)>,
    pending: VecDeque<String>,
    sent: Vec<String>,
    resets: u32,
}

/// Scripted [`Transport`] for tests: a transcript of expected commands and
/// canned replies, checked in order.
///
/// Clones share state, so tests keep one clone for assertions after moving the
/// other into a driver. Panics when the conversation diverges from the script,
/// which is the useful failure mode in a test.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts one command and the reply it earns.
    pub fn expect(self, command: &str, reply: &str) -> Self {
        self.lock()
            .script
            .push_back((command.to_string(), vec![reply.to_string()]));
        self
    }

    /// Scripts a command the instrument swallows without answering, so the
    /// caller's timeout fires.
    pub fn expect_silence(self, command: &str) -> Self {
        self.lock().script.push_back((command.to_string(), vec![]));
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn resets(&self) -> u32 {
        self.lock().resets
    }

    /// Panics unless every scripted exchange was consumed.
    pub fn assert_exhausted(&self) {
        let state = self.lock();
        assert!(
            state.script.is_empty(),
            "unconsumed script entries: {:?}",
            state.script.iter().map(|(c, _)| c).collect::<Vec<_>>()
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MockLink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut state = self.lock();
        match state.script.pop_front() {
            Some((expected, replies)) => {
                assert_eq!(
                    expected, line,
                    "transcript diverged: script expects {:?}, driver sent {:?}",
                    expected, line
                );
                state.sent.push(line.to_string());
                state.pending.extend(replies);
                Ok(())
            }
            None => panic!("unscripted command: {:?}", line),
        }
    }

    async fn receive_line(&mut self) -> Result<String> {
        let next = self.lock().pending.pop_front();
        match next {
            Some(reply) => Ok(reply),
            // Silent instrument: block until the caller's timeout cancels us.
            None => std::future::pending().await,
        }
    }

    async fn reset(&mut self) -> Result<()> {
        self.lock().resets += 1;
        Ok(())
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_exchange() {
        let probe = MockLink::new().expect("@1R1", "R732");
        let mut link = probe.clone();
        link.send_line("@1R1").await.unwrap();
        assert_eq!(link.receive_line().await.unwrap(), "R732");
        probe.assert_exhausted();
        assert_eq!(probe.sent(), vec!["@1R1".to_string()]);
    }

    #[tokio::test]
    #[should_panic(expected = "transcript diverged")]
    async fn test_divergence_panics() {
        let mut link = MockLink::new().expect("@1R1", "R732");
        let _ = link.send_line("@1R2").await;
    }

    #[tokio::test]
    async fn test_silence_pends_until_cancelled() {
        let mut link = MockLink::new().expect_silence("@1R1");
        link.send_line("@1R1").await.unwrap();
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            link.receive_line(),
        )
        .await;
        assert!(outcome.is_err(), "receive should still be pending");
    }
}
