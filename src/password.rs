//! Password resolution for encrypted inputs
//!
//! When the merge meets an encrypted PDF it asks a [`PasswordResolver`] for
//! a password, and asks again after each wrong one until the resolver
//! supplies the right password or declines.

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// One request for a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPrompt {
    /// Display name of the encrypted file
    pub file_name: String,
    /// 1 for the first request about this file, then 2, 3, ...
    pub attempt: u32,
}

impl PasswordPrompt {
    /// Whether an earlier password for this file was rejected
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// Supplies passwords for encrypted inputs
pub trait PasswordResolver {
    /// `Ok(Some(_))` tries the password, `Ok(None)` declines and cancels the
    /// run, `Err(_)` aborts the run with that error.
    fn resolve(&mut self, prompt: &PasswordPrompt) -> Result<Option<String>>;
}

impl<F> PasswordResolver for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn resolve(&mut self, prompt: &PasswordPrompt) -> Result<Option<String>> {
        Ok(self(&prompt.file_name))
    }
}

/// Refuses encrypted input outright, for surfaces that cannot prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectEncrypted;

impl PasswordResolver for RejectEncrypted {
    fn resolve(&mut self, prompt: &PasswordPrompt) -> Result<Option<String>> {
        Err(Error::EncryptedInputRejected {
            file: prompt.file_name.clone(),
        })
    }
}

/// A password request in flight between a worker and the interactive side
#[derive(Debug)]
pub struct PasswordRequest {
    pub prompt: PasswordPrompt,
    reply: oneshot::Sender<Option<String>>,
}

impl PasswordRequest {
    /// Send the decision back to the waiting worker
    ///
    /// `None` declines. If the worker has already gone the answer is dropped.
    pub fn answer(self, password: Option<String>) {
        let _ = self.reply.send(password);
    }
}

/// Worker-side resolver that forwards each prompt over a channel and blocks
/// until the interactive side answers
///
/// Blocks the calling thread, so it must run outside any async runtime.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    requests: mpsc::UnboundedSender<PasswordRequest>,
}

/// Create a connected resolver and the receiver the interactive side serves
pub fn password_channel() -> (ChannelResolver, mpsc::UnboundedReceiver<PasswordRequest>) {
    let (requests, receiver) = mpsc::unbounded_channel();
    (ChannelResolver { requests }, receiver)
}

impl PasswordResolver for ChannelResolver {
    fn resolve(&mut self, prompt: &PasswordPrompt) -> Result<Option<String>> {
        let (reply, answer) = oneshot::channel();
        let request = PasswordRequest {
            prompt: prompt.clone(),
            reply,
        };

        // A vanished interactive side counts as declining
        if self.requests.send(request).is_err() {
            return Ok(None);
        }
        Ok(answer.blocking_recv().unwrap_or(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn prompt(attempt: u32) -> PasswordPrompt {
        PasswordPrompt {
            file_name: "secret.pdf".to_string(),
            attempt,
        }
    }

    #[test]
    fn test_closure_resolver() {
        let mut seen = Vec::new();
        let mut resolver = |name: &str| {
            seen.push(name.to_string());
            Some("pw".to_string())
        };
        assert_eq!(resolver.resolve(&prompt(1)).unwrap(), Some("pw".to_string()));
        assert_eq!(seen, vec!["secret.pdf"]);
    }

    #[test]
    fn test_reject_encrypted_names_file() {
        match RejectEncrypted.resolve(&prompt(1)) {
            Err(Error::EncryptedInputRejected { file }) => assert_eq!(file, "secret.pdf"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_channel_round_trip() {
        let (mut resolver, mut requests) = password_channel();

        let worker = thread::spawn(move || {
            let first = resolver.resolve(&prompt(1)).unwrap();
            let second = resolver.resolve(&prompt(2)).unwrap();
            (first, second)
        });

        let request = requests.blocking_recv().unwrap();
        assert!(!request.prompt.is_retry());
        request.answer(Some("guess".to_string()));

        let request = requests.blocking_recv().unwrap();
        assert!(request.prompt.is_retry());
        request.answer(None);

        let (first, second) = worker.join().unwrap();
        assert_eq!(first.as_deref(), Some("guess"));
        assert_eq!(second, None);
    }

    #[test]
    fn test_channel_without_listener_declines() {
        let (mut resolver, requests) = password_channel();
        drop(requests);
        assert_eq!(resolver.resolve(&prompt(1)).unwrap(), None);
    }

    #[test]
    fn test_dropped_request_declines() {
        let (mut resolver, mut requests) = password_channel();
        let worker = thread::spawn(move || resolver.resolve(&prompt(1)).unwrap());
        drop(requests.blocking_recv().unwrap());
        assert_eq!(worker.join().unwrap(), None);
    }
}
