//! In-memory credential provider

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use vcmd_client::{CredentialProvider, TokenKind};
use vcmd_protocol::BoxError;

/// Hands out `token-N`, where N counts refreshes
#[derive(Debug, Default)]
pub struct StaticCredentials {
    refreshes: AtomicUsize,
    failing: AtomicBool,
    requests: Mutex<Vec<(String, TokenKind)>>,
}

impl StaticCredentials {
    /// Provider whose first token is `token-0`
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Refreshes performed so far
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Ids and token kinds requested, in order
    pub fn requests(&self) -> Vec<(String, TokenKind)> {
        self.requests.lock().unwrap().clone()
    }

    fn current(&self) -> String {
        format!("token-{}", self.refresh_count())
    }

    fn check(&self) -> Result<(), BoxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("credential store unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self, id: &str, kind: TokenKind) -> Result<String, BoxError> {
        self.check()?;
        self.requests.lock().unwrap().push((id.to_string(), kind));
        Ok(self.current())
    }

    async fn refresh_access_token(&self, _id: &str, _kind: TokenKind) -> Result<String, BoxError> {
        self.check()?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.current())
    }
}
