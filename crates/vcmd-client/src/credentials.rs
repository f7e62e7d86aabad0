//! Credential collaborator
//!
//! Token acquisition and persistence live outside this crate. The client only
//! asks for a bearer token before every send and for a refresh when the relay
//! says the token is stale.

use async_trait::async_trait;
use vcmd_protocol::BoxError;

/// Which token a request is made with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Token scoped to the account
    User,
    /// Token scoped to one vehicle
    Vehicle,
}

/// Supplies and refreshes bearer tokens
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token for `id`
    async fn access_token(&self, id: &str, kind: TokenKind) -> Result<String, BoxError>;

    /// Force a refresh and return the new token
    async fn refresh_access_token(&self, id: &str, kind: TokenKind) -> Result<String, BoxError>;
}
