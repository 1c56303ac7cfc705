//! Caller identity: maps a bearer credential to a stable [`UserId`].

use std::collections::HashMap;

use async_trait::async_trait;
use playcoach_core::UserId;

/// Why a caller could not be identified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required.")]
    MissingCredential,

    #[error("Invalid or expired credential.")]
    InvalidCredential,
}

/// Malformed identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid token entry '{entry}': expected token=user")]
pub struct IdentityConfigError {
    pub entry: String,
}

/// Resolves credentials issued by an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// The user a credential belongs to, or `None` if it is not recognised.
    async fn resolve(&self, credential: &str) -> Option<UserId>;
}

/// A fixed token table, configured as `token=user` pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Parse `tok1=alice,tok2=bob`. Blank entries are ignored.
    pub fn parse(list: &str) -> Result<Self, IdentityConfigError> {
        let mut identity = Self::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry
                .split_once('=')
                .map(|(t, u)| (t.trim(), u.trim()))
                .filter(|(t, u)| !t.is_empty() && !u.is_empty())
                .ok_or_else(|| IdentityConfigError {
                    entry: entry.to_string(),
                })?;
            identity = identity.with_token(token, UserId::new(user));
        }
        Ok(identity)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn resolve(&self, credential: &str) -> Option<UserId> {
        self.tokens.get(credential).cloned()
    }
}
