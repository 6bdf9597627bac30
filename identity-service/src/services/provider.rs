use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Password, TokenPair};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

/// How to look an account up in the provider. Both forms are exact matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLookup<'a> {
    Username(&'a str),
    Email(&'a str),
}

impl AccountLookup<'_> {
    pub fn field(&self) -> &'static str {
        match self {
            AccountLookup::Username(_) => "username",
            AccountLookup::Email(_) => "email",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            AccountLookup::Username(value) | AccountLookup::Email(value) => value,
        }
    }
}

/// Account as the provider reports it in search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAccount {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
}

/// Representation sent when creating a provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderAccount {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    pub email_verified: bool,
    /// Marker attribute recording where the account came from.
    pub origin: String,
}

/// Result of an account creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCreation {
    /// Accepted; `location` is the URL of the new account.
    Created { location: String },
    /// Rejected because the account collides with an existing one.
    Conflict { message: String },
    /// Rejected for any other reason.
    Rejected { status: u16 },
}

impl AccountCreation {
    /// The provider-assigned id: last path segment of the location.
    pub fn external_id(&self) -> Option<&str> {
        match self {
            AccountCreation::Created { location } => location
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|id| !id.is_empty()),
            _ => None,
        }
    }
}

/// Remote identity provider: account administration plus token issuance.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn search_account(
        &self,
        lookup: AccountLookup<'_>,
    ) -> Result<Option<ProviderAccount>, ProviderError>;

    async fn create_account(
        &self,
        account: &NewProviderAccount,
    ) -> Result<AccountCreation, ProviderError>;

    /// Set a permanent (non-temporary) password.
    async fn set_password(&self, external_id: &str, password: &Password)
        -> Result<(), ProviderError>;

    async fn assign_role(&self, external_id: &str, role: &str) -> Result<(), ProviderError>;

    async fn issue_token_by_password(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<TokenPair, ProviderError>;

    async fn issue_token_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ProviderError>;
}
