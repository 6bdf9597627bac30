//! Identity orchestration: registration, login and token refresh across the
//! identity provider and the local directory.

use std::sync::Arc;
use uuid::Uuid;

use super::directory::UserDirectory;
use super::error::{ConflictField, IdentityError};
use super::provider::{AccountCreation, AccountLookup, IdentityProvider, NewProviderAccount};
use super::token;
use crate::config::RegistrationConfig;
use crate::models::{
    canonical_identifier, NewLocalUser, Password, RegistrationRequest, Session, TokenPair,
};

pub struct IdentityService {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn UserDirectory>,
    registration: RegistrationConfig,
}

impl IdentityService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        registration: RegistrationConfig,
    ) -> Self {
        Self {
            provider,
            directory,
            registration,
        }
    }

    /// Create the provider account, its local record, and sign the user in.
    ///
    /// A failure after the provider account exists leaves it in place; the
    /// error log carries the external id for manual reconciliation.
    pub async fn register(&self, request: RegistrationRequest) -> Result<Session, IdentityError> {
        self.ensure_available(AccountLookup::Username(&request.username))
            .await?;
        self.ensure_available(AccountLookup::Email(&request.email))
            .await?;

        let account = NewProviderAccount {
            username: request.username.clone(),
            email: request.email.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            enabled: true,
            email_verified: true,
            origin: self.registration.origin.clone(),
        };

        let creation = self.provider.create_account(&account).await.map_err(|e| {
            tracing::error!(
                username = %request.username,
                error = %e,
                "Provider account creation failed"
            );
            IdentityError::UpstreamFailure
        })?;

        let external_id = match &creation {
            AccountCreation::Created { .. } => {
                creation.external_id().map(str::to_string).ok_or_else(|| {
                    tracing::error!(
                        username = %request.username,
                        "Provider created account without a usable location"
                    );
                    IdentityError::UpstreamFailure
                })?
            }
            AccountCreation::Conflict { message } => {
                let field = conflict_field(message);
                tracing::info!(
                    username = %request.username,
                    field = %field,
                    "Provider reported a conflicting account"
                );
                return Err(IdentityError::AlreadyExists(field));
            }
            AccountCreation::Rejected { status } => {
                tracing::error!(
                    username = %request.username,
                    status = *status,
                    "Provider rejected account creation"
                );
                return Err(IdentityError::UpstreamFailure);
            }
        };

        tracing::info!(
            external_id = %external_id,
            username = %request.username,
            "Provider account created"
        );

        if let Err(e) = self
            .provider
            .set_password(&external_id, &request.password)
            .await
        {
            tracing::error!(
                external_id = %external_id,
                username = %request.username,
                error = %e,
                "Setting password failed; provider account needs reconciliation"
            );
            return Err(IdentityError::UpstreamFailure);
        }

        if let Err(e) = self
            .provider
            .assign_role(&external_id, &self.registration.default_role)
            .await
        {
            tracing::error!(
                external_id = %external_id,
                username = %request.username,
                role = %self.registration.default_role,
                error = %e,
                "Role assignment failed; provider account needs reconciliation"
            );
            return Err(IdentityError::UpstreamFailure);
        }

        let local = NewLocalUser {
            external_id: external_id.clone(),
            username: canonical_identifier(&request.username),
            email: canonical_identifier(&request.email),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
        };

        let user_id = self.directory.create(local).await.map_err(|e| {
            tracing::error!(
                external_id = %external_id,
                username = %request.username,
                email = %request.email,
                error = %e,
                "Local user creation failed; provider account needs reconciliation"
            );
            IdentityError::Internal
        })?;

        tracing::info!(
            user_id = %user_id,
            external_id = %external_id,
            username = %request.username,
            "User registered"
        );

        self.sign_in(&request.username, &request.password)
            .await
            .map_err(|reason| {
                tracing::error!(
                    user_id = %user_id,
                    username = %request.username,
                    reason = %reason,
                    "Sign-in after registration failed"
                );
                IdentityError::Internal
            })
    }

    pub async fn login(&self, username: &str, password: &Password) -> Result<Session, IdentityError> {
        self.sign_in(username, password).await.map_err(|reason| {
            tracing::warn!(username = %username, reason = %reason, "Login rejected");
            IdentityError::InvalidCredentials
        })
    }

    /// Exchange a refresh token. Never falls back to a password grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        let tokens = self
            .provider
            .issue_token_by_refresh_token(refresh_token)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Refresh token rejected");
                IdentityError::InvalidCredentials
            })?;

        let (user_id, username) = self.resolve_local(&tokens).await.map_err(|reason| {
            tracing::warn!(reason = %reason, "Refreshed token has no matching local user");
            IdentityError::InvalidCredentials
        })?;

        tracing::info!(user_id = %user_id, "Session refreshed");
        Ok(Session::new(tokens, user_id, username))
    }

    async fn ensure_available(&self, lookup: AccountLookup<'_>) -> Result<(), IdentityError> {
        let existing = self.provider.search_account(lookup).await.map_err(|e| {
            tracing::error!(
                field = lookup.field(),
                error = %e,
                "Provider account search failed"
            );
            IdentityError::UpstreamFailure
        })?;

        match existing {
            Some(account) => {
                let field = match lookup {
                    AccountLookup::Username(_) => ConflictField::Username,
                    AccountLookup::Email(_) => ConflictField::Email,
                };
                tracing::info!(
                    external_id = %account.id,
                    field = %field,
                    "Registration blocked by existing account"
                );
                Err(IdentityError::AlreadyExists(field))
            }
            None => Ok(()),
        }
    }

    /// Password grant plus local lookup. The error is a log-only reason.
    async fn sign_in(&self, username: &str, password: &Password) -> Result<Session, String> {
        let tokens = self
            .provider
            .issue_token_by_password(username, password)
            .await
            .map_err(|e| format!("password grant failed: {}", e))?;

        let (user_id, stored_username) = self.resolve_local(&tokens).await?;

        tracing::info!(user_id = %user_id, username = %stored_username, "User signed in");
        Ok(Session::new(tokens, user_id, stored_username))
    }

    async fn resolve_local(&self, tokens: &TokenPair) -> Result<(Uuid, String), String> {
        let external_id = token::subject_of(&tokens.access_token).map_err(|e| e.to_string())?;

        let user = self
            .directory
            .find_by_external_id(&external_id)
            .await
            .map_err(|e| format!("directory lookup failed: {}", e))?
            .ok_or_else(|| format!("no local user for external id {}", external_id))?;

        Ok((user.user_id, user.username))
    }
}

/// Which field a provider conflict message refers to.
fn conflict_field(message: &str) -> ConflictField {
    if message.to_ascii_lowercase().contains("email") {
        ConflictField::Email
    } else {
        ConflictField::Username
    }
}
