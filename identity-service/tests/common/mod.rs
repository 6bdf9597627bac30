//! Shared collaborators for identity-service integration tests.
//!
//! `ScriptedProvider` and `RecordingDirectory` append every call to one
//! shared log so tests can assert on cross-collaborator ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use identity_service::config::{IdentityConfig, RegistrationConfig};
use identity_service::models::{LocalUser, NewLocalUser, Password, RegistrationRequest, TokenPair};
use identity_service::services::{
    AccountCreation, AccountLookup, DirectoryError, IdentityProvider, IdentityService,
    InMemoryDirectory, NewProviderAccount, ProviderAccount, ProviderError, UserDirectory,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Access token shaped like the provider's, signed with a throwaway key.
pub fn access_token(external_id: &str, username: &str) -> String {
    encode(
        &Header::default(),
        &json!({
            "sub": external_id,
            "preferred_username": username,
            "exp": chrono::Utc::now().timestamp() + 300,
        }),
        &EncodingKey::from_secret(b"scripted-provider-key"),
    )
    .unwrap()
}

pub fn token_pair(external_id: &str, username: &str) -> TokenPair {
    TokenPair {
        access_token: access_token(external_id, username),
        refresh_token: format!("refresh-{}", external_id),
        token_type: "Bearer".to_string(),
        expires_in: 300,
    }
}

pub fn registration(username: &str, email: &str) -> RegistrationRequest {
    RegistrationRequest {
        username: username.to_string(),
        email: email.to_string(),
        first_name: Some("Test".to_string()),
        last_name: Some("User".to_string()),
        password: Password::from("correct-horse-battery"),
    }
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig::from_toml_str(
        r#"
        [provider]
        base_url = "http://localhost:8180"
        realm = "shop"
        client_id = "shop-api"
        admin_username = "admin"
        admin_password = "admin"

        [claims]
        resource_id = "shop-api"
        "#,
    )
    .unwrap()
}

#[derive(Debug, Clone)]
struct ScriptedAccount {
    external_id: String,
    username: String,
    email: String,
    password: Option<String>,
}

/// In-process stand-in for the identity provider. Like Keycloak, it stores
/// usernames and emails lowercased and matches them case-insensitively.
pub struct ScriptedProvider {
    log: CallLog,
    accounts: Mutex<Vec<ScriptedAccount>>,
    /// Overrides the normal creation outcome when set.
    pub creation_override: Mutex<Option<AccountCreation>>,
    pub fail_set_password: bool,
    pub fail_assign_role: bool,
    pub fail_search: bool,
}

impl ScriptedProvider {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            accounts: Mutex::new(Vec::new()),
            creation_override: Mutex::new(None),
            fail_set_password: false,
            fail_assign_role: false,
            fail_search: false,
        }
    }

    /// Seed an account that already exists in the provider.
    pub fn with_account(self, external_id: &str, username: &str, email: &str, password: &str) -> Self {
        self.accounts.lock().unwrap().push(ScriptedAccount {
            external_id: external_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password: Some(password.to_string()),
        });
        self
    }

    pub fn with_creation(self, outcome: AccountCreation) -> Self {
        *self.creation_override.lock().unwrap() = Some(outcome);
        self
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().push(call.into());
    }

    fn rejected() -> ProviderError {
        ProviderError::Status {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn search_account(
        &self,
        lookup: AccountLookup<'_>,
    ) -> Result<Option<ProviderAccount>, ProviderError> {
        self.record(format!("search_account:{}", lookup.field()));
        if self.fail_search {
            return Err(ProviderError::Status {
                status: 503,
                body: String::new(),
            });
        }

        let accounts = self.accounts.lock().unwrap();
        let found = accounts.iter().find(|a| match lookup {
            AccountLookup::Username(name) => a.username.eq_ignore_ascii_case(name),
            AccountLookup::Email(email) => a.email.eq_ignore_ascii_case(email),
        });

        Ok(found.map(|a| ProviderAccount {
            id: a.external_id.clone(),
            username: a.username.clone(),
            email: Some(a.email.clone()),
        }))
    }

    async fn create_account(
        &self,
        account: &NewProviderAccount,
    ) -> Result<AccountCreation, ProviderError> {
        self.record("create_account");
        assert!(account.enabled);
        assert!(account.email_verified);

        if let Some(outcome) = self.creation_override.lock().unwrap().clone() {
            return Ok(outcome);
        }

        let external_id = Uuid::new_v4().to_string();
        self.accounts.lock().unwrap().push(ScriptedAccount {
            external_id: external_id.clone(),
            username: account.username.to_lowercase(),
            email: account.email.to_lowercase(),
            password: None,
        });

        Ok(AccountCreation::Created {
            location: format!("http://localhost:8180/admin/realms/shop/users/{}", external_id),
        })
    }

    async fn set_password(
        &self,
        external_id: &str,
        password: &Password,
    ) -> Result<(), ProviderError> {
        self.record("set_password");
        if self.fail_set_password {
            return Err(ProviderError::Status {
                status: 500,
                body: String::new(),
            });
        }

        let mut accounts = self.accounts.lock().unwrap();
        match accounts.iter_mut().find(|a| a.external_id == external_id) {
            Some(account) => {
                account.password = Some(password.expose().to_string());
                Ok(())
            }
            None => Err(ProviderError::Status {
                status: 404,
                body: String::new(),
            }),
        }
    }

    async fn assign_role(&self, _external_id: &str, role: &str) -> Result<(), ProviderError> {
        self.record(format!("assign_role:{}", role));
        if self.fail_assign_role {
            return Err(ProviderError::Status {
                status: 404,
                body: "Could not find role".to_string(),
            });
        }
        Ok(())
    }

    async fn issue_token_by_password(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<TokenPair, ProviderError> {
        self.record("issue_token_by_password");

        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .find(|a| a.username.eq_ignore_ascii_case(username) && a.password.as_deref() == Some(password.expose()))
            .map(|a| token_pair(&a.external_id, &a.username))
            .ok_or_else(Self::rejected)
    }

    async fn issue_token_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ProviderError> {
        self.record("issue_token_by_refresh_token");

        let external_id = refresh_token
            .strip_prefix("refresh-")
            .ok_or_else(Self::rejected)?;

        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .find(|a| a.external_id == external_id)
            .map(|a| token_pair(&a.external_id, &a.username))
            .ok_or_else(Self::rejected)
    }
}

/// In-memory directory that records calls and can be told to fail writes.
pub struct RecordingDirectory {
    log: CallLog,
    inner: InMemoryDirectory,
    pub fail_create: bool,
}

impl RecordingDirectory {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            inner: InMemoryDirectory::new(),
            fail_create: false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Insert a record directly, bypassing the call log.
    pub async fn seed(&self, external_id: &str, username: &str, email: &str) -> Uuid {
        self.inner
            .create(NewLocalUser {
                external_id: external_id.to_string(),
                username: username.to_string(),
                email: email.to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap()
    }

    fn record(&self, call: &str) {
        self.log.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl UserDirectory for RecordingDirectory {
    async fn create(&self, user: NewLocalUser) -> Result<Uuid, DirectoryError> {
        self.record("local_create");
        if self.fail_create {
            return Err(DirectoryError::Duplicate("username".to_string()));
        }
        self.inner.create(user).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<LocalUser>, DirectoryError> {
        self.record("local_find_by_id");
        self.inner.find_by_id(user_id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, DirectoryError> {
        self.record("local_find_by_username");
        self.inner.find_by_username(username).await
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<LocalUser>, DirectoryError> {
        self.record("local_find_by_external_id");
        self.inner.find_by_external_id(external_id).await
    }
}

/// Orchestrator over scripted collaborators sharing one call log.
pub fn identity_service(
    provider: Arc<ScriptedProvider>,
    directory: Arc<RecordingDirectory>,
) -> IdentityService {
    IdentityService::new(provider, directory, RegistrationConfig::default())
}
