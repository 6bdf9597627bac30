//! Keycloak REST client: admin API for account management, OIDC token
//! endpoint for password and refresh-token grants.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::provider::{
    AccountCreation, AccountLookup, IdentityProvider, NewProviderAccount, ProviderAccount,
    ProviderError,
};
use crate::config::ProviderConfig;
use crate::models::{Password, TokenPair};

/// Admin tokens are refreshed this long before they actually expire.
const ADMIN_TOKEN_SKEW: Duration = Duration::from_secs(10);

/// Attribute name carrying the registration origin marker.
const ORIGIN_ATTRIBUTE: &str = "origin";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct KeycloakClient {
    config: ProviderConfig,
    client: Client,
    admin_token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct AdminTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct UserRepresentation {
    id: String,
    username: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRepresentation<'a> {
    username: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    enabled: bool,
    email_verified: bool,
    attributes: HashMap<&'static str, Vec<&'a str>>,
}

#[derive(Debug, Serialize)]
struct CredentialRepresentation<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
    temporary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRepresentation {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorRepresentation {
    error_message: Option<String>,
}

impl KeycloakClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            config,
            client,
            admin_token: RwLock::new(None),
        })
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.config.admin_realm_url())
    }

    fn user_url(&self, external_id: &str) -> String {
        format!(
            "{}/users/{}",
            self.config.admin_realm_url(),
            urlencoding::encode(external_id)
        )
    }

    async fn admin_token(&self) -> Result<String, ProviderError> {
        {
            let cached = self.admin_token.read().await;
            if let Some(token) = cached.as_ref() {
                if Instant::now() < token.expires_at {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.admin_token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.admin_client_id.as_str()),
            ("username", self.config.admin_username.as_str()),
            ("password", self.config.admin_password.expose_secret().as_str()),
        ];

        let response = self
            .client
            .post(self.config.admin_token_endpoint())
            .form(&form)
            .send()
            .await?;
        let response = expect_success(response).await?;

        let token: AdminTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("admin token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(ADMIN_TOKEN_SKEW);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        tracing::debug!(
            realm = %self.config.admin_realm,
            expires_in = token.expires_in,
            "Obtained admin access token"
        );

        Ok(token.access_token)
    }

    async fn token_grant<'a>(
        &'a self,
        mut form: Vec<(&'a str, &'a str)>,
    ) -> Result<TokenPair, ProviderError> {
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_ref() {
            form.push(("client_secret", secret.expose_secret().as_str()));
        }

        let response = self
            .client
            .post(self.config.token_endpoint())
            .form(&form)
            .send()
            .await?;
        let response = expect_success(response).await?;

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| ProviderError::Decode(format!("token response: {}", e)))
    }
}

/// Pass 2xx responses through, turn anything else into `ProviderError::Status`.
async fn expect_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn search_account(
        &self,
        lookup: AccountLookup<'_>,
    ) -> Result<Option<ProviderAccount>, ProviderError> {
        let token = self.admin_token().await?;

        let response = self
            .client
            .get(self.users_url())
            .bearer_auth(&token)
            .query(&[(lookup.field(), lookup.value()), ("exact", "true")])
            .send()
            .await?;
        let response = expect_success(response).await?;

        let users: Vec<UserRepresentation> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("user search response: {}", e)))?;

        // Keycloak stores usernames and emails lowercased.
        let account = users
            .into_iter()
            .find(|user| match lookup {
                AccountLookup::Username(name) => user.username.eq_ignore_ascii_case(name),
                AccountLookup::Email(email) => user
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            })
            .map(|user| ProviderAccount {
                id: user.id,
                username: user.username,
                email: user.email,
            });

        Ok(account)
    }

    async fn create_account(
        &self,
        account: &NewProviderAccount,
    ) -> Result<AccountCreation, ProviderError> {
        let token = self.admin_token().await?;

        let mut attributes = HashMap::new();
        attributes.insert(ORIGIN_ATTRIBUTE, vec![account.origin.as_str()]);

        let body = CreateUserRepresentation {
            username: &account.username,
            email: &account.email,
            first_name: account.first_name.as_deref(),
            last_name: account.last_name.as_deref(),
            enabled: account.enabled,
            email_verified: account.email_verified,
            attributes,
        };

        let response = self
            .client
            .post(self.users_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        ProviderError::Decode("created account without Location header".into())
                    })?;

                Ok(AccountCreation::Created {
                    location: location.to_string(),
                })
            }
            StatusCode::CONFLICT => {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorRepresentation>(&text)
                    .ok()
                    .and_then(|e| e.error_message)
                    .unwrap_or(text);

                Ok(AccountCreation::Conflict { message })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    status = status.as_u16(),
                    body = %body,
                    "Provider rejected account creation"
                );
                Ok(AccountCreation::Rejected {
                    status: status.as_u16(),
                })
            }
        }
    }

    async fn set_password(
        &self,
        external_id: &str,
        password: &Password,
    ) -> Result<(), ProviderError> {
        let token = self.admin_token().await?;

        let credential = CredentialRepresentation {
            kind: "password",
            value: password.expose(),
            temporary: false,
        };

        let response = self
            .client
            .put(format!("{}/reset-password", self.user_url(external_id)))
            .bearer_auth(&token)
            .json(&credential)
            .send()
            .await?;
        expect_success(response).await?;

        Ok(())
    }

    async fn assign_role(&self, external_id: &str, role: &str) -> Result<(), ProviderError> {
        let token = self.admin_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/roles/{}",
                self.config.admin_realm_url(),
                urlencoding::encode(role)
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        let response = expect_success(response).await?;

        let role: RoleRepresentation = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("role response: {}", e)))?;

        let response = self
            .client
            .post(format!("{}/role-mappings/realm", self.user_url(external_id)))
            .bearer_auth(&token)
            .json(&[role])
            .send()
            .await?;
        expect_success(response).await?;

        Ok(())
    }

    async fn issue_token_by_password(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<TokenPair, ProviderError> {
        self.token_grant(vec![
            ("grant_type", "password"),
            ("username", username),
            ("password", password.expose()),
        ])
        .await
    }

    async fn issue_token_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ProviderError> {
        self.token_grant(vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
