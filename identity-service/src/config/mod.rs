use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::time::Duration;

/// Top-level configuration, handed to component constructors at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub claims: ClaimsConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub jwks: JwksConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Connection settings for the identity provider (Keycloak realm).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
    #[serde(default = "default_admin_realm")]
    pub admin_realm: String,
    #[serde(default = "default_admin_client_id")]
    pub admin_client_id: String,
    pub admin_username: String,
    pub admin_password: Secret<String>,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// How verified token claims turn into an authorization context.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimsConfig {
    /// Client id whose entry under `resource_access` carries application roles.
    pub resource_id: String,
    #[serde(default = "default_principal_attribute")]
    pub principal_attribute: String,
    #[serde(default = "default_role_prefix")]
    pub role_prefix: String,
    #[serde(default = "default_scope_prefix")]
    pub scope_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_origin")]
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwksConfig {
    #[serde(default = "default_jwks_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Floor between refetches triggered by an unknown `kid`.
    #[serde(default = "default_jwks_min_refresh_interval_seconds")]
    pub min_refresh_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_role: default_role(),
            origin: default_origin(),
        }
    }
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_jwks_cache_ttl_seconds(),
            min_refresh_interval_seconds: default_jwks_min_refresh_interval_seconds(),
        }
    }
}

impl ProviderConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Issuer URL stamped into tokens (`iss`).
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.base(), self.realm)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    pub fn admin_token_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base(),
            self.admin_realm
        )
    }

    /// Root of the admin REST API for the application realm.
    pub fn admin_realm_url(&self) -> String {
        format!("{}/admin/realms/{}", self.base(), self.realm)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl JwksConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_seconds)
    }
}

impl IdentityConfig {
    /// Load from `identity.{toml,yaml,json}` and `IDENTITY__*` variables.
    pub fn load() -> Result<Self, AppError> {
        let config: IdentityConfig = core_config::load("identity", "IDENTITY")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, AppError> {
        let config: IdentityConfig = core_config::from_toml_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(config_error("provider.base_url must not be empty"));
        }

        if self.provider.realm.trim().is_empty() {
            return Err(config_error("provider.realm must not be empty"));
        }

        if self.claims.resource_id.trim().is_empty() {
            return Err(config_error("claims.resource_id must not be empty"));
        }

        if self.claims.principal_attribute.trim().is_empty() {
            return Err(config_error("claims.principal_attribute must not be empty"));
        }

        if self.provider.request_timeout_seconds == 0 {
            return Err(config_error(
                "provider.request_timeout_seconds must be positive",
            ));
        }

        if self.registration.default_role.trim().is_empty() {
            return Err(config_error("registration.default_role must not be empty"));
        }

        if self.environment == Environment::Prod {
            if !self.provider.base_url.starts_with("https://") {
                return Err(config_error(
                    "provider.base_url must use https in production",
                ));
            }

            if self.database.is_none() {
                return Err(config_error("database is required in production"));
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn default_service_name() -> String {
    "identity-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_admin_realm() -> String {
    "master".to_string()
}

fn default_admin_client_id() -> String {
    "admin-cli".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_principal_attribute() -> String {
    "preferred_username".to_string()
}

fn default_role_prefix() -> String {
    "ROLE_".to_string()
}

fn default_scope_prefix() -> String {
    "SCOPE_".to_string()
}

fn default_role() -> String {
    "user".to_string()
}

fn default_origin() -> String {
    "api-registration".to_string()
}

fn default_jwks_cache_ttl_seconds() -> u64 {
    300
}

fn default_jwks_min_refresh_interval_seconds() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}
