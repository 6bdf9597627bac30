use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Newtype for password to prevent accidental logging
#[derive(Debug, Clone)]
pub struct Password(Secret<String>);

impl Password {
    pub fn new(password: String) -> Self {
        Self(Secret::new(password))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Validation errors echo the offending value; never the secret itself.
impl Serialize for Password {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Password::new)
    }
}

/// Everything needed to create an account in both the provider and the
/// local directory.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationRequest {
    #[validate(custom(function = "not_blank"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(custom(function = "strong_enough"))]
    pub password: Password,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank"))]
    pub username: String,
    #[validate(custom(function = "present"))]
    pub password: Password,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(custom(function = "not_blank"))]
    pub refresh_token: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn present(password: &Password) -> Result<(), ValidationError> {
    not_blank(password.expose())
}

fn strong_enough(password: &Password) -> Result<(), ValidationError> {
    if password.expose().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new("password_too_short"));
    }
    Ok(())
}
