use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Outcome kinds surfaced by the identity core.
///
/// Collaborator errors are re-classified into one of these before they leave
/// a service; none of them carries upstream detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{0} already exists")]
    AlreadyExists(ConflictField),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    NotFound,

    #[error("Identity provider request failed")]
    UpstreamFailure,

    #[error("Internal error")]
    Internal,
}

/// The registration field that collided with an existing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::Username => "username",
            ConflictField::Email => "email",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::AlreadyExists(field) => {
                AppError::Conflict(anyhow::anyhow!("{} already exists", field))
            }
            IdentityError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            IdentityError::NotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            IdentityError::UpstreamFailure => {
                AppError::BadGateway("identity provider request failed".to_string())
            }
            IdentityError::Internal => AppError::InternalError(anyhow::anyhow!("Internal error")),
        }
    }
}
