pub mod directory;
pub mod error;
pub mod identity;
pub mod keycloak;
pub mod profile;
pub mod provider;
pub mod token;
pub mod verifier;

pub use directory::{DirectoryError, InMemoryDirectory, PgDirectory, UserDirectory};
pub use error::{ConflictField, IdentityError};
pub use identity::IdentityService;
pub use keycloak::KeycloakClient;
pub use profile::ProfileService;
pub use provider::{
    AccountCreation, AccountLookup, IdentityProvider, NewProviderAccount, ProviderAccount,
    ProviderError,
};
pub use verifier::{JwksVerifier, TokenVerifier, VerifyError};
